//! Numeric encoding of security-patch dates.
//!
//! Two input shapes are accepted: dash-separated `YYYY-MM-DD` (or
//! `YYYY-MM`), and contiguous digit strings of length >= 6 read
//! positionally as `YYYY` + `MM` (+ optional `DD` when length >= 8).
//! Anything else falls back to [`FALLBACK_PATCH_LEVEL`] with a log line;
//! this path must never fail, it sits on the per-request resolution path.

/// Static fallback when an override or default cannot be parsed.
pub const FALLBACK_PATCH_LEVEL: i32 = 202_404;

/// Convert a patch-date string to its numeric level.
///
/// Short form (`long = false`) is `YYYY*100 + MM`; long form is
/// `YYYY*10000 + MM*100 + DD` with the day defaulting to 1 when absent.
pub fn convert_patch_level(value: &str, long: bool) -> i32 {
    match parse_patch_date(value) {
        Some((year, month, day)) => {
            if long {
                year * 10_000 + month * 100 + day.unwrap_or(1)
            } else {
                year * 100 + month
            }
        }
        None => {
            tracing::error!(value, "invalid patch level, using fallback");
            FALLBACK_PATCH_LEVEL
        }
    }
}

fn parse_patch_date(value: &str) -> Option<(i32, i32, Option<i32>)> {
    if value.contains('-') {
        let mut parts = value.split('-');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = match parts.next() {
            Some(d) => Some(d.parse().ok()?),
            None => None,
        };
        Some((year, month, day))
    } else {
        if value.len() < 6 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = value.get(0..4)?.parse().ok()?;
        let month = value.get(4..6)?.parse().ok()?;
        let day = if value.len() >= 8 {
            Some(value.get(6..8)?.parse().ok()?)
        } else {
            None
        };
        Some((year, month, day))
    }
}
