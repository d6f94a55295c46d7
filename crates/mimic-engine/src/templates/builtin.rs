//! Built-in identity templates.
//!
//! Fixed starter set; user templates from `templates.json` overlay these on
//! id collision.

use super::DeviceTemplate;

fn template(
    id: &str,
    manufacturer: &str,
    model: &str,
    fingerprint: &str,
    brand: &str,
    product: &str,
    device: &str,
    release: &str,
    build_id: &str,
    incremental: &str,
    security_patch: &str,
) -> DeviceTemplate {
    DeviceTemplate {
        id: id.into(),
        manufacturer: manufacturer.into(),
        model: model.into(),
        fingerprint: fingerprint.into(),
        brand: brand.into(),
        product: product.into(),
        device: device.into(),
        release: release.into(),
        build_id: build_id.into(),
        incremental: incremental.into(),
        build_type: "user".into(),
        tags: "release-keys".into(),
        security_patch: security_patch.into(),
    }
}

pub fn builtin_templates() -> Vec<DeviceTemplate> {
    vec![
        template(
            "pixel8pro",
            "Google",
            "Pixel 8 Pro",
            "google/husky/husky:14/AP1A.240405.002/11480754:user/release-keys",
            "google",
            "husky",
            "husky",
            "14",
            "AP1A.240405.002",
            "11480754",
            "2024-04-05",
        ),
        template(
            "pixel8",
            "Google",
            "Pixel 8",
            "google/shiba/shiba:14/AP1A.240405.002/11480754:user/release-keys",
            "google",
            "shiba",
            "shiba",
            "14",
            "AP1A.240405.002",
            "11480754",
            "2024-04-05",
        ),
        template(
            "pixel7pro",
            "Google",
            "Pixel 7 Pro",
            "google/cheetah/cheetah:14/AP1A.240305.019.A1/11445699:user/release-keys",
            "google",
            "cheetah",
            "cheetah",
            "14",
            "AP1A.240305.019.A1",
            "11445699",
            "2024-03-05",
        ),
        template(
            "pixel6pro",
            "Google",
            "Pixel 6 Pro",
            "google/raven/raven:13/TQ3A.230901.001/10750268:user/release-keys",
            "google",
            "raven",
            "raven",
            "13",
            "TQ3A.230901.001",
            "10750268",
            "2023-09-01",
        ),
        template(
            "s24ultra",
            "samsung",
            "SM-S928B",
            "samsung/e3sxXX/e3s:14/UP1A.231005.007/S928BXXS1AXBG:user/release-keys",
            "samsung",
            "e3sxXX",
            "e3s",
            "14",
            "UP1A.231005.007",
            "S928BXXS1AXBG",
            "2024-02-01",
        ),
        template(
            "s23ultra",
            "samsung",
            "SM-S918B",
            "samsung/dm3qxxx/dm3q:14/UP1A.231005.007/S918BXXS3BXE0:user/release-keys",
            "samsung",
            "dm3qxxx",
            "dm3q",
            "14",
            "UP1A.231005.007",
            "S918BXXS3BXE0",
            "2024-05-01",
        ),
        template(
            "xiaomi14",
            "Xiaomi",
            "23127PN0CG",
            "Xiaomi/houji_global/houji:14/UKQ1.230804.001/V816.0.4.0.UNCMIXM:user/release-keys",
            "Xiaomi",
            "houji_global",
            "houji",
            "14",
            "UKQ1.230804.001",
            "V816.0.4.0.UNCMIXM",
            "2024-03-01",
        ),
        template(
            "oneplus11",
            "OnePlus",
            "CPH2449",
            "OnePlus/CPH2449/OP5554L1:14/UKQ1.230924.001/R.15f1de6-1-1:user/release-keys",
            "OnePlus",
            "CPH2449",
            "OP5554L1",
            "14",
            "UKQ1.230924.001",
            "R.15f1de6-1-1",
            "2024-04-05",
        ),
        template(
            "nothing2",
            "Nothing",
            "A065",
            "Nothing/Pong/Pong:13/TKQ1.220915.002/2.5.1-231228-0054:user/release-keys",
            "Nothing",
            "Pong",
            "Pong",
            "13",
            "TKQ1.220915.002",
            "2.5.1-231228-0054",
            "2024-01-01",
        ),
    ]
}
