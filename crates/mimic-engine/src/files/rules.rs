//! Principal rule file: one rule per line.
//!
//! A trailing `!` routes the rule to the generation set instead of the
//! treatment set; a trailing `*` marks a wildcard-prefix rule. In broken
//! mode every rule goes to the generation set.

use mimic_core::trie::RuleTrie;

use super::config_lines;

/// The two independent rule sets, rebuilt together on every reload.
#[derive(Default)]
pub struct RuleSets {
    pub treatment: RuleTrie<()>,
    pub generation: RuleTrie<()>,
}

pub fn parse_rules(content: &str, broken_mode: bool) -> RuleSets {
    let mut sets = RuleSets::default();
    for line in config_lines(content) {
        if broken_mode || line.ends_with('!') {
            sets.generation
                .add(line.trim_end_matches('!').trim(), ());
        } else {
            sets.treatment.add(line, ());
        }
    }
    sets
}
