//! Minimal representation of a rule's boolean condition.
//!
//! The distilled spec treats the condition bytecode VM as an opaque
//! external collaborator: `execute_code(rules, eval_context) -> error`
//! reads per-thread match state and marks satisfied rules. This crate
//! needs *something* concrete to exercise the bridge (4.H) end to end,
//! so [`Condition`] models the observable contract of that VM — "is
//! this string present", boolean combinators, and `N of (...)`  — without
//! attempting the full YARA condition language (arithmetic over module
//! fields, `for` expressions, etc.), which stays external along with
//! everything else rule-compilation related.

use serde::{Deserialize, Serialize};

use crate::scanner::matches::MatchStore;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Condition {
    True,
    False,
    /// True iff the string (by its pattern id, i.e. index into
    /// [`crate::rules::RuleSet::strings`]) has at least one recorded
    /// match for the current scan.
    StringMatched(usize),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// `N of (...)`: true iff at least `at_least` of `strings` matched.
    MatchCount { strings: Vec<usize>, at_least: usize },
}

impl Condition {
    pub fn evaluate(&self, matches: &MatchStore) -> bool {
        match self {
            Condition::True => true,
            Condition::False => false,
            Condition::StringMatched(id) => matches.has_match(*id),
            Condition::And(cs) => cs.iter().all(|c| c.evaluate(matches)),
            Condition::Or(cs) => cs.iter().any(|c| c.evaluate(matches)),
            Condition::Not(c) => !c.evaluate(matches),
            Condition::MatchCount { strings, at_least } => {
                strings.iter().filter(|id| matches.has_match(**id)).count()
                    >= *at_least
            }
        }
    }
}
