//! Scanning core of a signature-matching engine.
//!
//! Given a compiled [`rules::RuleSet`] and an input byte sequence
//! (delivered in one shot or as a stream of blocks through
//! [`scanner::Scanner`]), this crate locates every occurrence of every
//! rule's string patterns, evaluates each rule's [`rules::Condition`]
//! over the resulting match state, and reports verdicts through a user
//! callback.
//!
//! # Pipeline
//!
//! 1. [`scanner::ac::AcScanner`] walks the input once through the rule
//!    set's Aho-Corasick automaton and emits candidate atom hits.
//! 2. [`scanner::Scanner`]'s internal verifier confirms each candidate —
//!    against a literal byte comparator ([`comparators`]) or compiled
//!    regex bytecode ([`re`]) — and records confirmed matches in a
//!    [`scanner::matches::MatchStore`].
//! 3. [`scanner::Scanner::finish`] evaluates every rule's
//!    [`rules::Condition`], applies global-rule semantics, and dispatches
//!    [`scanner::ScanMessage`]s to the caller.
//!
//! Rule *compilation* — parsing rule source, choosing atoms, building
//! regex bytecode — is out of scope; [`rules::RuleSetBuilder`] is the
//! seam where an external compiler's output plugs in. See
//! `SPEC_FULL.md` and `DESIGN.md` for the full requirements and the
//! grounding ledger behind each module.

pub(crate) mod comparators;
pub mod error;
pub mod re;
pub mod rules;
pub mod scanner;

pub use error::{Result, ScanError};
pub use rules::{RuleSet, RuleSetBuilder};
pub use scanner::{scan_file, scan_mem, scan_proc, CallbackAction, ScanConfig, ScanMessage, ScanResults, Scanner};
