//! The Aho-Corasick scanner (4.F): one left-to-right pass over an input
//! block, driving `aho-corasick`'s `noncontiguous::NFA` one byte at a
//! time through its public [`Automaton`] trait (`start_state`,
//! `next_state`, `is_match`, `match_pattern`) rather than reinventing
//! goto/failure-link construction — the automaton *data structure* is
//! squarely in scope (it lives in the shared rule set and this module
//! walks it), but *building* it is the out-of-scope compiler's job, and
//! `aho-corasick` already sits in the teacher's dependency stack for
//! exactly this.

use aho_corasick::automaton::Automaton;
use aho_corasick::{Anchored, StateID};

use crate::error::Result;
use crate::rules::RuleSet;

use super::verifier::Verifier;
use super::ScanOutcome;

/// How often (in input bytes) the scanner samples the clock to honor a
/// configured timeout. Part of the contract, not an implementation
/// accident (§5/§9).
pub const TIMEOUT_POLL_INTERVAL: usize = 256;

pub(crate) struct AcScanner<'r> {
    rules: &'r RuleSet,
    state: StateID,
}

impl<'r> AcScanner<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        let state = rules
            .automaton
            .start_state(Anchored::No)
            .expect("unanchored start state must exist for a Standard-match NFA");
        Self { rules, state }
    }

    /// Scans one block, starting at absolute offset `block_base` within
    /// the logical input, invoking `verifier` at every candidate hit.
    /// `deadline`, if set, is checked every [`TIMEOUT_POLL_INTERVAL`]
    /// bytes.
    pub fn scan_block(
        &mut self,
        data: &[u8],
        block_base: usize,
        verifier: &mut Verifier,
        deadline: Option<std::time::Instant>,
    ) -> Result<ScanOutcome> {
        let automaton = &self.rules.automaton;

        for (i, &byte) in data.iter().enumerate() {
            self.emit_matches_at(data, i, block_base, verifier)?;

            // `next_state` already resolves goto-or-follow-failure-links
            // internally for this automaton kind, so a single call here
            // plays the role of step 2's "while S' == null: follow
            // failure link, retry goto" loop in the distilled spec.
            self.state = automaton.next_state(Anchored::No, self.state, byte);

            if (i + 1) % TIMEOUT_POLL_INTERVAL == 0 {
                if let Some(deadline) = deadline {
                    if std::time::Instant::now() >= deadline {
                        return Ok(ScanOutcome::TimedOut);
                    }
                }
            }
        }

        // Flush: matches recognized at the final state, anchored to the
        // end of this block.
        self.emit_matches_at(data, data.len(), block_base, verifier)?;

        Ok(ScanOutcome::Completed)
    }

    fn emit_matches_at(
        &self,
        data: &[u8],
        i: usize,
        block_base: usize,
        verifier: &mut Verifier,
    ) -> Result<()> {
        let automaton = &self.rules.automaton;
        if !automaton.is_match(self.state) {
            return Ok(());
        }
        let count = automaton.match_len(self.state);
        for idx in 0..count {
            let pattern_id = automaton.match_pattern(self.state, idx);
            let string = self.rules.string(pattern_id.as_usize());
            let backtrack = string.backtrack();
            // A pattern whose start would fall before this block's
            // first byte cannot be verified: only the current block is
            // held in memory (see SPEC_FULL.md Testable Properties,
            // block-split equivalence caveat — patterns crossing a
            // block boundary may be missed, by design).
            if backtrack <= i {
                let off = block_base + (i - backtrack);
                verifier.verify(pattern_id.as_usize(), data, off, block_base)?;
            }
        }
        Ok(())
    }
}
