//! Match verifier (4.D): given an Aho-Corasick candidate hit, confirms it
//! against the string's full pattern — either via a fixed-length byte
//! comparator (4.A) for `LITERAL` strings, or by running forward (and
//! optionally backward) regex bytecode through one of the two executors
//! (4.B/4.C) — applies the full-word filter, and reconciles the result
//! into the per-string match store (4.E).
//!
//! Grounded directly in `_yr_scan_verify_match`, `_yr_scan_verify_literal_match`,
//! `_yr_scan_verify_re_match` and `match_callback` in
//! `examples/original_source/libyara/rules.c`, since the distilled spec
//! describes these as one component (4.D) but the original keeps them as
//! four cooperating functions; this module keeps that shape as private
//! helper methods on [`Verifier`] instead.

use crate::comparators;
use crate::error::Result;
use crate::re::fast_hex::FastHexExecutor;
use crate::re::general::GeneralExecutor;
use crate::re::{ReExecutor, ReFlags};
use crate::rules::{RuleSet, StringData, StringFlags};

use super::matches::MatchStore;

pub(crate) struct Verifier<'r, 's> {
    rules: &'r RuleSet,
    matches: &'s mut MatchStore,
    fast_scan_mode: bool,
    fast_hex: FastHexExecutor,
    general: GeneralExecutor,
}

impl<'r, 's> Verifier<'r, 's> {
    pub fn new(rules: &'r RuleSet, matches: &'s mut MatchStore, fast_scan_mode: bool) -> Self {
        Self {
            rules,
            matches,
            fast_scan_mode,
            fast_hex: FastHexExecutor::new(),
            general: GeneralExecutor::new(),
        }
    }

    fn executor_for(&self, string: &StringData) -> &dyn ReExecutor {
        if string.flags.contains(StringFlags::FAST_HEX) {
            &self.fast_hex
        } else {
            &self.general
        }
    }

    /// Verifies one AC candidate: `string_id` matched an atom ending at
    /// absolute offset `off` within the logical input; `data` is the
    /// block currently held in memory and `block_base` is that block's
    /// absolute offset, so `off - block_base` is `off`'s index in `data`.
    ///
    /// Mirrors `_yr_scan_verify_match`'s two early exits (no bytes left
    /// to check; `fast_scan_mode` short-circuit for an already-`FOUND`
    /// `SINGLE_MATCH` string) before dispatching to the literal or regex
    /// path.
    pub fn verify(
        &mut self,
        string_id: usize,
        data: &[u8],
        off: usize,
        block_base: usize,
    ) -> Result<()> {
        let local_off = off - block_base;
        if data.len().saturating_sub(local_off) == 0 {
            return Ok(());
        }

        let string = self.rules.string(string_id).clone();

        if self.fast_scan_mode
            && string.flags.contains(StringFlags::SINGLE_MATCH)
            && self.matches.has_match(string_id)
        {
            return Ok(());
        }

        if string.flags.contains(StringFlags::LITERAL) {
            self.verify_literal(&string, data, local_off, block_base)
        } else {
            self.verify_regex(&string, data, local_off, block_base)
        }
    }

    /// `_yr_scan_verify_literal_match`: try ASCII then WIDE (case-folded
    /// variants of each if `NO_CASE`), skipping the comparator entirely
    /// when the atom alone already proves the match (`FITS_IN_ATOM`).
    fn verify_literal(
        &mut self,
        string: &StringData,
        data: &[u8],
        local_off: usize,
        block_base: usize,
    ) -> Result<()> {
        let rest = &data[local_off..];
        let no_case = string.flags.contains(StringFlags::NO_CASE);
        let ascii = string.flags.contains(StringFlags::ASCII);
        let wide = string.flags.contains(StringFlags::WIDE);

        let (forward_matches, is_wide) = if string.flags.contains(StringFlags::FITS_IN_ATOM) {
            // The atom already proved the whole pattern; no re-check
            // needed. Matches the original's own quirk of preferring
            // WIDE's length here when both modifiers are set.
            if wide {
                (string.raw.len() * 2, true)
            } else {
                (string.raw.len(), false)
            }
        } else {
            let mut len = 0;
            let mut is_wide = false;
            if ascii {
                len = if no_case {
                    comparators::icase(rest, &string.raw)
                } else {
                    comparators::exact(rest, &string.raw)
                };
            }
            if wide && len == 0 {
                len = if no_case {
                    comparators::wide_icase(rest, &string.raw)
                } else {
                    comparators::wide(rest, &string.raw)
                };
                is_wide = len > 0;
            }
            (len, is_wide)
        };

        if forward_matches == 0 {
            return Ok(());
        }

        let char_size = if is_wide { 2 } else { 1 };
        self.report_match(string, data, local_off, block_base, 0, forward_matches, char_size)
    }

    /// `_yr_scan_verify_re_match`: run the forward bytecode (ASCII first,
    /// then WIDE only if ASCII found nothing at all), then either expand
    /// via the backward bytecode or report the forward length directly.
    fn verify_regex(
        &mut self,
        string: &StringData,
        data: &[u8],
        local_off: usize,
        block_base: usize,
    ) -> Result<()> {
        let rest = &data[local_off..];
        let no_case = string.flags.contains(StringFlags::NO_CASE);
        let dot_all = string.flags.contains(StringFlags::HEX);
        let ascii = string.flags.contains(StringFlags::ASCII);
        let wide = string.flags.contains(StringFlags::WIDE);
        let executor = self.executor_for(string);

        let base_flags = ReFlags { no_case, dot_all, ..Default::default() };

        let mut forward: Option<usize> = None;
        let mut is_wide = false;

        if ascii {
            forward = executor.exec(&string.forward_code, rest, base_flags, &mut |_| {});
        }
        if forward.is_none() && wide {
            let flags = ReFlags { wide: true, ..base_flags };
            forward = executor.exec(&string.forward_code, rest, flags, &mut |_| {});
            is_wide = forward.is_some();
        }

        let Some(forward_matches) = forward else {
            return Ok(());
        };

        if forward_matches == 0 && string.backward_code.is_none() {
            return Ok(());
        }

        let char_size = if is_wide { 2 } else { 1 };

        if let Some(backward_code) = &string.backward_code {
            let prefix = &data[..=local_off];
            let reversed = reverse_units(prefix, is_wide);
            let flags = ReFlags {
                backwards: true,
                exhaustive: true,
                no_case,
                dot_all,
                wide: is_wide,
            };
            let mut hits = Vec::new();
            executor.exec(backward_code, &reversed, flags, &mut |len| hits.push(len));
            for backward_len in hits {
                self.report_match(
                    string,
                    data,
                    local_off,
                    block_base,
                    backward_len,
                    forward_matches,
                    char_size,
                )?;
            }
            Ok(())
        } else {
            self.report_match(string, data, local_off, block_base, 0, forward_matches, char_size)
        }
    }

    /// `match_callback`: combines a forward length with an optional
    /// backward length into the final match span, applies the full-word
    /// filter, and inserts into the match store.
    fn report_match(
        &mut self,
        string: &StringData,
        data: &[u8],
        local_off: usize,
        block_base: usize,
        backward_len: usize,
        forward_matches: usize,
        char_size: usize,
    ) -> Result<()> {
        // Backward matching overlaps one character/byte-pair with the
        // forward match at the anchor; undo that overlap before summing.
        let backward_adjusted = if backward_len > 0 { backward_len - char_size } else { 0 };

        let total_len = backward_adjusted + forward_matches;
        let match_start = local_off - backward_adjusted;

        if string.flags.contains(StringFlags::FULL_WORD)
            && violates_full_word(data, match_start, total_len, char_size)
        {
            return Ok(());
        }

        let abs_off = block_base + match_start;
        let bytes = data.get(match_start..match_start + total_len);
        self.matches.insert(string.id, abs_off, total_len, bytes)
    }
}

/// Reverses `data` either byte-by-byte (narrow) or 2-byte-unit-by-unit
/// (wide), keeping each unit's internal byte order intact so a
/// subsequent de-interleave of the reversed slice still sees valid
/// `(char, 0x00)` pairs. A trailing unpaired byte in the wide case is
/// dropped — it can't form a full unit anyway.
fn reverse_units(data: &[u8], wide: bool) -> Vec<u8> {
    if wide {
        data.chunks_exact(2).rev().flatten().copied().collect()
    } else {
        data.iter().rev().copied().collect()
    }
}

/// Full-word filter: the match must not be bordered by an ASCII
/// alphanumeric byte. For wide strings, the neighbor check looks two
/// bytes out and requires the interleaved zero to be present.
fn violates_full_word(data: &[u8], start: usize, len: usize, char_size: usize) -> bool {
    let is_alnum = |b: u8| b.is_ascii_alphanumeric();
    if char_size == 2 {
        if start >= 2 && data[start - 1] == 0 && is_alnum(data[start - 2]) {
            return true;
        }
        let end = start + len;
        if end + 1 < data.len() && data[end + 1] == 0 && is_alnum(data[end]) {
            return true;
        }
    } else {
        if start >= 1 && is_alnum(data[start - 1]) {
            return true;
        }
        let end = start + len;
        if end < data.len() && is_alnum(data[end]) {
            return true;
        }
    }
    false
}
