//! Per-scan match store (4.E) and its backing bump arena.
//!
//! The distilled spec models this as a doubly-linked list per string,
//! living inside a bump-allocated region that is freed as one unit. In
//! ownership-strict Rust (see Design Notes) the list becomes a plain
//! sorted `Vec<MatchRecord>` per string — cheap to splice into with
//! `Vec::insert` at the small sizes a single string accumulates within
//! one scan — while the arena is kept for exactly what still benefits
//! from it: the copied bytes of every match, avoiding one small heap
//! allocation per match.

use crate::error::{Result, ScanError};

/// A single recorded match of one string, after dedup/merge (4.E).
///
/// `first_offset`/`last_offset` bound a run of consecutive, one-byte-apart
/// occurrence offsets that all matched with the same `length` — not the
/// byte span the match covers. A lone match has `first_offset ==
/// last_offset`; `last_offset - first_offset + 1` is the run's occurrence
/// count, per `match_callback` in `examples/original_source/libyara/rules.c`.
#[derive(Clone, Debug)]
pub struct MatchRecord {
    pub first_offset: usize,
    pub last_offset: usize,
    pub length: usize,
    bytes: Option<ArenaSlice>,
}

#[derive(Clone, Copy, Debug)]
struct ArenaSlice {
    start: usize,
    len: usize,
}

/// Bump-growing byte region scoped to one [`MatchStore`] (and thus one
/// [`crate::scanner::Scanner`]). `limit`, when set, bounds total
/// capacity so that a pathological scan (e.g. a wildcard-heavy pattern
/// producing very many one-byte-shifted candidates) can't run away;
/// exceeding it is propagated as [`ScanError::MatchesLimitExceeded`]
/// rather than silently dropped (SPEC_FULL.md §9b).
pub struct Arena {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl Arena {
    fn new(limit: Option<usize>) -> Self {
        Self { buf: Vec::with_capacity(1024), limit }
    }

    fn store(&mut self, bytes: &[u8]) -> Result<ArenaSlice> {
        if let Some(limit) = self.limit {
            if self.buf.len() + bytes.len() > limit {
                return Err(ScanError::MatchesLimitExceeded);
            }
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        Ok(ArenaSlice { start, len: bytes.len() })
    }

    fn get(&self, slice: ArenaSlice) -> &[u8] {
        &self.buf[slice.start..slice.start + slice.len]
    }
}

/// Per-string match lists for one scan session, plus the arena their
/// copied bytes live in. Exactly the per-thread scan state of the
/// distilled spec's data model, minus the thread indexing (SPEC_FULL.md
/// §9a): one `MatchStore` belongs to exactly one [`crate::scanner::Scanner`].
pub struct MatchStore {
    lists: Vec<Vec<MatchRecord>>,
    arena: Arena,
}

impl MatchStore {
    pub fn new(num_strings: usize) -> Self {
        Self {
            lists: vec![Vec::new(); num_strings],
            arena: Arena::new(None),
        }
    }

    pub fn with_arena_limit(num_strings: usize, limit: usize) -> Self {
        Self {
            lists: vec![Vec::new(); num_strings],
            arena: Arena::new(Some(limit)),
        }
    }

    pub fn has_match(&self, string_id: usize) -> bool {
        !self.lists[string_id].is_empty()
    }

    pub fn records(&self, string_id: usize) -> &[MatchRecord] {
        &self.lists[string_id]
    }

    pub fn matched_bytes(&self, record: &MatchRecord) -> Option<&[u8]> {
        record.bytes.map(|s| self.arena.get(s))
    }

    /// Inserts a new match, deduplicating and merging with adjacent
    /// equal-length runs per 4.E. `bytes`, if given, is copied into the
    /// arena only when the match is actually inserted as a new record —
    /// merges and duplicates reuse the existing record's copy.
    pub fn insert(
        &mut self,
        string_id: usize,
        match_offset: usize,
        length: usize,
        bytes: Option<&[u8]>,
    ) -> Result<()> {
        let list = &mut self.lists[string_id];
        let mut idx = list.len();

        while idx > 0 {
            let rec = &list[idx - 1];
            if rec.length == length {
                if match_offset >= rec.first_offset && match_offset <= rec.last_offset {
                    return Ok(()); // duplicate: same run, already recorded
                }
                if match_offset == rec.last_offset + 1 {
                    list[idx - 1].last_offset += 1;
                    return Ok(());
                }
                if match_offset + 1 == rec.first_offset {
                    list[idx - 1].first_offset -= 1;
                    return Ok(());
                }
            }
            // Ordered list: once a record's last_offset is behind the new
            // match and none of the merge cases above fired, no earlier
            // record can be adjacent/overlapping either. Stop scanning.
            if match_offset > rec.last_offset {
                break;
            }
            idx -= 1;
        }

        let stored = match bytes {
            Some(b) => Some(self.arena.store(b)?),
            None => None,
        };
        // `first_offset`/`last_offset` both start at the new match's own
        // offset (`match_callback` in rules.c: `new_match->last_offset =
        // match_offset`), not the matched span's end byte — the run this
        // record tracks is a sequence of consecutive, one-byte-apart
        // occurrence offsets of the same length, extended one offset at a
        // time by the merge branches above, not a contiguous byte range.
        list.insert(
            idx,
            MatchRecord {
                first_offset: match_offset,
                last_offset: match_offset,
                length,
                bytes: stored,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_non_overlapping_matches_stay_separate() {
        // "foo" over "xfoofoofoox" -> offsets 1, 4, 7, each length 3.
        let mut store = MatchStore::new(1);
        store.insert(0, 1, 3, None).unwrap();
        store.insert(0, 4, 3, None).unwrap();
        store.insert(0, 7, 3, None).unwrap();
        let recs = store.records(0);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].first_offset, 1);
        assert_eq!(recs[1].first_offset, 4);
        assert_eq!(recs[2].first_offset, 7);
    }

    #[test]
    fn adjacent_equal_length_runs_merge() {
        // One-byte-shifted duplicate occurrences (e.g. a wildcard-heavy
        // pattern re-triggering at every consecutive offset) merge into a
        // single record spanning the run of offsets, not a separate
        // record per occurrence.
        let mut store = MatchStore::new(1);
        store.insert(0, 5, 2, None).unwrap();
        store.insert(0, 6, 2, None).unwrap(); // offset == last_offset + 1 -> extend
        let recs = store.records(0);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].first_offset, 5);
        assert_eq!(recs[0].last_offset, 6);
    }

    #[test]
    fn duplicate_within_existing_run_is_dropped() {
        // Build a two-offset run first, then re-insert an offset already
        // covered by it: the third insert must be dropped rather than
        // starting a new record or re-extending the run.
        let mut store = MatchStore::new(1);
        store.insert(0, 5, 4, None).unwrap();
        store.insert(0, 6, 4, None).unwrap(); // extends run to [5, 6]
        store.insert(0, 6, 4, None).unwrap(); // offset within [5, 6] -> duplicate
        assert_eq!(store.records(0).len(), 1);
        assert_eq!(store.records(0)[0].first_offset, 5);
        assert_eq!(store.records(0)[0].last_offset, 6);
    }

    #[test]
    fn out_of_order_insert_keeps_ascending_order() {
        let mut store = MatchStore::new(1);
        store.insert(0, 10, 1, None).unwrap();
        store.insert(0, 0, 1, None).unwrap();
        store.insert(0, 5, 1, None).unwrap();
        let offsets: Vec<_> = store.records(0).iter().map(|r| r.first_offset).collect();
        assert_eq!(offsets, vec![0, 5, 10]);
    }

    #[test]
    fn arena_limit_is_propagated_as_error() {
        let mut store = MatchStore::with_arena_limit(1, 4);
        store.insert(0, 0, 4, Some(b"abcd")).unwrap();
        let err = store.insert(0, 10, 4, Some(b"efgh"));
        assert!(err.is_err());
    }
}
