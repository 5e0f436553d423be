//! Specialized interpreter for hex-pattern-derived regex bytecode that
//! contains no alternation: literal bytes, masked literals (from `??`
//! and nibble-masked hex bytes), wildcard bytes (`??`), and bounded gaps
//! (`[a-b]`). Avoids paying for the general NFA/backtracking machinery
//! on the common case of a YARA hex string.
//!
//! # Bytecode format
//!
//! | Opcode | Encoding | Meaning |
//! |---|---|---|
//! | `0x01 LITERAL` | `[0x01, byte]` | match exactly `byte` |
//! | `0x02 MASKED`  | `[0x02, value, mask]` | match `byte & mask == value` |
//! | `0x03 ANY`     | `[0x03]` | match any byte (`??`) |
//! | `0x04 GAP`     | `[0x04, min_lo, min_hi, max_lo, max_hi]` (u16 LE) | skip `[min, max]` bytes |
//! | `0x05 MATCH`   | `[0x05]` | pattern matched |
//!
//! `GAP`'s `min`/`max` are carried directly in the opcode (see
//! `SPEC_FULL.md` §9d) rather than as a magic constant in the executor;
//! the only hard limit the executor itself enforces is the explicit
//! backtracking stack depth, `MAX_FAST_HEX_RE_STACK`.

use super::{ReExecutor, ReFlags};

/// Upper bound on the number of pending continuations the stack-based
/// interpreter will hold at once. A hex pattern with many bounded gaps
/// can branch a lot; this caps the worst case the way the distilled
/// spec's `MAX_FAST_HEX_RE_STACK = 300` does.
pub const MAX_FAST_HEX_RE_STACK: usize = 300;

const OP_LITERAL: u8 = 0x01;
const OP_MASKED: u8 = 0x02;
const OP_ANY: u8 = 0x03;
const OP_GAP: u8 = 0x04;
const OP_MATCH: u8 = 0x05;

fn decode_op_len(code: &[u8], ip: usize) -> usize {
    match code[ip] {
        OP_LITERAL => 2,
        OP_MASKED => 3,
        OP_ANY => 1,
        OP_GAP => 5,
        OP_MATCH => 1,
        op => unreachable!("invalid fast-hex opcode {op:#x}"),
    }
}

fn read_u16_le(code: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([code[at], code[at + 1]])
}

/// One pending branch of the backtracking search: resume at `ip` in the
/// bytecode, having already consumed `consumed` bytes of `data`.
struct Thread {
    ip: usize,
    consumed: usize,
}

/// Implements [`ReExecutor`] over the bytecode described in the module
/// doc. Stateless — a single instance is shared by every fast-hex string
/// in a rule set.
#[derive(Default, Debug, Clone, Copy)]
pub struct FastHexExecutor;

impl FastHexExecutor {
    pub fn new() -> Self {
        Self
    }

    fn byte_matches(b: u8, no_case: bool, against: u8) -> bool {
        if no_case {
            b.to_ascii_lowercase() == against.to_ascii_lowercase()
        } else {
            b == against
        }
    }
}

impl ReExecutor for FastHexExecutor {
    fn exec(
        &self,
        code: &[u8],
        data: &[u8],
        flags: ReFlags,
        report: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        if flags.wide {
            let narrow = super::de_interleave(data);
            let narrow_flags = ReFlags { wide: false, ..flags };
            let mut doubled = |len: usize| report(len * 2);
            return self
                .exec_narrow(code, &narrow, narrow_flags, &mut doubled)
                .map(|len| len * 2);
        }
        self.exec_narrow(code, data, flags, report)
    }
}

impl FastHexExecutor {
    fn exec_narrow(
        &self,
        code: &[u8],
        data: &[u8],
        flags: ReFlags,
        report: &mut dyn FnMut(usize),
    ) -> Option<usize> {
        let mut stack: Vec<Thread> = Vec::with_capacity(16);
        stack.push(Thread { ip: 0, consumed: 0 });

        let mut best: Option<usize> = None;

        while let Some(Thread { mut ip, mut consumed }) = stack.pop() {
            loop {
                match code[ip] {
                    OP_MATCH => {
                        if flags.exhaustive {
                            report(consumed);
                            break;
                        } else {
                            return Some(consumed);
                        }
                    }
                    OP_LITERAL => {
                        let want = code[ip + 1];
                        match data.get(consumed) {
                            Some(&b)
                                if Self::byte_matches(b, flags.no_case, want) =>
                            {
                                consumed += 1;
                                ip += decode_op_len(code, ip);
                            }
                            _ => break,
                        }
                    }
                    OP_MASKED => {
                        let value = code[ip + 1];
                        let mask = code[ip + 2];
                        match data.get(consumed) {
                            Some(&b) if b & mask == value => {
                                consumed += 1;
                                ip += decode_op_len(code, ip);
                            }
                            _ => break,
                        }
                    }
                    OP_ANY => {
                        if consumed < data.len() {
                            consumed += 1;
                            ip += decode_op_len(code, ip);
                        } else {
                            break;
                        }
                    }
                    OP_GAP => {
                        let min = read_u16_le(code, ip + 1) as usize;
                        let max = read_u16_le(code, ip + 3) as usize;
                        let next_ip = ip + decode_op_len(code, ip);
                        let next_is_literal = code.get(next_ip) == Some(&OP_LITERAL);

                        // Push longest-to-shortest so the shortest valid
                        // gap is tried first (matches YARA's preference
                        // for the earliest/shortest overall match).
                        for len in (min..=max).rev() {
                            if stack.len() >= MAX_FAST_HEX_RE_STACK {
                                break;
                            }
                            let landing = consumed + len;
                            if landing > data.len() {
                                continue;
                            }
                            if next_is_literal {
                                let want = code[next_ip + 1];
                                let lands_ok = match data.get(landing) {
                                    Some(&b) => {
                                        Self::byte_matches(b, flags.no_case, want)
                                    }
                                    None => false,
                                };
                                if !lands_ok {
                                    continue;
                                }
                            }
                            stack.push(Thread {
                                ip: next_ip,
                                consumed: landing,
                            });
                        }
                        break;
                    }
                    op => unreachable!("invalid fast-hex opcode {op:#x}"),
                }
            }

            if flags.exhaustive {
                best = best.max(Some(consumed));
            }
        }

        if flags.exhaustive {
            None
        } else {
            best
        }
    }
}
