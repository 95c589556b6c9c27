//! Lazy DFA: NFA-set simulation with an interned, bounded state cache.
//!
//! States are determinized on demand: a DFA state is the sorted set of
//! program instructions reachable at a position, plus a small summary of
//! the adjacent already-consumed byte so that empty-width assertions can
//! be resolved once the byte on the other side is known. State keys are
//! interned through an [`IndexSet`]; transitions live in a hash map keyed
//! by (state, context byte, flags).
//!
//! Unanchored scans inject a fresh start-of-pattern thread at each
//! position. The injection is part of the *state* (the `seeded` marker)
//! rather than the instruction set, because leftmost semantics forbid
//! new matches from starting once a match has been seen: a seeded state
//! whose older threads reach `Match` never expands its fresh thread.
//!
//! The cache is bounded by the program's DFA budget. Exceeding it makes
//! the search report [`DfaResult::Failed`] — *not* "no match" — which
//! sends the orchestrator down its fallback ladder.
//!
//! The DFA tracks no capture slots. A forward scan yields the position
//! where a match ends; composing it with a reverse scan of the
//! structurally reversed program (anchored at that end, longest-match)
//! yields the position where the match starts.

use std::collections::HashMap;
use std::ops::Range;

use indexmap::IndexSet;
use regex_syntax::hir::Look;

use crate::engines::{is_word_byte, Kind};
use crate::program::{Inst, InstPtr, Program};

/// Outcome of a DFA scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DfaResult {
    /// A match boundary: the end position for forward scans, the start
    /// position for reverse scans.
    Match(usize),
    NoMatch,
    /// The state cache ran out of memory; the caller must fall back to
    /// another engine.
    Failed,
}

/// Context byte value for "no byte here" (text boundary).
const NO_BYTE: u16 = 256;

/// Sentinel state id for the dead state.
const DEAD: u32 = u32::MAX;

// Summary bits for the adjacent byte kept inside a state key.
const F_NONE: u8 = 1 << 0;
const F_NL: u8 = 1 << 1;
const F_CR: u8 = 1 << 2;
const F_WORD: u8 = 1 << 3;

fn flags_of(ctx: u16) -> u8 {
    if ctx == NO_BYTE {
        return F_NONE;
    }
    let b = ctx as u8;
    let mut f = 0;
    if b == b'\n' {
        f |= F_NL;
    }
    if b == b'\r' {
        f |= F_CR;
    }
    if is_word_byte(b) {
        f |= F_WORD;
    }
    f
}

/// Evaluate a look with byte summaries on both sides.
fn look_holds(look: Look, before: u8, after: u8) -> bool {
    let (b_none, b_nl, b_cr, b_word) = (
        before & F_NONE != 0,
        before & F_NL != 0,
        before & F_CR != 0,
        before & F_WORD != 0,
    );
    let (a_none, a_nl, a_cr, a_word) = (
        after & F_NONE != 0,
        after & F_NL != 0,
        after & F_CR != 0,
        after & F_WORD != 0,
    );
    match look {
        Look::Start => b_none,
        Look::End => a_none,
        Look::StartLF => b_none || b_nl,
        Look::EndLF => a_none || a_nl,
        Look::StartCRLF => b_none || b_nl || (b_cr && !a_nl),
        Look::EndCRLF => a_none || a_cr || (a_nl && !b_cr),
        Look::WordAscii | Look::WordUnicode => b_word != a_word,
        Look::WordAsciiNegate | Look::WordUnicodeNegate => b_word == a_word,
        Look::WordStartAscii | Look::WordStartUnicode => !b_word && a_word,
        Look::WordEndAscii | Look::WordEndUnicode => b_word && !a_word,
        Look::WordStartHalfAscii | Look::WordStartHalfUnicode => !b_word,
        Look::WordEndHalfAscii | Look::WordEndHalfUnicode => !a_word,
    }
}

/// A determinized state: instruction set before closure, the summary of
/// the adjacent consumed byte (the side the scan came from), and whether
/// a fresh start-of-pattern thread is pending at this position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StateKey {
    ips: Box<[u32]>,
    flags: u8,
    seeded: bool,
}

/// Interned states and memoized transitions, bounded by the program's
/// DFA budget. Lives inside [`Program`] behind a mutex and is shared by
/// all searches of that program.
#[derive(Debug, Default)]
pub(crate) struct DfaCache {
    states: IndexSet<StateKey>,
    /// (state, context byte, packed consume/fresh flags) -> (next state,
    /// match-at-position).
    trans: HashMap<(u32, u16, u8), (u32, bool)>,
    mem: usize,
}

impl DfaCache {
    fn intern(&mut self, key: StateKey, budget: usize) -> Option<u32> {
        let cost = key.ips.len() * 4 + 48;
        let (idx, inserted) = self.states.insert_full(key);
        if inserted {
            self.mem += cost;
            if self.mem > budget {
                return None;
            }
        }
        Some(idx as u32)
    }

    #[cfg(test)]
    pub(crate) fn state_count(&self) -> usize {
        self.states.len()
    }
}

struct Scan<'a> {
    prog: &'a Program,
    cache: &'a mut DfaCache,
    /// Reverse scans consume leftward; the state summary then describes
    /// the byte on the right side instead of the left.
    reverse: bool,
}

impl<'a> Scan<'a> {
    /// Memoized transition: from `sid`, with context byte `ctx` on the
    /// unknown side. `fresh` is whether the driver still permits new
    /// match starts (no match seen at earlier positions). `cut` is
    /// leftmost-first closure semantics: stop expanding once `Match` is
    /// reached, so lower-priority alternatives die the way they would in
    /// a backtracker. When `consume` is false only the match flag is
    /// meaningful (scan-boundary probe).
    fn transition(
        &mut self,
        sid: u32,
        ctx: u16,
        consume: bool,
        fresh: bool,
        cut: bool,
    ) -> Option<(u32, bool)> {
        let packed = (consume as u8) | ((fresh as u8) << 1) | ((cut as u8) << 2);
        if let Some(&cached) = self.cache.trans.get(&(sid, ctx, packed)) {
            return Some(cached);
        }

        let state = self.cache.states.get_index(sid as usize).expect("live state id");
        let (ips, state_flags, seeded) = (state.ips.clone(), state.flags, state.seeded);
        let ctx_flags = flags_of(ctx);
        let (before, after) = if self.reverse {
            (ctx_flags, state_flags)
        } else {
            (state_flags, ctx_flags)
        };

        // Epsilon closure with both sides of the position known. Stage A
        // expands the surviving older threads; the pending fresh thread
        // (stage B) only expands when no older thread already matched, so
        // no new match can start after a match has been seen.
        let mut seen = vec![false; self.prog.insts.len()];
        let mut stack: Vec<InstPtr> = ips.iter().rev().map(|&ip| InstPtr(ip)).collect();
        let mut consuming: Vec<InstPtr> = Vec::new();
        let mut match_here = false;
        'stages: for stage in 0..2 {
            if stage == 1 {
                if !(seeded && fresh && !match_here) {
                    break;
                }
                stack.push(self.prog.start);
            }
            // The stack pops in thread priority order (split targets are
            // pushed second-first), so consuming instructions come out in
            // the order a backtracker would try them.
            while let Some(ip) = stack.pop() {
                if std::mem::replace(&mut seen[ip.idx()], true) {
                    continue;
                }
                match self.prog.insts[ip] {
                    Inst::Byte { .. } | Inst::Class { .. } => consuming.push(ip),
                    Inst::Match => {
                        match_here = true;
                        if cut {
                            break 'stages;
                        }
                    }
                    Inst::Split { goto1, goto2 } => {
                        stack.push(goto2);
                        stack.push(goto1);
                    }
                    Inst::Save { goto, .. } | Inst::Nop { goto } => stack.push(goto),
                    Inst::Look { look, goto } => {
                        if look_holds(look, before, after) {
                            stack.push(goto);
                        }
                    }
                    Inst::Fail => {}
                }
            }
        }

        let next = if !consume {
            DEAD
        } else {
            let b = ctx as u8;
            let mut targets: Vec<u32> = consuming
                .iter()
                .filter_map(|&ip| match self.prog.insts[ip] {
                    Inst::Byte { byte, goto } if byte == b => Some(goto.0),
                    Inst::Class { class, goto } if self.prog.classes[class][b] => Some(goto.0),
                    _ => None,
                })
                .collect();
            // Dedup preserving priority order; sorting would merge states
            // whose thread priorities differ.
            let mut dedup = std::collections::HashSet::with_capacity(targets.len());
            targets.retain(|&ip| dedup.insert(ip));
            let next_seeded = fresh && !match_here;
            if targets.is_empty() && !next_seeded {
                DEAD
            } else {
                self.cache.intern(
                    StateKey {
                        ips: targets.into_boxed_slice(),
                        flags: flags_of(b as u16),
                        seeded: next_seeded,
                    },
                    self.prog.dfa_budget,
                )?
            }
        };

        self.cache.mem += 32;
        if self.cache.mem > self.prog.dfa_budget {
            return None;
        }
        self.cache.trans.insert((sid, ctx, packed), (next, match_here));
        Some((next, match_here))
    }
}

fn byte_ctx(text: &[u8], pos: Option<usize>) -> u16 {
    match pos.and_then(|p| text.get(p)) {
        Some(&b) => b as u16,
        None => NO_BYTE,
    }
}

/// Forward scan over `text[range]`. On a match, reports the position
/// where the match *ends*; the start is unknown (run [`search_rev`] to
/// recover it).
pub(crate) fn search_fwd(
    prog: &Program,
    text: &[u8],
    range: Range<usize>,
    anchored: bool,
    kind: Kind,
) -> DfaResult {
    let mut cache = prog.dfa.lock().unwrap();
    let mut scan = Scan {
        prog,
        cache: &mut cache,
        reverse: false,
    };
    let seed_key = StateKey {
        ips: vec![prog.start.0].into_boxed_slice(),
        flags: flags_of(byte_ctx(text, range.start.checked_sub(1))),
        seeded: false,
    };
    let Some(mut sid) = scan.cache.intern(seed_key, prog.dfa_budget) else {
        return DfaResult::Failed;
    };

    // Leftmost-first gets backtracker-style closure cuts; longest keeps
    // every alternative alive. Either way the scan records the last
    // position where a match was observed and runs until the state dies.
    let cut = kind == Kind::First;
    let mut matched: Option<usize> = None;
    for pos in range.start..=range.end {
        let consume = pos < range.end;
        let ctx = if consume {
            text[pos] as u16
        } else {
            byte_ctx(text, Some(pos))
        };
        let fresh = !anchored && matched.is_none();
        let Some((next, match_here)) = scan.transition(sid, ctx, consume, fresh, cut) else {
            return DfaResult::Failed;
        };
        if match_here {
            match kind {
                Kind::Full => {
                    if pos == range.end {
                        return DfaResult::Match(pos);
                    }
                }
                Kind::First | Kind::Longest => matched = Some(pos),
            }
        }
        if !consume || next == DEAD {
            break;
        }
        sid = next;
    }
    match matched {
        Some(end) => DfaResult::Match(end),
        None => DfaResult::NoMatch,
    }
}

/// Reverse scan: run the reversed program leftward from `range.end`
/// (where the forward match is known to end) and report the leftmost
/// position where the reverse walk completes — the start of the longest
/// match ending there.
pub(crate) fn search_rev(prog: &Program, text: &[u8], range: Range<usize>) -> DfaResult {
    let mut cache = prog.dfa.lock().unwrap();
    let mut scan = Scan {
        prog,
        cache: &mut cache,
        reverse: true,
    };
    let seed_key = StateKey {
        ips: vec![prog.start.0].into_boxed_slice(),
        flags: flags_of(byte_ctx(text, Some(range.end))),
        seeded: false,
    };
    let Some(mut sid) = scan.cache.intern(seed_key, prog.dfa_budget) else {
        return DfaResult::Failed;
    };

    let mut matched: Option<usize> = None;
    let mut pos = range.end;
    loop {
        let consume = pos > range.start;
        let ctx = if consume {
            text[pos - 1] as u16
        } else {
            byte_ctx(text, pos.checked_sub(1))
        };
        let Some((next, match_here)) = scan.transition(sid, ctx, consume, false, false) else {
            return DfaResult::Failed;
        };
        if match_here {
            // Positions decrease, so the last write is the leftmost.
            matched = Some(pos);
        }
        if !consume || next == DEAD {
            break;
        }
        sid = next;
        pos -= 1;
    }
    match matched {
        Some(start) => DfaResult::Match(start),
        None => DfaResult::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{compile, reverse_hir};

    fn parse(pattern: &str) -> regex_syntax::hir::Hir {
        regex_syntax::ParserBuilder::new()
            .utf8(false)
            .build()
            .parse(pattern)
            .expect("pattern should parse")
    }

    fn prog(pattern: &str) -> Program {
        compile(&parse(pattern), 1 << 20).expect("program should fit")
    }

    fn rprog(pattern: &str) -> Program {
        compile(&reverse_hir(&parse(pattern)), 1 << 20).expect("program should fit")
    }

    #[test]
    fn test_forward_match_end() {
        let p = prog("foo");
        assert_eq!(
            search_fwd(&p, b"abcfoode", 0..8, false, Kind::First),
            DfaResult::Match(6)
        );
        assert_eq!(
            search_fwd(&p, b"abc", 0..3, false, Kind::First),
            DfaResult::NoMatch
        );
    }

    #[test]
    fn test_forward_longest_keeps_leftmost_start() {
        // Once the first `a` matched, no new match may start: the end
        // must be 1, not 2.
        let p = prog("a");
        assert_eq!(
            search_fwd(&p, b"aa", 0..2, false, Kind::Longest),
            DfaResult::Match(1)
        );
        // Same start, longer alternative: the longest end wins.
        let p = prog("a|ab");
        assert_eq!(
            search_fwd(&p, b"xab", 0..3, false, Kind::Longest),
            DfaResult::Match(3)
        );
    }

    #[test]
    fn test_forward_full_kind() {
        let p = prog("a+");
        assert_eq!(
            search_fwd(&p, b"aaa", 0..3, true, Kind::Full),
            DfaResult::Match(3)
        );
        assert_eq!(
            search_fwd(&p, b"aab", 0..3, true, Kind::Full),
            DfaResult::NoMatch
        );
    }

    #[test]
    fn test_reverse_finds_match_start() {
        // Forward found the end of `a+` at 5 in "xxaaa"; reverse walks
        // back to the leftmost start 2.
        let p = rprog("a+");
        assert_eq!(search_rev(&p, b"xxaaa", 0..5), DfaResult::Match(2));
    }

    #[test]
    fn test_anchor_in_subrange_uses_absolute_position() {
        // `^b` can never match at absolute position 1.
        let p = prog("^b");
        assert_eq!(
            search_fwd(&p, b"ab", 1..2, true, Kind::First),
            DfaResult::NoMatch
        );
        let p = prog("^a");
        assert_eq!(
            search_fwd(&p, b"ab", 0..2, true, Kind::First),
            DfaResult::Match(1)
        );
    }

    #[test]
    fn test_end_assertion_sees_byte_after_range() {
        // Probing `$` at a sub-range end must look at the real next byte.
        let p = prog("ab$");
        assert_eq!(
            search_fwd(&p, b"abx", 0..2, true, Kind::First),
            DfaResult::NoMatch
        );
        assert_eq!(
            search_fwd(&p, b"ab", 0..2, true, Kind::First),
            DfaResult::Match(2)
        );
    }

    #[test]
    fn test_word_boundary_in_dfa() {
        let p = prog(r"\bfoo\b");
        assert_eq!(
            search_fwd(&p, b"xfoo foo", 0..8, false, Kind::First),
            DfaResult::Match(8)
        );
    }

    #[test]
    fn test_empty_match_at_seed() {
        let p = prog("a*");
        assert_eq!(
            search_fwd(&p, b"bbb", 0..3, false, Kind::First),
            DfaResult::Match(0)
        );
    }

    #[test]
    fn test_budget_exhaustion_reports_failed() {
        let mut p = prog("(a|b)+c");
        p.dfa_budget = 0;
        assert_eq!(
            search_fwd(&p, b"ababc", 0..5, false, Kind::First),
            DfaResult::Failed
        );
    }

    #[test]
    fn test_cache_reuse_across_searches() {
        let p = prog("ab");
        for _ in 0..3 {
            assert_eq!(
                search_fwd(&p, b"zzab", 0..4, false, Kind::First),
                DfaResult::Match(4)
            );
        }
        let states = p.dfa.lock().unwrap().state_count();
        assert!(states > 0);
        // A fourth run must not grow the cache.
        assert_eq!(
            search_fwd(&p, b"zzab", 0..4, false, Kind::First),
            DfaResult::Match(4)
        );
        assert_eq!(p.dfa.lock().unwrap().state_count(), states);
    }

    #[test]
    fn test_oracle_agreement_on_ends() {
        for (pattern, text) in [
            ("fo+", "xxfooooy"),
            ("[a-c]+d", "zzabcabcd!"),
            ("(ab|cd)+", "xabcdaby"),
        ] {
            let oracle = regex::Regex::new(pattern).unwrap();
            let m = oracle.find(text).unwrap();
            let p = prog(pattern);
            // Leftmost-first end: the DFA reports the earliest end, then
            // continuing threads may extend it. Compare via longest kind,
            // which for these patterns coincides with leftmost-first.
            assert_eq!(
                search_fwd(&p, text.as_bytes(), 0..text.len(), false, Kind::Longest),
                DfaResult::Match(m.end()),
                "pattern `{}`",
                pattern
            );
            let rp = rprog(pattern);
            assert_eq!(
                search_rev(&rp, text.as_bytes(), 0..m.end()),
                DfaResult::Match(m.start()),
                "reverse `{}`",
                pattern
            );
        }
    }
}
