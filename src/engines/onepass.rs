//! One-pass engine.
//!
//! A program is *one-pass* when, at any reachable point, no input byte
//! admits two distinct byte-consuming choices: a deterministic walk can
//! then track captures with a single thread and no re-scanning.
//!
//! [`is_one_pass`] establishes the property conservatively at
//! construction time by exploring epsilon-closure frontiers and checking
//! byte-level determinism (assertions are merged, which can only
//! over-report ambiguity). [`search`] is the engine itself: per position
//! it runs one priority-ordered epsilon walk that finds the unique
//! accepting consumer, records match fallbacks the way a backtracker
//! would reach them, and commits capture writes along the single viable
//! path. Anchored searches only; the orchestrator never hands it an
//! unanchored scan.

use std::ops::Range;

use crate::engines::{look_matches, slots_to_spans, Kind};
use crate::program::{Inst, InstPtr, Program};

/// Work cap for the property check; programs past this size are simply
/// declared not one-pass.
const MAX_ONE_PASS_PROG: usize = 1000;

/// Most capture pairs the engine will track; beyond this the facade
/// picks another engine.
pub(crate) const MAX_ONE_PASS_CAPTURE: usize = 5;

/// Conservative one-pass check: walk deduplicated closure frontiers and
/// reject as soon as two byte-consuming instructions overlap on any
/// byte.
pub(crate) fn is_one_pass(prog: &Program) -> bool {
    if prog.size() > MAX_ONE_PASS_PROG {
        return false;
    }

    // Closure of a frontier: all consuming instructions reachable
    // through epsilon transitions, with assertions followed
    // unconditionally.
    let closure = |seeds: &[InstPtr]| -> Vec<InstPtr> {
        let mut seen = vec![false; prog.insts.len()];
        let mut stack = seeds.to_vec();
        let mut consuming = Vec::new();
        while let Some(ip) = stack.pop() {
            if std::mem::replace(&mut seen[ip.idx()], true) {
                continue;
            }
            match prog.insts[ip] {
                Inst::Byte { .. } | Inst::Class { .. } => consuming.push(ip),
                Inst::Split { goto1, goto2 } => {
                    stack.push(goto1);
                    stack.push(goto2);
                }
                Inst::Save { goto, .. } | Inst::Look { goto, .. } | Inst::Nop { goto } => {
                    stack.push(goto)
                }
                Inst::Fail | Inst::Match => {}
            }
        }
        consuming.sort_unstable();
        consuming
    };

    let mut visited: std::collections::HashSet<Vec<InstPtr>> = std::collections::HashSet::new();
    let mut queue = vec![closure(&[prog.start])];
    let budget = 4 * prog.size() + 16;
    while let Some(node) = queue.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if visited.len() > budget {
            return false;
        }
        let mut claimed = [false; 256];
        for &ip in &node {
            let mut overlap = false;
            let mut mark = |b: usize| {
                if std::mem::replace(&mut claimed[b], true) {
                    overlap = true;
                }
            };
            match prog.insts[ip] {
                Inst::Byte { byte, .. } => mark(byte as usize),
                Inst::Class { class, .. } => {
                    for (b, &hit) in prog.classes[class].0.iter().enumerate() {
                        if hit {
                            mark(b);
                        }
                    }
                }
                _ => unreachable!("closure collects only consuming instructions"),
            }
            if overlap {
                return false;
            }
        }
        for &ip in &node {
            let goto = match prog.insts[ip] {
                Inst::Byte { goto, .. } | Inst::Class { goto, .. } => goto,
                _ => unreachable!(),
            };
            queue.push(closure(&[goto]));
        }
    }
    true
}

/// Outcome of the per-position epsilon walk.
struct Probe {
    /// The unique consuming instruction accepting the current byte, with
    /// the capture slots its path wrote.
    acceptor: Option<(InstPtr, Box<[Option<usize>]>)>,
    /// `Match` reached before the acceptor in priority order.
    match_before: Option<Box<[Option<usize>]>>,
    /// `Match` reached after the acceptor: the backtracker's fallback if
    /// the committed path later dies.
    match_after: Option<Box<[Option<usize>]>>,
}

struct Walker<'a> {
    prog: &'a Program,
    text: &'a [u8],
    nslots: usize,
    seen: Vec<bool>,
}

impl<'a> Walker<'a> {
    /// Priority-ordered epsilon walk from `ip`. Capture writes are undone
    /// on the way out; the snapshots in `probe` keep what each endpoint
    /// saw.
    fn walk(&mut self, ip: InstPtr, pos: usize, byte: Option<u8>, caps: &mut Vec<Option<usize>>, probe: &mut Probe) {
        if probe.match_after.is_some() || std::mem::replace(&mut self.seen[ip.idx()], true) {
            return;
        }
        match self.prog.insts[ip] {
            Inst::Split { goto1, goto2 } => {
                self.walk(goto1, pos, byte, caps, probe);
                self.walk(goto2, pos, byte, caps, probe);
            }
            Inst::Save { slot, goto } => {
                let slot = slot as usize;
                if slot < self.nslots {
                    let old = caps[slot];
                    caps[slot] = Some(pos);
                    self.walk(goto, pos, byte, caps, probe);
                    caps[slot] = old;
                } else {
                    self.walk(goto, pos, byte, caps, probe);
                }
            }
            Inst::Look { look, goto } => {
                if look_matches(look, self.text, pos) {
                    self.walk(goto, pos, byte, caps, probe);
                }
            }
            Inst::Nop { goto } => self.walk(goto, pos, byte, caps, probe),
            Inst::Fail => {}
            Inst::Byte { byte: want, .. } => {
                if probe.acceptor.is_none() && byte == Some(want) {
                    probe.acceptor = Some((ip, caps.clone().into_boxed_slice()));
                }
            }
            Inst::Class { class, .. } => {
                if probe.acceptor.is_none() && byte.is_some_and(|b| self.prog.classes[class][b]) {
                    probe.acceptor = Some((ip, caps.clone().into_boxed_slice()));
                }
            }
            Inst::Match => {
                let snap = caps.clone().into_boxed_slice();
                if probe.acceptor.is_none() {
                    if probe.match_before.is_none() {
                        probe.match_before = Some(snap);
                    }
                } else {
                    probe.match_after = Some(snap);
                }
            }
        }
    }
}

/// Deterministic anchored search with captures. Requires the one-pass
/// property; behavior on ambiguous programs is undefined (the facade
/// gates on [`is_one_pass`]).
pub(crate) fn search(
    prog: &Program,
    text: &[u8],
    range: Range<usize>,
    kind: Kind,
    spans: &mut [Option<std::ops::Range<usize>>],
) -> bool {
    let nslots = prog.nslots.min(spans.len() * 2);
    let mut walker = Walker {
        prog,
        text,
        nslots,
        seen: vec![false; prog.insts.len()],
    };
    let mut caps: Vec<Option<usize>> = vec![None; nslots];
    let mut ip = prog.start;
    // Matches skipped over by committed consumers; the innermost one is
    // the backtracker's next fallback.
    let mut pending: Vec<Box<[Option<usize>]>> = Vec::new();
    let mut best: Option<Box<[Option<usize>]>> = None;

    let mut pos = range.start;
    loop {
        let byte = if pos < range.end { Some(text[pos]) } else { None };
        let mut probe = Probe {
            acceptor: None,
            match_before: None,
            match_after: None,
        };
        walker.seen.iter_mut().for_each(|s| *s = false);
        walker.walk(ip, pos, byte, &mut caps, &mut probe);

        match kind {
            Kind::First => {
                if let Some(snap) = probe.match_before {
                    slots_to_spans(&snap, spans);
                    return true;
                }
                match probe.acceptor {
                    Some((acc, snap)) => {
                        if let Some(fallback) = probe.match_after {
                            pending.push(fallback);
                        }
                        caps = snap.to_vec();
                        ip = goto_of(prog, acc);
                        pos += 1;
                    }
                    None => {
                        return match pending.pop() {
                            Some(snap) => {
                                slots_to_spans(&snap, spans);
                                true
                            }
                            None => false,
                        };
                    }
                }
            }
            Kind::Longest => {
                // Positions only grow, so any match here is the longest
                // so far; priority breaks ties.
                if let Some(snap) = probe.match_before.or(probe.match_after) {
                    best = Some(snap);
                }
                match probe.acceptor {
                    Some((acc, snap)) => {
                        caps = snap.to_vec();
                        ip = goto_of(prog, acc);
                        pos += 1;
                    }
                    None => {
                        return match best {
                            Some(snap) => {
                                slots_to_spans(&snap, spans);
                                true
                            }
                            None => false,
                        };
                    }
                }
            }
            Kind::Full => {
                if pos == range.end {
                    return match probe.match_before.or(probe.match_after) {
                        Some(snap) => {
                            slots_to_spans(&snap, spans);
                            true
                        }
                        None => false,
                    };
                }
                match probe.acceptor {
                    Some((acc, snap)) => {
                        caps = snap.to_vec();
                        ip = goto_of(prog, acc);
                        pos += 1;
                    }
                    None => return false,
                }
            }
        }
    }
}

fn goto_of(prog: &Program, ip: InstPtr) -> InstPtr {
    match prog.insts[ip] {
        Inst::Byte { goto, .. } | Inst::Class { goto, .. } => goto,
        _ => unreachable!("acceptor is a consuming instruction"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::compile;

    /// ASCII class mode: Unicode `\d`/`\w` expand to large UTF-8
    /// automata that trip the one-pass size cap, which is not what these
    /// tests are probing.
    fn prog(pattern: &str) -> Program {
        let hir = regex_syntax::ParserBuilder::new()
            .utf8(false)
            .unicode(false)
            .build()
            .parse(pattern)
            .expect("pattern should parse");
        compile(&hir, 1 << 20).expect("program should fit")
    }

    #[test]
    fn test_one_pass_property() {
        assert!(is_one_pass(&prog(r"(\d+)-(\d+)")));
        assert!(is_one_pass(&prog("abc")));
        assert!(is_one_pass(&prog("(a)(b)?")));
        assert!(is_one_pass(&prog("[a-c]x|[d-f]y")));
        // `a` then `a...`: the first byte is ambiguous.
        assert!(!is_one_pass(&prog("a|ab")));
        assert!(!is_one_pass(&prog("a*a")));
    }

    #[test]
    fn test_search_with_captures() {
        let p = prog(r"(\d+)-(\d+)");
        assert!(is_one_pass(&p));
        let mut spans = vec![None; 3];
        assert!(search(&p, b"42-17", 0..5, Kind::Full, &mut spans));
        assert_eq!(spans[0], Some(0..5));
        assert_eq!(spans[1], Some(0..2));
        assert_eq!(spans[2], Some(3..5));
    }

    #[test]
    fn test_full_kind_rejects_partial() {
        let p = prog("a+");
        let mut spans = vec![None; 1];
        assert!(!search(&p, b"aab", 0..3, Kind::Full, &mut spans));
        assert!(search(&p, b"aaa", 0..3, Kind::Full, &mut spans));
        assert_eq!(spans[0], Some(0..3));
    }

    #[test]
    fn test_first_kind_falls_back_after_dead_end() {
        // Greedy `(bc)?` commits to `b` on "abx" and dies at `x`; the
        // backtracker's answer is the shorter match "a".
        let p = prog("a(bc)?");
        assert!(is_one_pass(&p));
        let mut spans = vec![None; 2];
        assert!(search(&p, b"abx", 0..3, Kind::First, &mut spans));
        assert_eq!(spans[0], Some(0..1));
        assert_eq!(spans[1], None);
    }

    #[test]
    fn test_first_kind_greedy() {
        let p = prog("a+");
        let mut spans = vec![None; 1];
        assert!(search(&p, b"aaab", 0..4, Kind::First, &mut spans));
        assert_eq!(spans[0], Some(0..3));
    }

    #[test]
    fn test_unmatched_group_is_none() {
        let p = prog("(a)(b)?");
        let mut spans = vec![None; 3];
        assert!(search(&p, b"a", 0..1, Kind::Full, &mut spans));
        assert_eq!(spans[1], Some(0..1));
        assert_eq!(spans[2], None);
    }

    #[test]
    fn test_longest_kind() {
        let p = prog("a(bc)?");
        let mut spans = vec![None; 1];
        assert!(search(&p, b"abc", 0..3, Kind::Longest, &mut spans));
        assert_eq!(spans[0], Some(0..3));
    }

    #[test]
    fn test_anchored_miss() {
        let p = prog("foo");
        let mut spans = vec![None; 1];
        assert!(!search(&p, b"xfoo", 0..4, Kind::First, &mut spans));
    }
}
