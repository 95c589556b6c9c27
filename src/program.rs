//! Compiled regex programs.
//!
//! A [`Program`] is a flat instruction list compiled from a
//! `regex-syntax` [`Hir`]. The pipeline is:
//!
//! ```text
//! regex_syntax::hir::Hir  ──Compiler::c──>  Inst list  ──patch──>  Program
//! ```
//!
//! Construction uses fragment patching: each sub-expression compiles to a
//! [`Frag`] with a start instruction and a list of dangling `goto` holes
//! that the next fragment's start is patched into. [`InstPtr::NONE`] marks
//! an unpatched hole.
//!
//! Character classes are lowered to 256-entry boolean lookup tables,
//! deduplicated through an [`IndexSet`] so that repeated classes (most
//! prominently UTF-8 continuation ranges) share a single table.
//!
//! Bounded repetition is compiled by unrolling under the memory budget;
//! a pattern whose unrolled program exceeds the budget fails to compile
//! and surfaces as a pattern-too-large error upstream.

use std::ops::{Index, IndexMut};
use std::sync::Mutex;

use indexmap::IndexSet;
use regex_syntax::hir::{self, Hir, HirKind, Look};
use regex_syntax::utf8::Utf8Sequences;

use crate::engines::dfa::DfaCache;

// ---------------------------------------------------------------------------
// Instruction pointers
// ---------------------------------------------------------------------------

/// Index into the instruction array ([`Program::insts`]).
///
/// [`InstPtr::NONE`] is the "dangling/unpatched" marker used during
/// construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct InstPtr(pub(crate) u32);

impl InstPtr {
    /// Sentinel value for unpatched `goto` holes during construction.
    pub(crate) const NONE: Self = Self(u32::MAX);

    /// Return the raw index as `usize`. Panics on `NONE` in debug builds.
    #[inline]
    pub(crate) fn idx(self) -> usize {
        debug_assert!(self != Self::NONE, "InstPtr::NONE used as index");
        self.0 as usize
    }
}

/// `insts[ip]` — typed access to the instruction array.
impl Index<InstPtr> for [Inst] {
    type Output = Inst;

    #[inline]
    fn index(&self, ip: InstPtr) -> &Inst {
        &self[ip.idx()]
    }
}

impl IndexMut<InstPtr> for [Inst] {
    #[inline]
    fn index_mut(&mut self, ip: InstPtr) -> &mut Inst {
        &mut self[ip.idx()]
    }
}

impl Index<InstPtr> for Vec<Inst> {
    type Output = Inst;

    #[inline]
    fn index(&self, ip: InstPtr) -> &Inst {
        &self.as_slice()[ip]
    }
}

impl IndexMut<InstPtr> for Vec<Inst> {
    #[inline]
    fn index_mut(&mut self, ip: InstPtr) -> &mut Inst {
        &mut self.as_mut_slice()[ip]
    }
}

// ---------------------------------------------------------------------------
// Byte classes
// ---------------------------------------------------------------------------

/// A 256-entry boolean lookup table indicating which byte values belong
/// to a character class. `class[b]` is `true` when byte `b` matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ByteClass(pub(crate) [bool; 256]);

impl ByteClass {
    /// A class that matches no byte value.
    pub(crate) const NONE: Self = Self([false; 256]);

    fn mark_range(&mut self, lo: u8, hi: u8) {
        for b in lo..=hi {
            self.0[b as usize] = true;
        }
    }

    fn is_empty(&self) -> bool {
        !self.0.iter().any(|&b| b)
    }

    /// Smallest byte in the class, if any.
    pub(crate) fn min_byte(&self) -> Option<u8> {
        self.0.iter().position(|&b| b).map(|i| i as u8)
    }

    /// Largest byte in the class, if any.
    pub(crate) fn max_byte(&self) -> Option<u8> {
        self.0.iter().rposition(|&b| b).map(|i| i as u8)
    }
}

/// `class[b]` — test whether a byte matches this class.
impl Index<u8> for ByteClass {
    type Output = bool;

    #[inline]
    fn index(&self, byte: u8) -> &bool {
        &self.0[byte as usize]
    }
}

/// Index into the byte-class lookup tables ([`Program::classes`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ClassIdx(u32);

impl ClassIdx {
    #[inline]
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// `classes[class_idx]` — typed access to byte-class lookup tables.
impl Index<ClassIdx> for [ByteClass] {
    type Output = ByteClass;

    #[inline]
    fn index(&self, idx: ClassIdx) -> &ByteClass {
        &self[idx.idx()]
    }
}

impl Index<ClassIdx> for Vec<ByteClass> {
    type Output = ByteClass;

    #[inline]
    fn index(&self, idx: ClassIdx) -> &ByteClass {
        &self.as_slice()[idx]
    }
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// A single program instruction.
///
/// Epsilon instructions (`Split`, `Save`, `Look`, `Nop`) are followed
/// during closure computation; byte-consuming instructions (`Byte`,
/// `Class`) are stepped over one haystack byte at a time.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Inst {
    /// Match a literal byte, then follow `goto`.
    Byte { byte: u8, goto: InstPtr },
    /// Match any byte in the class (lookup table), then follow `goto`.
    Class { class: ClassIdx, goto: InstPtr },
    /// Epsilon fork: follow `goto1` first (higher priority), then `goto2`.
    Split { goto1: InstPtr, goto2: InstPtr },
    /// Record the current haystack position in capture slot `slot`, then
    /// follow `goto`. Slot `2k` is the start of group `k`, `2k+1` its end.
    Save { slot: u32, goto: InstPtr },
    /// Empty-width assertion; follow `goto` only where it holds.
    Look { look: Look, goto: InstPtr },
    /// Unconditional epsilon transition.
    Nop { goto: InstPtr },
    /// Never matches.
    Fail,
    /// Accepting state.
    Match,
}

// ---------------------------------------------------------------------------
// Compiled program
// ---------------------------------------------------------------------------

/// A compiled automaton ready for searching.
#[derive(Debug)]
pub(crate) struct Program {
    pub(crate) insts: Vec<Inst>,
    pub(crate) start: InstPtr,
    /// Byte-class lookup tables referenced by [`Inst::Class`].
    pub(crate) classes: Vec<ByteClass>,
    /// Number of capture slots (two per group, group 0 included).
    pub(crate) nslots: usize,
    /// Every match must begin at the start of the text (`\A` prefix).
    pub(crate) anchor_start: bool,
    /// Every match must end at the end of the text (`\z` suffix).
    pub(crate) anchor_end: bool,
    /// Memory left for the lazy DFA's state cache after the instruction
    /// list itself is accounted against the compile budget.
    pub(crate) dfa_budget: usize,
    /// Lazily grown DFA state cache, shared across searches.
    pub(crate) dfa: Mutex<DfaCache>,
}

impl Program {
    /// Number of instructions.
    pub(crate) fn size(&self) -> usize {
        self.insts.len()
    }

    /// Total memory footprint (in bytes) of the compiled program,
    /// including both inline and heap-allocated data.
    pub(crate) fn memory_size(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        let insts_alloc = self.insts.len() * std::mem::size_of::<Inst>();
        let classes_alloc = self.classes.len() * std::mem::size_of::<ByteClass>();
        inline + insts_alloc + classes_alloc
    }

    /// Collect the epsilon closure of `seeds`, following every assertion
    /// unconditionally. Returns the byte-consuming instructions reached
    /// and whether a `Match` instruction is in the closure.
    ///
    /// Only used by [`possible_match_range`](Self::possible_match_range),
    /// where merging assertion contexts widens the interval and therefore
    /// stays conservative.
    fn closure_any(&self, seeds: &[InstPtr]) -> (Vec<InstPtr>, bool) {
        let mut seen = vec![false; self.insts.len()];
        let mut stack: Vec<InstPtr> = seeds.to_vec();
        let mut consuming = Vec::new();
        let mut has_match = false;
        while let Some(ip) = stack.pop() {
            if std::mem::replace(&mut seen[ip.idx()], true) {
                continue;
            }
            match self.insts[ip] {
                Inst::Byte { .. } | Inst::Class { .. } => consuming.push(ip),
                Inst::Split { goto1, goto2 } => {
                    stack.push(goto2);
                    stack.push(goto1);
                }
                Inst::Save { goto, .. } | Inst::Look { goto, .. } | Inst::Nop { goto } => {
                    stack.push(goto)
                }
                Inst::Fail => {}
                Inst::Match => has_match = true,
            }
        }
        (consuming, has_match)
    }

    /// Greedy walk along smallest (`smallest == true`) or largest byte
    /// transitions. Returns the bytes walked and whether the walk reached
    /// a definite end of all matches (rather than being truncated at
    /// `maxlen` or at a dead end).
    fn extremal_walk(&self, maxlen: usize, smallest: bool) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        let (mut consuming, mut has_match) = self.closure_any(&[self.start]);
        loop {
            if smallest && has_match {
                return (out, true);
            }
            let next_byte = consuming
                .iter()
                .filter_map(|&ip| match self.insts[ip] {
                    Inst::Byte { byte, .. } => Some(byte),
                    Inst::Class { class, .. } => {
                        if smallest {
                            self.classes[class].min_byte()
                        } else {
                            self.classes[class].max_byte()
                        }
                    }
                    _ => None,
                })
                .reduce(|a, b| if smallest { a.min(b) } else { a.max(b) });
            let b = match next_byte {
                Some(b) => b,
                // No byte transition left: complete iff we sit on a match.
                None => return (out, has_match),
            };
            if out.len() == maxlen {
                return (out, false);
            }
            out.push(b);
            let seeds: Vec<InstPtr> = consuming
                .iter()
                .filter_map(|&ip| match self.insts[ip] {
                    Inst::Byte { byte, goto } if byte == b => Some(goto),
                    Inst::Class { class, goto } if self.classes[class][b] => Some(goto),
                    _ => None,
                })
                .collect();
            let (c, m) = self.closure_any(&seeds);
            consuming = c;
            has_match = m;
        }
    }

    /// Compute a byte-string interval containing every string this
    /// program can match, each bound at most `maxlen` bytes. `None` when
    /// nothing useful is known.
    pub(crate) fn possible_match_range(&self, maxlen: usize) -> Option<(Vec<u8>, Vec<u8>)> {
        if maxlen == 0 {
            return None;
        }
        let (min, _) = self.extremal_walk(maxlen, true);
        let (max, complete) = self.extremal_walk(maxlen, false);
        let max = if complete { max } else { prefix_successor(&max)? };
        Some((min, max))
    }
}

/// Smallest byte string strictly greater than every string starting with
/// `prefix`: drop trailing `0xff` bytes, then increment the last byte.
/// `None` when no finite successor exists.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xff {
            out.pop();
        } else {
            *out.last_mut().unwrap() += 1;
            return Some(out);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// HIR analysis: anchors, capture count, required prefix
// ---------------------------------------------------------------------------

/// Does every match of `hir` start at the beginning of the text?
pub(crate) fn is_anchor_start(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Look(Look::Start) => true,
        HirKind::Concat(subs) => subs.first().is_some_and(is_anchor_start),
        HirKind::Alternation(subs) => !subs.is_empty() && subs.iter().all(is_anchor_start),
        HirKind::Capture(cap) => is_anchor_start(&cap.sub),
        HirKind::Repetition(rep) => rep.min >= 1 && is_anchor_start(&rep.sub),
        _ => false,
    }
}

/// Does every match of `hir` end at the end of the text?
pub(crate) fn is_anchor_end(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Look(Look::End) => true,
        HirKind::Concat(subs) => subs.last().is_some_and(is_anchor_end),
        HirKind::Alternation(subs) => !subs.is_empty() && subs.iter().all(is_anchor_end),
        HirKind::Capture(cap) => is_anchor_end(&cap.sub),
        HirKind::Repetition(rep) => rep.min >= 1 && is_anchor_end(&rep.sub),
        _ => false,
    }
}

/// Number of explicit capture groups (highest group index).
pub(crate) fn count_captures(hir: &Hir) -> usize {
    fn walk(hir: &Hir, max: &mut usize) {
        match hir.kind() {
            HirKind::Capture(cap) => {
                *max = (*max).max(cap.index as usize);
                walk(&cap.sub, max);
            }
            HirKind::Concat(subs) | HirKind::Alternation(subs) => {
                for sub in subs {
                    walk(sub, max);
                }
            }
            HirKind::Repetition(rep) => walk(&rep.sub, max),
            _ => {}
        }
    }
    let mut max = 0;
    walk(hir, &mut max);
    max
}

/// Collect named capture groups in group-index order.
pub(crate) fn named_captures(hir: &Hir) -> indexmap::IndexMap<String, usize> {
    fn walk(hir: &Hir, out: &mut Vec<(usize, String)>) {
        match hir.kind() {
            HirKind::Capture(cap) => {
                if let Some(name) = &cap.name {
                    out.push((cap.index as usize, name.to_string()));
                }
                walk(&cap.sub, out);
            }
            HirKind::Concat(subs) | HirKind::Alternation(subs) => {
                for sub in subs {
                    walk(sub, out);
                }
            }
            HirKind::Repetition(rep) => walk(&rep.sub, out),
            _ => {}
        }
    }
    let mut pairs = Vec::new();
    walk(hir, &mut pairs);
    pairs.sort_by_key(|(idx, _)| *idx);
    pairs.into_iter().map(|(idx, name)| (name, idx)).collect()
}

/// If the class is exactly an ASCII upper/lower pair of the same letter,
/// return the lowercase byte. This is the shape case folding gives to a
/// folded ASCII letter.
fn fold_pair(class: &hir::Class) -> Option<u8> {
    let (a, b) = match class {
        hir::Class::Unicode(cu) => {
            let ranges = cu.ranges();
            if ranges.len() != 2 || ranges.iter().any(|r| r.start() != r.end()) {
                return None;
            }
            (
                u32::from(ranges[0].start()).try_into().ok()?,
                u32::from(ranges[1].start()).try_into().ok()?,
            )
        }
        hir::Class::Bytes(cb) => {
            let ranges = cb.ranges();
            if ranges.len() != 2 || ranges.iter().any(|r| r.start() != r.end()) {
                return None;
            }
            (ranges[0].start(), ranges[1].start())
        }
    };
    let (upper, lower): (u8, u8) = (a.min(b), a.max(b));
    if upper.is_ascii_uppercase() && lower == upper.to_ascii_lowercase() {
        Some(lower)
    } else {
        None
    }
}

/// Factor a required literal prefix out of an anchored pattern.
///
/// Matches the shape `\A` followed by a run of literals (case-exact) or
/// folded ASCII letter pairs (case-insensitive). Returns the prefix
/// bytes (lowercase when folded), the fold flag, and the remaining
/// suffix HIR with both the anchor and the prefix stripped.
pub(crate) fn required_prefix(hir: &Hir) -> Option<(Vec<u8>, bool, Hir)> {
    let subs = match hir.kind() {
        HirKind::Concat(subs) => subs,
        _ => return None,
    };
    if !matches!(subs.first().map(Hir::kind), Some(HirKind::Look(Look::Start))) {
        return None;
    }
    let mut prefix = Vec::new();
    let mut foldcase: Option<bool> = None;
    let mut i = 1;
    while i < subs.len() {
        match subs[i].kind() {
            HirKind::Literal(lit) if foldcase != Some(true) => {
                foldcase = Some(false);
                prefix.extend_from_slice(&lit.0);
            }
            HirKind::Class(class) if foldcase != Some(false) => match fold_pair(class) {
                Some(b) => {
                    foldcase = Some(true);
                    prefix.push(b);
                }
                None => break,
            },
            _ => break,
        }
        i += 1;
    }
    if prefix.is_empty() {
        return None;
    }
    let suffix = Hir::concat(subs[i..].to_vec());
    Some((prefix, foldcase == Some(true), suffix))
}

// ---------------------------------------------------------------------------
// HIR transforms: reversal, newline stripping
// ---------------------------------------------------------------------------

/// Structurally reverse a pattern so that running it left-to-right over
/// reversed input is equivalent to running the original right-to-left.
/// Assertions are kept as-is; the engines evaluate them against absolute
/// text positions, which makes them direction-independent.
pub(crate) fn reverse_hir(hir: &Hir) -> Hir {
    match hir.kind() {
        HirKind::Empty => Hir::empty(),
        HirKind::Literal(lit) => {
            let mut bytes = lit.0.to_vec();
            bytes.reverse();
            Hir::literal(bytes)
        }
        HirKind::Class(class) => Hir::class(class.clone()),
        HirKind::Look(look) => Hir::look(*look),
        HirKind::Repetition(rep) => Hir::repetition(hir::Repetition {
            min: rep.min,
            max: rep.max,
            greedy: rep.greedy,
            sub: Box::new(reverse_hir(&rep.sub)),
        }),
        HirKind::Capture(cap) => Hir::capture(hir::Capture {
            index: cap.index,
            name: cap.name.clone(),
            sub: Box::new(reverse_hir(&cap.sub)),
        }),
        HirKind::Concat(subs) => Hir::concat(subs.iter().rev().map(reverse_hir).collect()),
        HirKind::Alternation(subs) => Hir::alternation(subs.iter().map(reverse_hir).collect()),
    }
}

/// Remove `\n` from every literal and class: a literal containing `\n`
/// can never match, a class loses the newline byte/codepoint.
pub(crate) fn strip_newlines(hir: &Hir) -> Hir {
    match hir.kind() {
        HirKind::Empty => Hir::empty(),
        HirKind::Literal(lit) => {
            if lit.0.contains(&b'\n') {
                Hir::fail()
            } else {
                Hir::literal(lit.0.clone())
            }
        }
        HirKind::Class(hir::Class::Unicode(cu)) => {
            let mut filtered = cu.clone();
            let mut nl = hir::ClassUnicode::new([hir::ClassUnicodeRange::new('\n', '\n')]);
            nl.negate();
            filtered.intersect(&nl);
            Hir::class(hir::Class::Unicode(filtered))
        }
        HirKind::Class(hir::Class::Bytes(cb)) => {
            let mut filtered = cb.clone();
            let mut nl = hir::ClassBytes::new([hir::ClassBytesRange::new(b'\n', b'\n')]);
            nl.negate();
            filtered.intersect(&nl);
            Hir::class(hir::Class::Bytes(filtered))
        }
        HirKind::Look(look) => Hir::look(*look),
        HirKind::Repetition(rep) => Hir::repetition(hir::Repetition {
            min: rep.min,
            max: rep.max,
            greedy: rep.greedy,
            sub: Box::new(strip_newlines(&rep.sub)),
        }),
        HirKind::Capture(cap) => Hir::capture(hir::Capture {
            index: cap.index,
            name: cap.name.clone(),
            sub: Box::new(strip_newlines(&cap.sub)),
        }),
        HirKind::Concat(subs) => Hir::concat(subs.iter().map(strip_newlines).collect()),
        HirKind::Alternation(subs) => Hir::alternation(subs.iter().map(strip_newlines).collect()),
    }
}

// ---------------------------------------------------------------------------
// Compiler (HIR -> program)
// ---------------------------------------------------------------------------

/// Compilation ran past the memory budget.
pub(crate) struct TooLarge;

/// A dangling `goto` hole: instruction `ip`, and whether it is the
/// second target of a [`Inst::Split`].
#[derive(Clone, Copy, Debug)]
struct Hole {
    ip: InstPtr,
    second: bool,
}

/// A partially-built program fragment with a `start` instruction and the
/// holes that will be patched to the next fragment's start.
#[derive(Debug)]
struct Frag {
    start: InstPtr,
    holes: Vec<Hole>,
}

/// Compiles a [`Hir`] into a [`Program`], enforcing the memory budget as
/// instructions are emitted.
struct Compiler {
    insts: Vec<Inst>,
    classes: IndexSet<ByteClass>,
    budget: usize,
}

impl Compiler {
    fn new(budget: usize) -> Self {
        Self {
            insts: Vec::new(),
            classes: IndexSet::new(),
            budget,
        }
    }

    fn emit(&mut self, inst: Inst) -> Result<InstPtr, TooLarge> {
        let mem = (self.insts.len() + 1) * std::mem::size_of::<Inst>()
            + self.classes.len() * std::mem::size_of::<ByteClass>();
        if mem > self.budget || self.insts.len() >= u32::MAX as usize - 1 {
            return Err(TooLarge);
        }
        let ip = InstPtr(self.insts.len() as u32);
        self.insts.push(inst);
        Ok(ip)
    }

    /// Return the index of `table` in the side table, inserting it if not
    /// already present. Identical tables are deduplicated so repeated
    /// classes share a single 256-entry lookup.
    fn intern_class(&mut self, table: ByteClass) -> ClassIdx {
        let (idx, _) = self.classes.insert_full(table);
        ClassIdx(idx as u32)
    }

    fn patch(&mut self, holes: &[Hole], target: InstPtr) {
        for hole in holes {
            match &mut self.insts[hole.ip] {
                Inst::Byte { goto, .. }
                | Inst::Class { goto, .. }
                | Inst::Save { goto, .. }
                | Inst::Look { goto, .. }
                | Inst::Nop { goto } => *goto = target,
                Inst::Split { goto1, goto2 } => {
                    if hole.second {
                        *goto2 = target
                    } else {
                        *goto1 = target
                    }
                }
                Inst::Fail | Inst::Match => unreachable!("hole in terminal instruction"),
            }
        }
    }

    fn c(&mut self, hir: &Hir) -> Result<Frag, TooLarge> {
        match hir.kind() {
            HirKind::Empty => self.c_empty(),
            HirKind::Literal(lit) => self.c_literal(&lit.0),
            HirKind::Class(class) => self.c_class(class),
            HirKind::Look(look) => {
                let ip = self.emit(Inst::Look {
                    look: *look,
                    goto: InstPtr::NONE,
                })?;
                Ok(Frag {
                    start: ip,
                    holes: vec![Hole { ip, second: false }],
                })
            }
            HirKind::Repetition(rep) => self.c_repetition(rep),
            HirKind::Capture(cap) => self.c_capture(cap),
            HirKind::Concat(subs) => self.c_concat(subs),
            HirKind::Alternation(subs) => self.c_alternation(subs),
        }
    }

    fn c_empty(&mut self) -> Result<Frag, TooLarge> {
        let ip = self.emit(Inst::Nop { goto: InstPtr::NONE })?;
        Ok(Frag {
            start: ip,
            holes: vec![Hole { ip, second: false }],
        })
    }

    fn c_literal(&mut self, bytes: &[u8]) -> Result<Frag, TooLarge> {
        if bytes.is_empty() {
            return self.c_empty();
        }
        let mut start = InstPtr::NONE;
        let mut prev: Option<InstPtr> = None;
        for &byte in bytes {
            let ip = self.emit(Inst::Byte {
                byte,
                goto: InstPtr::NONE,
            })?;
            match prev {
                Some(p) => self.patch(&[Hole { ip: p, second: false }], ip),
                None => start = ip,
            }
            prev = Some(ip);
        }
        Ok(Frag {
            start,
            holes: vec![Hole {
                ip: prev.unwrap(),
                second: false,
            }],
        })
    }

    /// One byte-range step: a plain byte when the range is a singleton,
    /// a lookup table otherwise.
    fn c_byte_range(&mut self, lo: u8, hi: u8) -> Result<Frag, TooLarge> {
        let inst = if lo == hi {
            Inst::Byte {
                byte: lo,
                goto: InstPtr::NONE,
            }
        } else {
            let mut table = ByteClass::NONE;
            table.mark_range(lo, hi);
            let class = self.intern_class(table);
            Inst::Class {
                class,
                goto: InstPtr::NONE,
            }
        };
        let ip = self.emit(inst)?;
        Ok(Frag {
            start: ip,
            holes: vec![Hole { ip, second: false }],
        })
    }

    fn c_class(&mut self, class: &hir::Class) -> Result<Frag, TooLarge> {
        match class {
            hir::Class::Bytes(cb) => {
                let mut table = ByteClass::NONE;
                for r in cb.ranges() {
                    table.mark_range(r.start(), r.end());
                }
                self.c_table(table)
            }
            hir::Class::Unicode(cu) => {
                // Single-byte sequences collapse into one lookup table;
                // multi-byte UTF-8 sequences become byte-range chains.
                let mut ascii = ByteClass::NONE;
                let mut seqs: Vec<Vec<(u8, u8)>> = Vec::new();
                for r in cu.ranges() {
                    for seq in Utf8Sequences::new(r.start(), r.end()) {
                        let ranges = seq.as_slice();
                        if ranges.len() == 1 {
                            ascii.mark_range(ranges[0].start, ranges[0].end);
                        } else {
                            seqs.push(ranges.iter().map(|ur| (ur.start, ur.end)).collect());
                        }
                    }
                }
                let mut branches = Vec::new();
                if !ascii.is_empty() {
                    branches.push(self.c_table(ascii)?);
                }
                for seq in seqs {
                    let mut frag: Option<Frag> = None;
                    for (lo, hi) in seq {
                        let step = self.c_byte_range(lo, hi)?;
                        frag = Some(match frag {
                            None => step,
                            Some(f) => {
                                self.patch(&f.holes, step.start);
                                Frag {
                                    start: f.start,
                                    holes: step.holes,
                                }
                            }
                        });
                    }
                    branches.push(frag.expect("UTF-8 sequence is never empty"));
                }
                self.alternate(branches)
            }
        }
    }

    fn c_table(&mut self, table: ByteClass) -> Result<Frag, TooLarge> {
        if table.is_empty() {
            let ip = self.emit(Inst::Fail)?;
            return Ok(Frag {
                start: ip,
                holes: vec![],
            });
        }
        let class = self.intern_class(table);
        let ip = self.emit(Inst::Class {
            class,
            goto: InstPtr::NONE,
        })?;
        Ok(Frag {
            start: ip,
            holes: vec![Hole { ip, second: false }],
        })
    }

    fn c_capture(&mut self, cap: &hir::Capture) -> Result<Frag, TooLarge> {
        let open = self.emit(Inst::Save {
            slot: cap.index * 2,
            goto: InstPtr::NONE,
        })?;
        let body = self.c(&cap.sub)?;
        self.patch(&[Hole { ip: open, second: false }], body.start);
        let close = self.emit(Inst::Save {
            slot: cap.index * 2 + 1,
            goto: InstPtr::NONE,
        })?;
        self.patch(&body.holes, close);
        Ok(Frag {
            start: open,
            holes: vec![Hole {
                ip: close,
                second: false,
            }],
        })
    }

    fn c_concat(&mut self, subs: &[Hir]) -> Result<Frag, TooLarge> {
        let mut acc: Option<Frag> = None;
        for sub in subs {
            let frag = self.c(sub)?;
            acc = Some(match acc {
                None => frag,
                Some(prev) => {
                    self.patch(&prev.holes, frag.start);
                    Frag {
                        start: prev.start,
                        holes: frag.holes,
                    }
                }
            });
        }
        match acc {
            Some(frag) => Ok(frag),
            None => self.c_empty(),
        }
    }

    fn c_alternation(&mut self, subs: &[Hir]) -> Result<Frag, TooLarge> {
        let mut branches = Vec::with_capacity(subs.len());
        for sub in subs {
            branches.push(self.c(sub)?);
        }
        self.alternate(branches)
    }

    /// Fold fragments into a priority-ordered alternation: earlier
    /// branches win under leftmost-first semantics.
    fn alternate(&mut self, mut branches: Vec<Frag>) -> Result<Frag, TooLarge> {
        let Some(mut acc) = branches.pop() else {
            let ip = self.emit(Inst::Fail)?;
            return Ok(Frag {
                start: ip,
                holes: vec![],
            });
        };
        while let Some(frag) = branches.pop() {
            let split = self.emit(Inst::Split {
                goto1: frag.start,
                goto2: acc.start,
            })?;
            let mut holes = frag.holes;
            holes.extend(acc.holes);
            acc = Frag {
                start: split,
                holes,
            };
        }
        Ok(acc)
    }

    /// Zero-or-one wrapper around a compiled fragment.
    fn quest(&mut self, frag: Frag, greedy: bool) -> Result<Frag, TooLarge> {
        let split = if greedy {
            self.emit(Inst::Split {
                goto1: frag.start,
                goto2: InstPtr::NONE,
            })?
        } else {
            self.emit(Inst::Split {
                goto1: InstPtr::NONE,
                goto2: frag.start,
            })?
        };
        let mut holes = frag.holes;
        holes.push(Hole {
            ip: split,
            second: greedy,
        });
        Ok(Frag {
            start: split,
            holes,
        })
    }

    fn c_repetition(&mut self, rep: &hir::Repetition) -> Result<Frag, TooLarge> {
        let greedy = rep.greedy;
        match (rep.min, rep.max) {
            (0, Some(0)) => self.c_empty(),
            (0, Some(1)) => {
                let body = self.c(&rep.sub)?;
                self.quest(body, greedy)
            }
            (0, None) => {
                // Star: split over (body -> back to split) or out.
                let split = self.emit(Inst::Split {
                    goto1: InstPtr::NONE,
                    goto2: InstPtr::NONE,
                })?;
                let body = self.c(&rep.sub)?;
                self.patch(&body.holes, split);
                self.patch(
                    &[Hole {
                        ip: split,
                        second: !greedy,
                    }],
                    body.start,
                );
                Ok(Frag {
                    start: split,
                    holes: vec![Hole {
                        ip: split,
                        second: greedy,
                    }],
                })
            }
            (min, None) => {
                // min copies, the last one looping back (x{2,} == xx+).
                let mut acc: Option<Frag> = None;
                for _ in 0..min - 1 {
                    let body = self.c(&rep.sub)?;
                    acc = Some(match acc {
                        None => body,
                        Some(prev) => {
                            self.patch(&prev.holes, body.start);
                            Frag {
                                start: prev.start,
                                holes: body.holes,
                            }
                        }
                    });
                }
                let last = self.c(&rep.sub)?;
                let split = self.emit(Inst::Split {
                    goto1: InstPtr::NONE,
                    goto2: InstPtr::NONE,
                })?;
                self.patch(&last.holes, split);
                self.patch(
                    &[Hole {
                        ip: split,
                        second: !greedy,
                    }],
                    last.start,
                );
                let plus = Frag {
                    start: last.start,
                    holes: vec![Hole {
                        ip: split,
                        second: greedy,
                    }],
                };
                Ok(match acc {
                    None => plus,
                    Some(prev) => {
                        self.patch(&prev.holes, plus.start);
                        Frag {
                            start: prev.start,
                            holes: plus.holes,
                        }
                    }
                })
            }
            (min, Some(max)) => {
                // Unroll: min mandatory copies, then a nested optional
                // tail (x(x(x)?)?)? that cannot loop on empty matches.
                debug_assert!(min <= max);
                let mut tail: Option<Frag> = None;
                for _ in 0..max - min {
                    let body = self.c(&rep.sub)?;
                    let chained = match tail {
                        None => body,
                        Some(t) => {
                            self.patch(&body.holes, t.start);
                            Frag {
                                start: body.start,
                                holes: t.holes,
                            }
                        }
                    };
                    tail = Some(self.quest(chained, greedy)?);
                }
                let mut acc: Option<Frag> = None;
                for _ in 0..min {
                    let body = self.c(&rep.sub)?;
                    acc = Some(match acc {
                        None => body,
                        Some(prev) => {
                            self.patch(&prev.holes, body.start);
                            Frag {
                                start: prev.start,
                                holes: body.holes,
                            }
                        }
                    });
                }
                match (acc, tail) {
                    (None, None) => self.c_empty(),
                    (None, Some(t)) => Ok(t),
                    (Some(a), None) => Ok(a),
                    (Some(a), Some(t)) => {
                        self.patch(&a.holes, t.start);
                        Ok(Frag {
                            start: a.start,
                            holes: t.holes,
                        })
                    }
                }
            }
        }
    }
}

/// Compile `hir` into a program, or `None` when the instruction list
/// exceeds `budget` bytes. The whole pattern is wrapped in capture slots
/// 0/1 so group 0 always reports the overall match span.
pub(crate) fn compile(hir: &Hir, budget: usize) -> Option<Program> {
    let ngroups = count_captures(hir);
    let mut c = Compiler::new(budget);
    let result: Result<(InstPtr, Vec<Inst>, Vec<ByteClass>), TooLarge> = (|| {
        let open = c.emit(Inst::Save {
            slot: 0,
            goto: InstPtr::NONE,
        })?;
        let body = c.c(hir)?;
        c.patch(&[Hole { ip: open, second: false }], body.start);
        let close = c.emit(Inst::Save {
            slot: 1,
            goto: InstPtr::NONE,
        })?;
        c.patch(&body.holes, close);
        let done = c.emit(Inst::Match)?;
        c.patch(&[Hole { ip: close, second: false }], done);
        Ok((open, std::mem::take(&mut c.insts), c.classes.iter().copied().collect()))
    })();
    let (start, insts, classes) = result.ok()?;
    let mem = insts.len() * std::mem::size_of::<Inst>() + classes.len() * std::mem::size_of::<ByteClass>();
    Some(Program {
        insts,
        start,
        classes,
        nslots: 2 * (ngroups + 1),
        anchor_start: is_anchor_start(hir),
        anchor_end: is_anchor_end(hir),
        dfa_budget: budget.saturating_sub(mem),
        dfa: Mutex::new(DfaCache::default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pattern: &str) -> Hir {
        regex_syntax::ParserBuilder::new()
            .utf8(false)
            .build()
            .parse(pattern)
            .expect("pattern should parse")
    }

    fn must_compile(pattern: &str) -> Program {
        compile(&parse(pattern), 1 << 20).expect("program should fit the budget")
    }

    #[test]
    fn test_compile_literal_shape() {
        let prog = must_compile("abc");
        // Save0, three bytes, Save1, Match.
        assert_eq!(prog.size(), 6);
        assert_eq!(prog.nslots, 2);
        assert!(!prog.anchor_start);
        assert!(!prog.anchor_end);
    }

    #[test]
    fn test_compile_counts_groups() {
        let prog = must_compile("(a)(b(c))");
        assert_eq!(prog.nslots, 8);
    }

    #[test]
    fn test_compile_budget_exhaustion() {
        // The unrolled repetition cannot fit in a 256-byte budget.
        assert!(compile(&parse("a{100}"), 256).is_none());
        assert!(compile(&parse("a{100}"), 1 << 20).is_some());
    }

    #[test]
    fn test_anchor_detection() {
        assert!(must_compile("^abc").anchor_start);
        assert!(must_compile("^abc$").anchor_end);
        assert!(must_compile("^a|^b").anchor_start);
        assert!(!must_compile("^a|b").anchor_start);
        assert!(!must_compile("a$|b").anchor_end);
    }

    #[test]
    fn test_class_tables_are_interned() {
        let prog = must_compile("[a-c][a-c][a-c]");
        assert_eq!(prog.classes.len(), 1);
    }

    #[test]
    fn test_required_prefix_literal() {
        let (prefix, fold, _) = required_prefix(&parse("^foo(bar)*")).expect("prefix expected");
        assert_eq!(prefix, b"foo");
        assert!(!fold);
    }

    #[test]
    fn test_required_prefix_needs_anchor() {
        assert!(required_prefix(&parse("foo")).is_none());
        assert!(required_prefix(&parse("^(foo)")).is_none());
    }

    #[test]
    fn test_required_prefix_foldcase() {
        let (prefix, fold, _) = required_prefix(&parse("^(?i)hello")).expect("prefix expected");
        assert_eq!(prefix, b"hello");
        assert!(fold);
    }

    #[test]
    fn test_required_prefix_whole_pattern() {
        let (prefix, _, suffix) = required_prefix(&parse("^abc")).expect("prefix expected");
        assert_eq!(prefix, b"abc");
        // The suffix matches only the empty string.
        let prog = compile(&suffix, 1 << 20).unwrap();
        assert!(matches!(
            prog.insts[prog.start],
            Inst::Save { slot: 0, .. }
        ));
    }

    #[test]
    fn test_reverse_hir_literal() {
        let rev = reverse_hir(&parse("abc"));
        match rev.kind() {
            HirKind::Literal(lit) => assert_eq!(&*lit.0, b"cba"),
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_reverse_hir_concat_order() {
        let rev = reverse_hir(&parse("ab(c|d)"));
        // Reversed: (c|d) then "ba".
        match rev.kind() {
            HirKind::Concat(subs) => {
                assert!(matches!(subs[0].kind(), HirKind::Capture(_)));
            }
            other => panic!("expected concat, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_newlines() {
        let stripped = strip_newlines(&parse("a[\nx]b"));
        let prog = compile(&stripped, 1 << 20).unwrap();
        // The class lost its newline: only `x` remains.
        let has_nl = prog
            .classes
            .iter()
            .any(|table| table[b'\n']);
        assert!(!has_nl);
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(prefix_successor(b"a\xff\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(b"\xff\xff"), None);
        assert_eq!(prefix_successor(b""), None);
    }

    #[test]
    fn test_possible_match_range_exact() {
        let prog = must_compile("foo");
        let (min, max) = prog.possible_match_range(10).expect("range expected");
        assert_eq!(min, b"foo");
        assert_eq!(max, b"foo");
    }

    #[test]
    fn test_possible_match_range_alternation() {
        let prog = must_compile("abc|abd");
        let (min, max) = prog.possible_match_range(10).expect("range expected");
        assert_eq!(min, b"abc");
        assert_eq!(max, b"abd");
    }

    #[test]
    fn test_possible_match_range_unbounded() {
        let prog = must_compile("a+");
        let (min, max) = prog.possible_match_range(4).expect("range expected");
        assert_eq!(min, b"a");
        // Truncated at 4 bytes and rounded up.
        assert_eq!(max, b"aaab");
    }

    #[test]
    fn test_possible_match_range_empty_match() {
        let prog = must_compile("a*");
        let (min, _) = prog.possible_match_range(4).expect("range expected");
        assert_eq!(min, b"");
    }

    #[test]
    fn test_memory_size_grows_with_classes() {
        let small = must_compile("abc");
        let with_class = must_compile("[a-z]bc");
        assert!(with_class.memory_size() > small.memory_size());
    }
}
