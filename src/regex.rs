//! The matching facade.
//!
//! [`Regex`] owns a parsed pattern, its compiled forward program, and the
//! lazily built reverse program, and orchestrates the search engines per
//! call. The orchestration policy lives in [`Regex::match_at`]:
//!
//! 1. Promote the requested anchor using the program's own anchors.
//! 2. Apply the required-prefix filter (byte compare, optionally ASCII
//!    case-folded), narrowing the search and raising the anchor.
//! 3. Pick engines: the DFA filters and locates match bounds (forward
//!    scan for the end, reverse scan for the start); OnePass or BitState
//!    shortcut the DFA entirely on small anchored inputs; whichever
//!    capture-capable engine's predicate holds extracts submatches over
//!    the located range; the Pike VM is the unconditional fallback.
//! 4. A DFA cache exhaustion is a *failure*, not a miss: the search
//!    falls through to the capture engines over the full subtext.

use std::ops::Range;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex_syntax::hir::Hir;

use crate::args::{Arg, MAX_ARGS};
use crate::engines::bitstate::{self, MAX_BIT_STATE_PROG, MAX_BIT_STATE_VECTOR};
use crate::engines::dfa::{self, DfaResult};
use crate::engines::nfa;
use crate::engines::onepass::{self, MAX_ONE_PASS_CAPTURE};
use crate::engines::Kind;
use crate::error::{Error, ErrorKind};
use crate::options::{Encoding, Options};
use crate::program::{self, Program};
use crate::rewrite;

/// Where a match is allowed to start and end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// The match may appear anywhere in the text.
    Unanchored,
    /// The match must begin at the start position.
    AnchorStart,
    /// The match must span the entire text.
    AnchorBoth,
}

/// OnePass and BitState beat the DFA on texts up to this size when
/// submatches are wanted anyway.
const SMALL_TEXT: usize = 4096;

/// On texts this small, OnePass outruns the DFA even for a plain
/// boolean answer.
const TINY_TEXT: usize = 8;

/// A compiled regular expression.
///
/// Construction never panics and never refuses to hand back a value:
/// [`Regex::compile`] on a malformed pattern yields a `Regex` in an
/// error state whose every operation reports "no match" (check
/// [`ok`](Regex::ok)). [`Regex::new`] is the `Result` flavor.
///
/// A `Regex` is immutable after construction except for three lazily
/// published fields (the reverse program, the named-group map, and a
/// late pattern-too-large error from reverse compilation), so sharing
/// one across threads for concurrent matching is safe.
#[derive(Debug)]
pub struct Regex {
    pattern: String,
    options: Options,
    error: Option<Error>,
    /// The pattern minus any factored literal prefix. Lives as long as
    /// the `Regex`; the reverse program compiles from it on demand.
    suffix_hir: Option<Hir>,
    /// Required literal prefix of every match, possibly empty. Stored
    /// lowercase when `prefix_foldcase` is set.
    prefix: Vec<u8>,
    prefix_foldcase: bool,
    prog: Option<Program>,
    is_one_pass: bool,
    ngroups: usize,
    /// Reverse program, compiled on first submatch search; `None` inside
    /// means reverse compilation failed and `late_error` is set.
    rprog: OnceLock<Option<Program>>,
    late_error: OnceLock<Error>,
    named_groups: OnceLock<IndexMap<String, usize>>,
}

impl Regex {
    /// Compile with default options.
    pub fn new(pattern: &str) -> Result<Regex, Error> {
        Self::with_options(pattern, &Options::default())
    }

    /// Compile with the given options.
    pub fn with_options(pattern: &str, options: &Options) -> Result<Regex, Error> {
        let re = Self::compile(pattern, options);
        match &re.error {
            Some(err) => Err(err.clone()),
            None => Ok(re),
        }
    }

    /// Compile, always returning a value: on failure the result carries
    /// the error and behaves as "never matches".
    pub fn compile(pattern: &str, options: &Options) -> Regex {
        let mut re = Regex {
            pattern: pattern.to_owned(),
            options: options.clone(),
            error: None,
            suffix_hir: None,
            prefix: Vec::new(),
            prefix_foldcase: false,
            prog: None,
            is_one_pass: false,
            ngroups: 0,
            rprog: OnceLock::new(),
            late_error: OnceLock::new(),
            named_groups: OnceLock::new(),
        };

        if let Some(err) = posix_gate(pattern, options) {
            if options.log_errors {
                log::error!("Error parsing '{}': {}", pattern, err.message());
            }
            re.error = Some(err);
            return re;
        }

        let source = if options.literal {
            regex_syntax::escape(pattern)
        } else {
            pattern.to_owned()
        };
        let parsed = regex_syntax::ParserBuilder::new()
            .utf8(false)
            .unicode(options.encoding == Encoding::Utf8)
            .case_insensitive(!options.case_sensitive)
            .multi_line(options.posix_syntax && !options.one_line)
            .dot_matches_new_line(false)
            .build()
            .parse(&source);
        let hir = match parsed {
            Ok(hir) => hir,
            Err(err) => {
                let err = Error::from_syntax(&err, pattern);
                if options.log_errors {
                    log::error!("Error parsing '{}': {}", pattern, err.message());
                }
                re.error = Some(err);
                return re;
            }
        };
        let hir = if options.never_nl {
            program::strip_newlines(&hir)
        } else {
            hir
        };

        let suffix = match program::required_prefix(&hir) {
            Some((prefix, foldcase, suffix)) => {
                re.prefix = prefix;
                re.prefix_foldcase = foldcase;
                suffix
            }
            None => hir,
        };
        re.ngroups = program::count_captures(&suffix);

        // Two thirds of the memory budget goes to the forward program:
        // it runs two DFA scans (longest and first-match flavors) where
        // the reverse program runs one.
        match program::compile(&suffix, options.max_mem * 2 / 3) {
            Some(prog) => {
                re.is_one_pass = onepass::is_one_pass(&prog);
                re.prog = Some(prog);
                re.suffix_hir = Some(suffix);
            }
            None => {
                if options.log_errors {
                    log::error!("Error compiling '{}'", pattern);
                }
                re.error = Some(Error::new(
                    ErrorKind::PatternTooLarge,
                    "pattern too large - compile failed",
                    "",
                ));
            }
        }
        re
    }

    /// `true` when the pattern compiled and no late error latched.
    pub fn ok(&self) -> bool {
        self.error.is_none() && self.late_error.get().is_none()
    }

    /// The original pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Human-readable error message; empty when [`ok`](Regex::ok).
    pub fn error(&self) -> &str {
        self.current_error().map(Error::message).unwrap_or("")
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.current_error()
            .map(Error::kind)
            .unwrap_or(ErrorKind::NoError)
    }

    /// The pattern fragment the parser blamed; possibly empty.
    pub fn error_arg(&self) -> &str {
        self.current_error().map(Error::arg).unwrap_or("")
    }

    fn current_error(&self) -> Option<&Error> {
        self.error.as_ref().or_else(|| self.late_error.get())
    }

    /// Number of instructions in the forward program; `None` for an
    /// invalid pattern.
    pub fn program_size(&self) -> Option<usize> {
        self.prog.as_ref().map(Program::size)
    }

    /// Number of capturing groups; `None` for an invalid pattern.
    pub fn number_of_capturing_groups(&self) -> Option<usize> {
        self.suffix_hir.as_ref().map(|_| self.ngroups)
    }

    /// Map from capture name to 1-based group index, computed on first
    /// use. Empty for patterns without named groups or in error state.
    pub fn named_capturing_groups(&self) -> &IndexMap<String, usize> {
        static EMPTY: OnceLock<IndexMap<String, usize>> = OnceLock::new();
        match &self.suffix_hir {
            Some(hir) if self.ok() => self
                .named_groups
                .get_or_init(|| program::named_captures(hir)),
            _ => EMPTY.get_or_init(IndexMap::new),
        }
    }

    /// The reverse program, compiled on first use with one third of the
    /// memory budget. A compile failure latches [`ErrorKind::PatternTooLarge`]
    /// and every subsequent submatch search fails.
    fn reverse_prog(&self) -> Option<&Program> {
        self.rprog
            .get_or_init(|| {
                let suffix = self.suffix_hir.as_ref()?;
                match program::compile(&program::reverse_hir(suffix), self.options.max_mem / 3) {
                    Some(prog) => Some(prog),
                    None => {
                        if self.options.log_errors {
                            log::error!("Error reverse compiling '{}'", self.pattern);
                        }
                        let _ = self.late_error.set(Error::new(
                            ErrorKind::PatternTooLarge,
                            "pattern too large - reverse compile failed",
                            "",
                        ));
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Compare the required prefix at the front of the subtext.
    fn prefix_matches(&self, subtext: &[u8]) -> bool {
        if subtext.len() < self.prefix.len() {
            return false;
        }
        if self.prefix_foldcase {
            self.prefix
                .iter()
                .zip(subtext)
                .all(|(&p, &t)| p == t.to_ascii_lowercase())
        } else {
            subtext.starts_with(&self.prefix)
        }
    }

    /// The match orchestrator.
    ///
    /// Searches `text` from `startpos` under `anchor`. On success fills
    /// `submatch`: index 0 is the whole match, index `k` the `k`-th
    /// group (`None` when the group did not participate), and indexes
    /// past the pattern's group count are set to `None`. With an empty
    /// `submatch` the call only answers existence, which lets the
    /// engines skip position discovery.
    pub fn match_at(
        &self,
        text: &[u8],
        startpos: usize,
        anchor: Anchor,
        submatch: &mut [Option<Range<usize>>],
    ) -> bool {
        if !self.ok() {
            if self.options.log_errors {
                log::error!("Invalid regexp: {}", self.error());
            }
            return false;
        }
        let prog = self.prog.as_ref().expect("ok() implies a program");
        if startpos > text.len() {
            return false;
        }

        let nsubmatch = submatch.len();
        let ncap = (1 + self.ngroups).min(nsubmatch);

        // Promote the anchor using the program's own anchors so we can
        // fall into a faster case below.
        let mut re_anchor = anchor;
        if prog.anchor_start && prog.anchor_end {
            re_anchor = Anchor::AnchorBoth;
        } else if prog.anchor_start && re_anchor != Anchor::AnchorBoth {
            re_anchor = Anchor::AnchorStart;
        }

        // Required-prefix filter. The prefix is only ever factored from
        // a text-anchored pattern, so any nonzero start position is an
        // immediate miss; a hit pins the match start right after it.
        let mut start = startpos;
        let prefixlen = self.prefix.len();
        if prefixlen > 0 {
            if startpos != 0 || !self.prefix_matches(text) {
                return false;
            }
            start += prefixlen;
            if re_anchor != Anchor::AnchorBoth {
                re_anchor = Anchor::AnchorStart;
            }
        }

        let mut kind = if self.options.effective_longest() {
            Kind::Longest
        } else {
            Kind::First
        };

        let can_one_pass = self.is_one_pass && ncap <= MAX_ONE_PASS_CAPTURE;
        let can_bit_state = prog.size() <= MAX_BIT_STATE_PROG;
        let bit_state_text_max = MAX_BIT_STATE_VECTOR / prog.size();

        let mut skipped_test = false;
        let mut anchored = false;
        let mut located: Option<Range<usize>> = None;

        match re_anchor {
            Anchor::Unanchored => {
                match dfa::search_fwd(prog, text, start..text.len(), false, kind) {
                    DfaResult::Failed => {
                        log::trace!("match '{}': forward DFA failed, falling back", self.pattern);
                        skipped_test = true;
                    }
                    DfaResult::NoMatch => return false,
                    DfaResult::Match(end) => {
                        if nsubmatch == 0 {
                            // Matched, and the caller does not care where.
                            return true;
                        }
                        // The forward DFA knows where the match ends but
                        // not where it starts: run the reverse program
                        // backward from the end to find the start.
                        let Some(rprog) = self.reverse_prog() else {
                            return false;
                        };
                        match dfa::search_rev(rprog, text, start..end) {
                            DfaResult::Failed => {
                                log::trace!(
                                    "match '{}': reverse DFA failed, falling back",
                                    self.pattern
                                );
                                skipped_test = true;
                            }
                            DfaResult::NoMatch => {
                                log::error!("DFA inconsistency");
                                return false;
                            }
                            DfaResult::Match(s) => located = Some(s..end),
                        }
                    }
                }
            }
            Anchor::AnchorStart | Anchor::AnchorBoth => {
                if re_anchor == Anchor::AnchorBoth {
                    kind = Kind::Full;
                }
                anchored = true;
                // On small texts the capture engines filter and locate in
                // one pass, so the DFA would be pure overhead.
                if can_one_pass && text.len() <= SMALL_TEXT && (ncap > 1 || text.len() <= TINY_TEXT)
                {
                    log::trace!("match '{}': skipping DFA for OnePass", self.pattern);
                    skipped_test = true;
                } else if can_bit_state && text.len() <= bit_state_text_max && ncap > 1 {
                    log::trace!("match '{}': skipping DFA for BitState", self.pattern);
                    skipped_test = true;
                } else {
                    match dfa::search_fwd(prog, text, start..text.len(), true, kind) {
                        DfaResult::Failed => {
                            log::trace!("match '{}': anchored DFA failed, falling back", self.pattern);
                            skipped_test = true;
                        }
                        DfaResult::NoMatch => return false,
                        DfaResult::Match(end) => located = Some(start..end),
                    }
                }
            }
        }

        if !skipped_test && ncap <= 1 {
            // The DFA alone pinned the match; that's all that was asked.
            if ncap == 1 {
                submatch[0] = located.clone();
            }
        } else {
            // Re-run a capture-capable engine: over the exact match range
            // when the DFA found it, else over the whole subtext.
            let (range, eng_anchored, eng_kind) = match (&located, skipped_test) {
                (Some(r), false) => (r.clone(), true, Kind::Full),
                _ => (start..text.len(), anchored, kind),
            };
            let mut caps: Vec<Option<Range<usize>>> = vec![None; ncap];
            let found = if can_one_pass && eng_anchored {
                onepass::search(prog, text, range, eng_kind, &mut caps)
            } else if can_bit_state && range.len() <= bit_state_text_max {
                bitstate::search(prog, text, range, eng_anchored, eng_kind, &mut caps)
            } else {
                nfa::search(prog, text, range, eng_anchored, eng_kind, &mut caps)
            };
            if !found {
                if !skipped_test {
                    // The DFA said yes; a disagreeing engine is a bug,
                    // reported as no-match.
                    log::error!("capture engine inconsistency on '{}'", self.pattern);
                }
                return false;
            }
            submatch[..ncap].clone_from_slice(&caps);
        }

        // Widen the whole-match span back over the stripped prefix.
        if prefixlen > 0 && nsubmatch > 0 {
            if let Some(r) = submatch[0].take() {
                submatch[0] = Some(r.start - prefixlen..r.end);
            }
        }
        for slot in submatch.iter_mut().skip(ncap) {
            *slot = None;
        }
        true
    }

    /// Shared argument-extraction path behind the convenience operations.
    fn do_match(
        &self,
        text: &[u8],
        anchor: Anchor,
        consumed: Option<&mut usize>,
        args: &mut [Arg<'_>],
    ) -> bool {
        if !self.ok() {
            if self.options.log_errors {
                log::error!("Invalid regexp: {}", self.error());
            }
            return false;
        }
        if args.len() > MAX_ARGS {
            return false;
        }
        let n = args.len();
        let nvec = if n == 0 && consumed.is_none() { 0 } else { n + 1 };
        let mut vec: Vec<Option<Range<usize>>> = vec![None; nvec];
        if !self.match_at(text, 0, anchor, &mut vec) {
            return false;
        }
        if let Some(consumed) = consumed {
            *consumed = vec[0].as_ref().expect("whole match is always set").end;
        }
        if n == 0 {
            return true;
        }
        if self.ngroups < n {
            log::debug!("asked for {} groups but pattern has {}", n, self.ngroups);
            return false;
        }
        for (i, arg) in args.iter_mut().enumerate() {
            let bytes = match &vec[i + 1] {
                Some(span) => &text[span.clone()],
                None => &[][..],
            };
            if !arg.parse(bytes) {
                log::debug!("argument {} failed to parse", i);
                return false;
            }
        }
        true
    }

    /// Match the entire `text`, extracting captures into `args`.
    pub fn full_match(&self, text: &[u8], args: &mut [Arg<'_>]) -> bool {
        self.do_match(text, Anchor::AnchorBoth, None, args)
    }

    /// Match anywhere in `text`, extracting captures into `args`.
    pub fn partial_match(&self, text: &[u8], args: &mut [Arg<'_>]) -> bool {
        self.do_match(text, Anchor::Unanchored, None, args)
    }

    /// Does the pattern match all of `text`?
    pub fn is_full_match(&self, text: &[u8]) -> bool {
        self.full_match(text, &mut [])
    }

    /// Does the pattern match anywhere in `text`?
    pub fn is_partial_match(&self, text: &[u8]) -> bool {
        self.partial_match(text, &mut [])
    }

    /// Match at the beginning of `input`; on success advance `input`
    /// past the match.
    pub fn consume(&self, input: &mut &[u8], args: &mut [Arg<'_>]) -> bool {
        let text = *input;
        let mut consumed = 0;
        if self.do_match(text, Anchor::AnchorStart, Some(&mut consumed), args) {
            *input = &text[consumed..];
            true
        } else {
            false
        }
    }

    /// Match anywhere in `input`; on success advance `input` past the
    /// end of the match.
    pub fn find_and_consume(&self, input: &mut &[u8], args: &mut [Arg<'_>]) -> bool {
        let text = *input;
        let mut consumed = 0;
        if self.do_match(text, Anchor::Unanchored, Some(&mut consumed), args) {
            *input = &text[consumed..];
            true
        } else {
            false
        }
    }

    /// Replace the first match in `text` with the rewrite template.
    pub fn replace(&self, text: &mut Vec<u8>, template: &[u8]) -> bool {
        let nvec = 1 + rewrite::max_submatch(template);
        if nvec > MAX_ARGS + 1 {
            return false;
        }
        let mut vec: Vec<Option<Range<usize>>> = vec![None; nvec];
        if !self.match_at(text, 0, Anchor::Unanchored, &mut vec) {
            return false;
        }
        let mut replacement = Vec::new();
        if !rewrite::rewrite(&mut replacement, template, text, &vec) {
            return false;
        }
        let span = vec[0].clone().expect("whole match is always set");
        text.splice(span, replacement);
        true
    }

    /// Replace every non-overlapping match in `text`, returning how many
    /// replacements were made. `None` means the template was malformed —
    /// distinct from `Some(0)`, "no matches". A `\N` naming a group the
    /// pattern lacks reads as an unset capture and emits nothing; use
    /// [`check_rewrite_string`](Regex::check_rewrite_string) to validate
    /// references against the group count up front.
    pub fn global_replace(&self, text: &mut Vec<u8>, template: &[u8]) -> Option<usize> {
        let nvec = 1 + rewrite::max_submatch(template);
        if nvec > MAX_ARGS + 1 {
            return None;
        }

        let mut out = Vec::with_capacity(text.len());
        let mut p = 0;
        let mut lastend: Option<usize> = None;
        let mut count = 0;
        while p <= text.len() {
            let mut vec: Vec<Option<Range<usize>>> = vec![None; nvec];
            if !self.match_at(text, p, Anchor::Unanchored, &mut vec) {
                break;
            }
            let m = vec[0].clone().expect("whole match is always set");
            if p < m.start {
                out.extend_from_slice(&text[p..m.start]);
            }
            if Some(m.start) == lastend && m.is_empty() {
                // An empty match abutting the previous one would loop
                // forever: copy one byte and move on.
                if p < text.len() {
                    out.push(text[p]);
                }
                p += 1;
                continue;
            }
            if !rewrite::rewrite(&mut out, template, text, &vec) {
                return None;
            }
            p = m.end;
            lastend = Some(p);
            count += 1;
        }

        if count == 0 {
            return Some(0);
        }
        if p < text.len() {
            out.extend_from_slice(&text[p..]);
        }
        *text = out;
        Some(count)
    }

    /// Match once and emit the rewritten template, leaving `text`
    /// untouched.
    pub fn extract(&self, text: &[u8], template: &[u8]) -> Option<Vec<u8>> {
        let nvec = 1 + rewrite::max_submatch(template);
        if nvec > MAX_ARGS + 1 {
            return None;
        }
        let mut vec: Vec<Option<Range<usize>>> = vec![None; nvec];
        if !self.match_at(text, 0, Anchor::Unanchored, &mut vec) {
            return None;
        }
        let mut out = Vec::new();
        if !rewrite::rewrite(&mut out, template, text, &vec) {
            return None;
        }
        Some(out)
    }

    /// Validate a rewrite template against this pattern's group count.
    pub fn check_rewrite_string(&self, template: &[u8]) -> Result<(), String> {
        let ngroups = if self.ok() { self.ngroups as isize } else { -1 };
        rewrite::check_rewrite(template, ngroups)
    }

    /// Compute a `[min, max]` byte-string interval containing every
    /// possible match, each bound at most `maxlen` bytes. `None` when
    /// nothing useful is known.
    pub fn possible_match_range(&self, maxlen: usize) -> Option<(Vec<u8>, Vec<u8>)> {
        let prog = self.prog.as_ref()?;

        let n = self.prefix.len().min(maxlen);
        let mut pmin = self.prefix[..n].to_vec();
        let mut pmax = self.prefix[..n].to_vec();
        if self.prefix_foldcase {
            // The stored prefix is lowercase; the smallest matching
            // bytes are the uppercase forms.
            for b in &mut pmin {
                *b = b.to_ascii_uppercase();
            }
        }

        match prog.possible_match_range(maxlen - n) {
            Some((dmin, dmax)) => {
                pmin.extend_from_slice(&dmin);
                pmax.extend_from_slice(&dmax);
            }
            None if !pmax.is_empty() => {
                // The program walk gave nothing, but the prefix still
                // bounds the match: round it up to cover any suffix.
                pmax = program::prefix_successor(&pmax)?;
            }
            None => return None,
        }
        Some((pmin, pmax))
    }
}

/// Reject Perl-only escapes in POSIX mode unless the corresponding
/// option allows them.
fn posix_gate(pattern: &str, options: &Options) -> Option<Error> {
    if !options.posix_syntax || options.literal {
        return None;
    }
    let mut iter = pattern.bytes();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            continue;
        }
        let Some(next) = iter.next() else { break };
        let perl_class = matches!(next, b'd' | b'D' | b's' | b'S' | b'w' | b'W');
        let word_boundary = matches!(next, b'b' | b'B');
        if (perl_class && !options.perl_classes) || (word_boundary && !options.word_boundary) {
            return Some(Error::new(
                ErrorKind::BadPerlOp,
                format!("\\{} not allowed in POSIX mode", next as char),
                format!("\\{}", next as char),
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(pattern: &str) -> Regex {
        Regex::new(pattern).expect("pattern should compile")
    }

    fn span(re: &Regex, text: &[u8]) -> Option<(usize, usize)> {
        let mut vec = vec![None; 1];
        if re.match_at(text, 0, Anchor::Unanchored, &mut vec) {
            vec[0].clone().map(|r| (r.start, r.end))
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Construction and error states
    // -----------------------------------------------------------------------

    #[test]
    fn test_bad_pattern_is_inert() {
        let bad = Regex::compile("[", &Options::quiet());
        assert!(!bad.ok());
        assert_eq!(bad.error_kind(), ErrorKind::MissingBracket);
        assert!(!bad.is_full_match(b"anything"));
        assert!(!bad.is_partial_match(b"anything"));
        assert_eq!(bad.global_replace(&mut b"x".to_vec(), b"y"), Some(0));
        assert_eq!(bad.extract(b"x", b"\\0"), None);
        assert_eq!(bad.program_size(), None);
        assert_eq!(bad.number_of_capturing_groups(), None);
        assert!(bad.named_capturing_groups().is_empty());
    }

    #[test]
    fn test_new_returns_err() {
        assert_eq!(
            Regex::new("(ab").unwrap_err().kind(),
            ErrorKind::MissingParen
        );
    }

    #[test]
    fn test_pattern_too_large() {
        let mut opts = Options::quiet();
        opts.max_mem = 300;
        let re = Regex::compile("a{50}b{50}", &opts);
        assert!(!re.ok());
        assert_eq!(re.error_kind(), ErrorKind::PatternTooLarge);
        assert_eq!(re.error(), "pattern too large - compile failed");
    }

    #[test]
    fn test_accessors() {
        let re = re(r"(?P<year>\d{4})-(?P<month>\d{2})");
        assert!(re.ok());
        assert_eq!(re.error(), "");
        assert_eq!(re.error_kind(), ErrorKind::NoError);
        assert_eq!(re.pattern(), r"(?P<year>\d{4})-(?P<month>\d{2})");
        assert_eq!(re.number_of_capturing_groups(), Some(2));
        assert!(re.program_size().unwrap() > 0);
        let names = re.named_capturing_groups();
        assert_eq!(names.get("year"), Some(&1));
        assert_eq!(names.get("month"), Some(&2));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_literal_option() {
        let mut opts = Options::default();
        opts.literal = true;
        let re = Regex::compile("a.b", &opts);
        assert!(re.is_full_match(b"a.b"));
        assert!(!re.is_full_match(b"axb"));
    }

    #[test]
    fn test_latin1_encoding() {
        let re = Regex::compile("é+", &Options::latin1());
        assert!(re.ok());
        // In Latin-1 mode `é` is the single byte 0xE9.
        assert!(re.is_full_match(b"\xe9\xe9"));
        assert!(!re.is_full_match("é".as_bytes()));
    }

    #[test]
    fn test_never_nl() {
        let mut opts = Options::default();
        opts.never_nl = true;
        let re = Regex::compile("a[\nx]b", &opts);
        assert!(re.is_full_match(b"axb"));
        assert!(!re.is_full_match(b"a\nb"));
    }

    #[test]
    fn test_posix_gate() {
        let mut opts = Options::posix();
        opts.log_errors = false;
        let re = Regex::compile(r"\d+", &opts);
        assert_eq!(re.error_kind(), ErrorKind::BadPerlOp);
        assert_eq!(re.error_arg(), "\\d");

        opts.perl_classes = true;
        assert!(Regex::compile(r"\d+", &opts).ok());

        let re = Regex::compile(r"\bfoo\b", &opts);
        assert_eq!(re.error_kind(), ErrorKind::BadPerlOp);
        opts.word_boundary = true;
        assert!(Regex::compile(r"\bfoo\b", &opts).ok());
    }

    #[test]
    fn test_case_insensitive_option() {
        let mut opts = Options::default();
        opts.case_sensitive = false;
        let re = Regex::compile("hello", &opts);
        assert!(re.is_full_match(b"HeLLo"));
    }

    // -----------------------------------------------------------------------
    // Matching and captures
    // -----------------------------------------------------------------------

    #[test]
    fn test_full_match_extracts_ints() {
        let re = re(r"(\d+)-(\d+)");
        let (mut a, mut b) = (0i32, 0i32);
        assert!(re.full_match(b"42-17", &mut [Arg::new(&mut a), Arg::new(&mut b)]));
        assert_eq!((a, b), (42, 17));
    }

    #[test]
    fn test_full_match_capture_spans() {
        let re = re(r"(\d+)-(\d+)");
        let mut vec = vec![None; 3];
        assert!(re.match_at(b"42-17", 0, Anchor::AnchorBoth, &mut vec));
        assert_eq!(vec[0], Some(0..5));
        assert_eq!(vec[1], Some(0..2));
        assert_eq!(vec[2], Some(3..5));
    }

    #[test]
    fn test_partial_match_span() {
        let re = re("foo");
        assert_eq!(span(&re, b"foobar foobaz"), Some((0, 3)));
        assert!(!re.is_full_match(b"foobar"));
    }

    #[test]
    fn test_unmatched_group_distinct_from_empty() {
        let re1 = re("(a)(b)?");
        let mut vec = vec![None; 3];
        assert!(re1.match_at(b"a", 0, Anchor::AnchorBoth, &mut vec));
        assert_eq!(vec[1], Some(0..1));
        assert_eq!(vec[2], None);

        // An empty participating group is Some with an empty range.
        let re2 = re("(a)(b*)");
        let mut vec = vec![None; 3];
        assert!(re2.match_at(b"a", 0, Anchor::AnchorBoth, &mut vec));
        assert_eq!(vec[2], Some(1..1));
    }

    #[test]
    fn test_submatch_beyond_group_count_is_none() {
        let re = re("(a)");
        let mut vec = vec![Some(9..9), Some(9..9), Some(9..9), Some(9..9)];
        assert!(re.match_at(b"a", 0, Anchor::AnchorBoth, &mut vec));
        assert_eq!(vec[2], None);
        assert_eq!(vec[3], None);
    }

    #[test]
    fn test_case_fold_inline_flag() {
        let re = re("(?i)HELLO");
        assert!(re.is_full_match(b"Hello"));
        assert!(re.is_full_match(b"hello"));
        assert!(!re.is_full_match(b"hellx"));
    }

    #[test]
    fn test_prefix_filter() {
        let re = re("^foo\\d*");
        assert!(!re.prefix.is_empty());
        assert_eq!(span(&re, b"foo123"), Some((0, 6)));
        assert_eq!(span(&re, b"xfoo"), None);
        // The prefix anchors to the text start even for startpos > 0.
        let mut vec = vec![None; 1];
        assert!(!re.match_at(b"afoo12", 1, Anchor::Unanchored, &mut vec));
    }

    #[test]
    fn test_prefix_foldcase_filter() {
        let re = re("^(?i)hello");
        assert!(re.prefix_foldcase);
        assert_eq!(span(&re, b"HELLO world"), Some((0, 5)));
        assert_eq!(span(&re, b"HeLlO"), Some((0, 5)));
        assert_eq!(span(&re, b"jello"), None);
    }

    #[test]
    fn test_startpos() {
        let re = re("o+");
        let mut vec = vec![None; 1];
        assert!(re.match_at(b"foo boo", 2, Anchor::Unanchored, &mut vec));
        assert_eq!(vec[0], Some(2..3));
    }

    #[test]
    fn test_posix_longest() {
        let re_posix = Regex::compile("a|ab", &Options::posix());
        assert_eq!(span(&re_posix, b"xab"), Some((1, 3)));
        // Default leftmost-first prefers the first alternative.
        let re = re("a|ab");
        assert_eq!(span(&re, b"xab"), Some((1, 2)));
    }

    #[test]
    fn test_word_boundary_matching() {
        let re = re(r"\b(\w+)\b");
        let mut word = String::new();
        assert!(re.partial_match(b"  hello  ", &mut [Arg::new(&mut word)]));
        assert_eq!(word, "hello");
    }

    #[test]
    fn test_anchor_promotion_both() {
        // ^...$ promotes any anchor to AnchorBoth.
        let re = re("^abc$");
        assert_eq!(span(&re, b"abc"), Some((0, 3)));
        assert_eq!(span(&re, b"xabc"), None);
        assert_eq!(span(&re, b"abcx"), None);
    }

    #[test]
    fn test_existence_only_skips_position_discovery() {
        let re = re(r"(\w+)@(\w+)");
        let mut empty: [Option<Range<usize>>; 0] = [];
        assert!(re.match_at(b"mail a@b now", 0, Anchor::Unanchored, &mut empty));
    }

    // -----------------------------------------------------------------------
    // Engine equivalence across orchestrator paths
    // -----------------------------------------------------------------------

    /// The same pattern must yield identical captures no matter which
    /// engine the text-size thresholds select.
    #[test]
    fn test_orchestrator_equivalence_small_vs_large_text() {
        let re = re(r"(\w+):(\d+)");
        let short = b"host:80".to_vec();
        let mut long = vec![b' '; 5000];
        long.extend_from_slice(b"host:80");
        let offset = 5000;

        let mut vs = vec![None; 3];
        assert!(re.match_at(&short, 0, Anchor::Unanchored, &mut vs));
        let mut vl = vec![None; 3];
        assert!(re.match_at(&long, 0, Anchor::Unanchored, &mut vl));
        for i in 0..3 {
            let s = vs[i].clone().unwrap();
            let l = vl[i].clone().unwrap();
            assert_eq!((l.start - offset, l.end - offset), (s.start, s.end), "group {}", i);
        }
    }

    #[test]
    fn test_orchestrator_equivalence_many_groups() {
        // Seven capture pairs exceed the OnePass cap, forcing BitState,
        // and a long match range forces the Pike VM. All must agree.
        let pattern = r"(q)(w)(e)(r)(t)(y)(a+)";
        let re = re(pattern);

        let short = b"zzqwertyaaa".to_vec();
        let mut vs = vec![None; 8];
        assert!(re.match_at(&short, 0, Anchor::Unanchored, &mut vs));
        assert_eq!(vs[0], Some(2..11));
        assert_eq!(vs[7], Some(8..11));

        let mut long = b"zzqwerty".to_vec();
        long.extend(std::iter::repeat(b'a').take(20_000));
        let mut vl = vec![None; 8];
        assert!(re.match_at(&long, 0, Anchor::Unanchored, &mut vl));
        assert_eq!(vl[0], Some(2..20_008));
        assert_eq!(vl[1], Some(2..3));
        assert_eq!(vl[7], Some(8..20_008));
    }

    #[test]
    fn test_oracle_agreement_on_captures() {
        for (pattern, text) in [
            (r"(\d+)-(\d+)", "order 42-17 shipped"),
            (r"(a+)(b*)(c)", "xxaabccz"),
            (r"(foo|bar)baz", "zfoobazz"),
            (r"<(\w+)>", "a <div> here"),
        ] {
            let ours = re(pattern);
            let oracle = regex::Regex::new(pattern).unwrap();
            let caps = oracle.captures(text).unwrap();
            let n = 1 + ours.number_of_capturing_groups().unwrap();
            let mut vec = vec![None; n];
            assert!(
                ours.match_at(text.as_bytes(), 0, Anchor::Unanchored, &mut vec),
                "pattern `{}` should match {:?}",
                pattern,
                text
            );
            for i in 0..n {
                let expect = caps.get(i).map(|m| m.start()..m.end());
                assert_eq!(vec[i], expect, "group {} of `{}` on {:?}", i, pattern, text);
            }
        }
    }

    /// FullMatch(T, P) agrees with PartialMatch(T, ^P$).
    #[test]
    fn test_full_equals_partial_with_anchors() {
        for (pattern, text) in [
            ("a+b", "aab"),
            ("a+b", "aabx"),
            (r"\d{2,4}", "123"),
            (r"\d{2,4}", "1"),
            ("x|yz", "yz"),
        ] {
            let plain = re(pattern);
            let anchored = re(&format!("^(?:{})$", pattern));
            assert_eq!(
                plain.is_full_match(text.as_bytes()),
                anchored.is_partial_match(text.as_bytes()),
                "pattern `{}` on {:?}",
                pattern,
                text
            );
        }
    }

    // -----------------------------------------------------------------------
    // Consume / FindAndConsume
    // -----------------------------------------------------------------------

    #[test]
    fn test_consume() {
        let re = re(r"(\w+) ");
        let text = b"the quick brown".to_vec();
        let mut input = &text[..];
        let mut word = String::new();
        assert!(re.consume(&mut input, &mut [Arg::new(&mut word)]));
        assert_eq!(word, "the");
        assert!(re.consume(&mut input, &mut [Arg::new(&mut word)]));
        assert_eq!(word, "quick");
        // "brown" has no trailing space left to consume.
        assert!(!re.consume(&mut input, &mut [Arg::new(&mut word)]));
        assert_eq!(input, b"brown");
    }

    #[test]
    fn test_find_and_consume() {
        let re = re(r"(\d+)");
        let text = b"a1 b22 c333".to_vec();
        let mut input = &text[..];
        let mut nums = Vec::new();
        let mut n = 0u32;
        while re.find_and_consume(&mut input, &mut [Arg::new(&mut n)]) {
            nums.push(n);
        }
        assert_eq!(nums, [1, 22, 333]);
        assert!(input.is_empty());
    }

    #[test]
    fn test_consume_requires_match_at_start() {
        let re = re("b");
        let text = b"ab".to_vec();
        let mut input = &text[..];
        assert!(!re.consume(&mut input, &mut []));
        assert_eq!(input, b"ab");
        assert!(re.find_and_consume(&mut input, &mut []));
        assert!(input.is_empty());
    }

    // -----------------------------------------------------------------------
    // Replace / GlobalReplace / Extract
    // -----------------------------------------------------------------------

    #[test]
    fn test_replace_first() {
        let re = re("b+");
        let mut text = b"abbcbb".to_vec();
        assert!(re.replace(&mut text, b"X"));
        assert_eq!(text, b"aXcbb");
    }

    #[test]
    fn test_replace_with_groups() {
        let re = re(r"(\d+)-(\d+)");
        let mut text = b"range 10-20 end".to_vec();
        assert!(re.replace(&mut text, b"\\2-\\1"));
        assert_eq!(text, b"range 20-10 end");
    }

    #[test]
    fn test_replace_identity_rewrite() {
        // Replacing a match with `\0` leaves the text unchanged.
        let re = re(r"\w+");
        let mut text = b"hello world".to_vec();
        assert!(re.replace(&mut text, b"\\0"));
        assert_eq!(text, b"hello world");
    }

    #[test]
    fn test_global_replace_empty_matches() {
        // `a*` matches empty at every position: the empty-match rule
        // inserts one X per gap without looping.
        let re = re("a*");
        let mut text = b"bbb".to_vec();
        assert_eq!(re.global_replace(&mut text, b"X"), Some(4));
        assert_eq!(text, b"XbXbXbX");
    }

    #[test]
    fn test_global_replace_counts() {
        let re1 = re("o");
        let mut text = b"foo boo".to_vec();
        assert_eq!(re1.global_replace(&mut text, b"0"), Some(4));
        assert_eq!(text, b"f00 b00");

        let re2 = re("z");
        let mut text = b"foo".to_vec();
        assert_eq!(re2.global_replace(&mut text, b"!"), Some(0));
        assert_eq!(text, b"foo");
    }

    #[test]
    fn test_global_replace_out_of_range_group_is_unset() {
        // `\9` names a group the pattern lacks: it reads as an unset
        // capture and emits nothing, so every `a` is replaced by empty.
        let re = re("(a)");
        let mut text = b"aaa".to_vec();
        assert_eq!(re.global_replace(&mut text, b"\\9"), Some(3));
        assert_eq!(text, b"");
    }

    #[test]
    fn test_global_replace_malformed_template() {
        let re = re("(a)");
        let mut text = b"aaa".to_vec();
        assert_eq!(re.global_replace(&mut text, b"oops\\"), None);
        assert_eq!(text, b"aaa");
    }

    #[test]
    fn test_extract() {
        let re = re(r"(\w+)@(\w+)\.com");
        assert_eq!(
            re.extract(b"write to user@example.com today", b"\\2/\\1"),
            Some(b"example/user".to_vec())
        );
        assert_eq!(re.extract(b"no email here", b"\\1"), None);
    }

    #[test]
    fn test_check_rewrite_string() {
        let re = re("(a)(b)");
        assert!(re.check_rewrite_string(b"\\1\\2").is_ok());
        assert!(re.check_rewrite_string(b"plain \\\\ text").is_ok());
        assert!(re.check_rewrite_string(b"\\3").is_err());
        assert!(re.check_rewrite_string(b"oops\\").is_err());

        let bad = Regex::compile("[", &Options::quiet());
        assert!(bad.check_rewrite_string(b"\\0").is_err());
        assert!(bad.check_rewrite_string(b"plain").is_ok());
    }

    // -----------------------------------------------------------------------
    // QuoteMeta round trip
    // -----------------------------------------------------------------------

    #[test]
    fn test_quote_meta_round_trip() {
        let original = b"a.b\0c";
        let quoted = crate::quote_meta(original);
        assert_eq!(quoted, b"a\\.b\\x00c");
        let re = re(std::str::from_utf8(&quoted).unwrap());
        assert!(re.is_full_match(original));
        assert!(!re.is_full_match(b"aXb\0c"));
    }

    #[test]
    fn test_quote_meta_utf8_round_trip() {
        let original = "naïve[1.5—2.5]?".as_bytes();
        let quoted = crate::quote_meta(original);
        let re = re(std::str::from_utf8(&quoted).unwrap());
        assert!(re.is_full_match(original));
    }

    // -----------------------------------------------------------------------
    // PossibleMatchRange
    // -----------------------------------------------------------------------

    #[test]
    fn test_possible_match_range_literal() {
        let re = re("abc");
        assert_eq!(
            re.possible_match_range(10),
            Some((b"abc".to_vec(), b"abc".to_vec()))
        );
    }

    #[test]
    fn test_possible_match_range_with_prefix() {
        let re = re("^foo");
        assert!(!re.prefix.is_empty());
        assert_eq!(
            re.possible_match_range(10),
            Some((b"foo".to_vec(), b"foo".to_vec()))
        );
    }

    #[test]
    fn test_possible_match_range_foldcase_prefix() {
        let re = re("^(?i)ab");
        let (min, max) = re.possible_match_range(10).unwrap();
        assert_eq!(min, b"AB");
        assert_eq!(max, b"ab");
    }

    #[test]
    fn test_possible_match_range_truncated() {
        let re = re("a+");
        let (min, max) = re.possible_match_range(4).unwrap();
        assert_eq!(min, b"a");
        assert_eq!(max, b"aaab");
    }

    #[test]
    fn test_possible_match_range_invalid() {
        let bad = Regex::compile("[", &Options::quiet());
        assert_eq!(bad.possible_match_range(10), None);
    }

    // -----------------------------------------------------------------------
    // Overflow through the extraction path
    // -----------------------------------------------------------------------

    #[test]
    fn test_arg_overflow_fails_match() {
        // The regex matches, but the value does not fit: the call fails.
        let re = re(r"(\d+)");
        let mut small = 0u32;
        assert!(!re.full_match(b"18446744073709551616", &mut [Arg::new(&mut small)]));
        let mut wide = 0u64;
        assert!(!re.full_match(b"18446744073709551616", &mut [Arg::new(&mut wide)]));
        assert!(re.full_match(b"18446744073709551615", &mut [Arg::new(&mut wide)]));
        assert_eq!(wide, u64::MAX);
    }

    #[test]
    fn test_too_many_args_fails() {
        let re = re("(a)");
        let mut args: Vec<Arg<'_>> = (0..17).map(|_| Arg::ignore()).collect();
        assert!(!re.full_match(b"a", &mut args));
    }

    #[test]
    fn test_more_args_than_groups_fails() {
        let re = re("(a)");
        let (mut x, mut y) = (String::new(), String::new());
        assert!(!re.full_match(b"a", &mut [Arg::new(&mut x), Arg::new(&mut y)]));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn test_shared_across_threads() {
        let re = std::sync::Arc::new(re(r"(\d+)"));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let re = std::sync::Arc::clone(&re);
                std::thread::spawn(move || {
                    let text = format!("value {}", i * 11);
                    let mut n = 0u32;
                    assert!(re.partial_match(text.as_bytes(), &mut [Arg::new(&mut n)]));
                    n
                })
            })
            .collect();
        let got: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(got, [0, 11, 22, 33]);
    }
}
