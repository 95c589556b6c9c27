//! Pattern compilation options.
//!
//! An [`Options`] value is translated into `regex-syntax` parser flags at
//! construction time (see [`crate::Regex::compile`]) and consulted again at
//! match time for the search kind ([`Options::longest_match`]) and for
//! diagnostic gating ([`Options::log_errors`]).

/// How pattern text and haystack bytes are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Characters are UTF-8 sequences; classes and case folding are
    /// Unicode-aware. Haystack bytes that do not form valid UTF-8 simply
    /// fail to match multi-byte constructs.
    Utf8,
    /// Every char of the pattern up to U+00FF denotes a single haystack
    /// byte; classes and case folding are byte-oriented (ASCII).
    Latin1,
}

/// Configuration for compiling a [`Regex`](crate::Regex).
///
/// The defaults mirror common Perl-style expectations: UTF-8 encoding,
/// leftmost-first matching, case sensitivity, and error logging enabled.
#[derive(Clone, Debug)]
pub struct Options {
    /// Pattern/haystack byte interpretation.
    pub encoding: Encoding,
    /// Restrict the pattern to POSIX ERE constructs and use
    /// leftmost-longest match semantics.
    pub posix_syntax: bool,
    /// Choose leftmost-longest instead of leftmost-first. Implied by
    /// `posix_syntax`.
    pub longest_match: bool,
    /// Emit a log line on parse/compile failure. Engine inconsistencies
    /// are always logged.
    pub log_errors: bool,
    /// Total memory cap for the compiled programs, split 2/3 forward and
    /// 1/3 reverse.
    pub max_mem: usize,
    /// Treat the pattern as a literal string.
    pub literal: bool,
    /// `\n` never matches, not even through an explicit class.
    pub never_nl: bool,
    /// When false, fold case: ASCII in Latin-1 mode, Unicode in UTF-8
    /// mode.
    pub case_sensitive: bool,
    /// Permit `\d` `\s` `\w` in POSIX mode. Ignored in Perl mode, where
    /// they are always available.
    pub perl_classes: bool,
    /// Permit `\b` `\B` in POSIX mode. Ignored in Perl mode.
    pub word_boundary: bool,
    /// `^` and `$` match only at the beginning and end of the text, never
    /// at embedded newlines. Only meaningful in POSIX mode; Perl mode uses
    /// the inline `(?m)` flag instead.
    pub one_line: bool,
}

/// Default memory cap for compiled programs (forward + reverse).
pub const DEFAULT_MAX_MEM: usize = 8 << 20;

impl Default for Options {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            posix_syntax: false,
            longest_match: false,
            log_errors: true,
            max_mem: DEFAULT_MAX_MEM,
            literal: false,
            never_nl: false,
            case_sensitive: true,
            perl_classes: false,
            word_boundary: false,
            one_line: false,
        }
    }
}

impl Options {
    /// Default option set: UTF-8, Perl dialect, leftmost-first, logging on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Like the default set but with Latin-1 byte interpretation.
    pub fn latin1() -> Self {
        Self {
            encoding: Encoding::Latin1,
            ..Self::default()
        }
    }

    /// POSIX ERE parsing with leftmost-longest semantics.
    pub fn posix() -> Self {
        Self {
            posix_syntax: true,
            longest_match: true,
            ..Self::default()
        }
    }

    /// Default set with error logging disabled, for speculative
    /// compilation of user-supplied patterns.
    pub fn quiet() -> Self {
        Self {
            log_errors: false,
            ..Self::default()
        }
    }

    /// Effective match kind: POSIX syntax implies leftmost-longest even if
    /// `longest_match` was left unset.
    pub(crate) fn effective_longest(&self) -> bool {
        self.longest_match || self.posix_syntax
    }
}
