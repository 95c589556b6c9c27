//! Compilation error taxonomy.
//!
//! Every failure mode of pattern construction maps onto the closed
//! [`ErrorKind`] enum. The underlying parser reports richer, versioned
//! error kinds; [`Error::from_syntax`] folds them onto this stable set and
//! keeps the offending pattern fragment for diagnostics.

use std::fmt;

use regex_syntax::ast;
use regex_syntax::hir;

/// What went wrong while compiling a pattern. Closed set; parser errors
/// with no better mapping fold to [`ErrorKind::Internal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// No error. Only ever observed through
    /// [`Regex::error_kind`](crate::Regex::error_kind) on a valid pattern.
    NoError,
    /// Unexpected parser state.
    Internal,
    /// Bad escape sequence, e.g. `\q`.
    BadEscape,
    /// Bad character class, e.g. `[z-a]` class syntax.
    BadCharClass,
    /// Bad character class range.
    BadCharRange,
    /// Missing closing `]`.
    MissingBracket,
    /// Missing closing `)` or unopened `(`.
    MissingParen,
    /// Trailing `\` at end of pattern.
    TrailingBackslash,
    /// Repeat operator with nothing to repeat, e.g. `*` at pattern start.
    RepeatArgument,
    /// Bad or oversized repetition count, e.g. `a{1001}` beyond the limit.
    RepeatSize,
    /// Bad repetition operator usage.
    RepeatOp,
    /// Perl-only construct used where the dialect forbids it.
    BadPerlOp,
    /// The pattern would match byte sequences that are not valid UTF-8
    /// while UTF-8 encoding was requested.
    BadUtf8,
    /// Bad named capture group.
    BadNamedCapture,
    /// The compiled program did not fit in the memory budget.
    PatternTooLarge,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoError => "no error",
            ErrorKind::Internal => "internal error",
            ErrorKind::BadEscape => "bad escape sequence",
            ErrorKind::BadCharClass => "bad character class",
            ErrorKind::BadCharRange => "bad character class range",
            ErrorKind::MissingBracket => "missing closing ]",
            ErrorKind::MissingParen => "missing closing )",
            ErrorKind::TrailingBackslash => "trailing \\ at end of regexp",
            ErrorKind::RepeatArgument => "repeat argument missing, e.g. \"*\"",
            ErrorKind::RepeatSize => "bad repetition count",
            ErrorKind::RepeatOp => "bad repetition operator",
            ErrorKind::BadPerlOp => "invalid perl operator",
            ErrorKind::BadUtf8 => "invalid UTF-8 in regexp",
            ErrorKind::BadNamedCapture => "invalid named capture group",
            ErrorKind::PatternTooLarge => "pattern too large - compile failed",
        }
    }
}

/// A pattern compilation error: the [`ErrorKind`], a human-readable
/// message, and the pattern fragment the parser blamed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    /// Offending fragment of the pattern, possibly empty.
    arg: String,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            arg: arg.into(),
        }
    }

    /// Build from the parser's error, folding its kind onto the closed
    /// taxonomy and extracting the blamed fragment via the error span.
    pub(crate) fn from_syntax(err: &regex_syntax::Error, pattern: &str) -> Self {
        let (kind, span) = match err {
            regex_syntax::Error::Parse(e) => (map_ast_kind(e.kind()), Some(*e.span())),
            regex_syntax::Error::Translate(e) => (map_hir_kind(e.kind()), Some(*e.span())),
            _ => (ErrorKind::Internal, None),
        };
        let arg = span
            .and_then(|s| pattern.get(s.start.offset..s.end.offset))
            .unwrap_or("")
            .to_owned();
        Self::new(kind, err.to_string(), arg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending pattern fragment, when the parser identified one.
    pub fn arg(&self) -> &str {
        &self.arg
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arg.is_empty() {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        } else {
            write!(f, "{}: {} ({:?})", self.kind.as_str(), self.message, self.arg)
        }
    }
}

impl std::error::Error for Error {}

fn map_ast_kind(kind: &ast::ErrorKind) -> ErrorKind {
    use ast::ErrorKind::*;
    match kind {
        ClassUnclosed => ErrorKind::MissingBracket,
        GroupUnclosed | GroupUnopened => ErrorKind::MissingParen,
        EscapeUnexpectedEof => ErrorKind::TrailingBackslash,
        EscapeUnrecognized
        | EscapeHexEmpty
        | EscapeHexInvalid
        | EscapeHexInvalidDigit
        | ClassEscapeInvalid => ErrorKind::BadEscape,
        ClassRangeInvalid | ClassRangeLiteral => ErrorKind::BadCharRange,
        UnicodeClassInvalid => ErrorKind::BadCharClass,
        RepetitionMissing => ErrorKind::RepeatArgument,
        RepetitionCountInvalid
        | RepetitionCountDecimalEmpty
        | RepetitionCountUnclosed
        | NestLimitExceeded(_) => ErrorKind::RepeatSize,
        GroupNameDuplicate { .. }
        | GroupNameEmpty
        | GroupNameInvalid
        | GroupNameUnexpectedEof => ErrorKind::BadNamedCapture,
        UnsupportedBackreference | UnsupportedLookAround => ErrorKind::BadPerlOp,
        _ => ErrorKind::Internal,
    }
}

fn map_hir_kind(kind: &hir::ErrorKind) -> ErrorKind {
    use hir::ErrorKind::*;
    match kind {
        UnicodeNotAllowed => ErrorKind::BadEscape,
        InvalidUtf8 => ErrorKind::BadUtf8,
        UnicodePropertyNotFound | UnicodePropertyValueNotFound => ErrorKind::BadCharClass,
        _ => ErrorKind::Internal,
    }
}
