//! Search engines.
//!
//! Four engines implement the same contract over a compiled
//! [`Program`](crate::program::Program) and trade off speed, memory, and
//! capability:
//!
//! - [`dfa`] — set-simulation with a bounded state cache; fastest, no
//!   submatch information, can run out of cache.
//! - [`onepass`] — deterministic single-thread walk for automata with no
//!   byte-level ambiguity; linear time with minimal state.
//! - [`bitstate`] — backtracking memoized by a
//!   `program.size × text.size` bit vector; deterministic memory bound.
//! - [`nfa`] — Pike VM; the always-available baseline with full capture
//!   support.
//!
//! The facade's orchestrator picks the fastest engine whose capability
//! predicate holds and falls back down the ladder on failure.
//!
//! All engines receive the full haystack plus a search range, so
//! empty-width assertions evaluate against absolute text positions and
//! behave identically on sub-slices.

pub(crate) mod bitstate;
pub(crate) mod dfa;
pub(crate) mod nfa;
pub(crate) mod onepass;

use regex_syntax::hir::Look;

/// Match semantics requested from an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    /// Leftmost-first (Perl-style): the first match a backtracker would
    /// find.
    First,
    /// Leftmost-longest (POSIX).
    Longest,
    /// The entire search range must match.
    Full,
}

/// ASCII word byte: `[0-9A-Za-z_]`.
#[inline]
pub(crate) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Evaluate an empty-width assertion at absolute position `pos` of
/// `text`.
///
/// Word boundaries are ASCII in every mode; the Unicode look variants
/// produced by the parser in UTF-8 mode evaluate with the same ASCII
/// word-byte table the automata engines use.
pub(crate) fn look_matches(look: Look, text: &[u8], pos: usize) -> bool {
    let before = if pos == 0 { None } else { Some(text[pos - 1]) };
    let after = text.get(pos).copied();
    let word_before = before.is_some_and(is_word_byte);
    let word_after = after.is_some_and(is_word_byte);
    match look {
        Look::Start => before.is_none(),
        Look::End => after.is_none(),
        Look::StartLF => before.is_none() || before == Some(b'\n'),
        Look::EndLF => after.is_none() || after == Some(b'\n'),
        Look::StartCRLF => {
            before.is_none() || before == Some(b'\n') || (before == Some(b'\r') && after != Some(b'\n'))
        }
        Look::EndCRLF => {
            after.is_none() || after == Some(b'\r') || (after == Some(b'\n') && before != Some(b'\r'))
        }
        Look::WordAscii | Look::WordUnicode => word_before != word_after,
        Look::WordAsciiNegate | Look::WordUnicodeNegate => word_before == word_after,
        Look::WordStartAscii | Look::WordStartUnicode => !word_before && word_after,
        Look::WordEndAscii | Look::WordEndUnicode => word_before && !word_after,
        Look::WordStartHalfAscii | Look::WordStartHalfUnicode => !word_before,
        Look::WordEndHalfAscii | Look::WordEndHalfUnicode => !word_after,
    }
}

/// Convert filled capture slots to the caller-facing span form: a group
/// is `Some(start..end)` only when both of its slots were written.
pub(crate) fn slots_to_spans(
    slots: &[Option<usize>],
    out: &mut [Option<std::ops::Range<usize>>],
) {
    for (i, span) in out.iter_mut().enumerate() {
        *span = match (slots.get(i * 2).copied().flatten(), slots.get(i * 2 + 1).copied().flatten())
        {
            (Some(s), Some(e)) => Some(s..e),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundary_positions() {
        let text = b"ab cd";
        assert!(look_matches(Look::WordAscii, text, 0));
        assert!(!look_matches(Look::WordAscii, text, 1));
        assert!(look_matches(Look::WordAscii, text, 2));
        assert!(look_matches(Look::WordAscii, text, 3));
        assert!(look_matches(Look::WordAscii, text, 5));
        assert!(look_matches(Look::WordAsciiNegate, text, 1));
    }

    #[test]
    fn test_text_boundaries() {
        let text = b"a\nb";
        assert!(look_matches(Look::Start, text, 0));
        assert!(!look_matches(Look::Start, text, 2));
        assert!(look_matches(Look::End, text, 3));
        assert!(look_matches(Look::StartLF, text, 2));
        assert!(look_matches(Look::EndLF, text, 1));
        assert!(!look_matches(Look::EndLF, text, 2));
    }

    #[test]
    fn test_unicode_word_is_ascii_here() {
        let text = "héllo".as_bytes();
        // The boundary after `h` falls inside the UTF-8 sequence for é;
        // ASCII word rules see a non-word byte there.
        assert!(look_matches(Look::WordUnicode, text, 1));
    }

    #[test]
    fn test_slots_to_spans_partial_groups() {
        let slots = vec![Some(0), Some(3), None, None, Some(1), Some(2)];
        let mut out = vec![None, None, None, None];
        slots_to_spans(&slots, &mut out);
        assert_eq!(out[0], Some(0..3));
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(1..2));
        assert_eq!(out[3], None);
    }
}
