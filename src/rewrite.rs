//! Rewrite templates and metacharacter quoting.
//!
//! A rewrite template is a byte string where `\N` (N in 0..9) inserts
//! capture N, `\\` inserts a literal backslash, and everything else is
//! copied verbatim. Any other `\X`, or a trailing `\`, is malformed.

use std::ops::Range;

/// Largest capture index referenced by a template; sizes the capture
/// vector minimally.
pub(crate) fn max_submatch(rewrite: &[u8]) -> usize {
    let mut max = 0;
    let mut iter = rewrite.iter();
    while let Some(&b) = iter.next() {
        if b == b'\\' {
            if let Some(&d) = iter.next() {
                if d.is_ascii_digit() {
                    max = max.max((d - b'0') as usize);
                }
            }
        }
    }
    max
}

/// Append the template to `out`, substituting captured spans of `text`.
/// `false` (with an error log) on a malformed template or a capture
/// reference past `captures.len()`.
pub(crate) fn rewrite(
    out: &mut Vec<u8>,
    template: &[u8],
    text: &[u8],
    captures: &[Option<Range<usize>>],
) -> bool {
    let mut iter = template.iter();
    while let Some(&b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(&d) if d.is_ascii_digit() => {
                let n = (d - b'0') as usize;
                if n >= captures.len() {
                    log::error!(
                        "requested group {} in rewrite {:?}",
                        n,
                        String::from_utf8_lossy(template)
                    );
                    return false;
                }
                if let Some(span) = &captures[n] {
                    out.extend_from_slice(&text[span.clone()]);
                }
            }
            Some(b'\\') => out.push(b'\\'),
            _ => {
                log::error!(
                    "invalid rewrite pattern: {:?}",
                    String::from_utf8_lossy(template)
                );
                return false;
            }
        }
    }
    true
}

/// Validate a template against a pattern's group count without running a
/// match (`-1` for a pattern that failed to compile). The error text
/// names the offending construct.
pub(crate) fn check_rewrite(template: &[u8], ngroups: isize) -> Result<(), String> {
    let mut max_token: isize = -1;
    let mut iter = template.iter();
    while let Some(&b) = iter.next() {
        if b != b'\\' {
            continue;
        }
        match iter.next() {
            None => {
                return Err("Rewrite schema error: '\\' not allowed at end.".to_owned());
            }
            Some(b'\\') => {}
            Some(&d) if d.is_ascii_digit() => {
                max_token = max_token.max((d - b'0') as isize);
            }
            Some(_) => {
                return Err(
                    "Rewrite schema error: '\\' must be followed by a digit or '\\'.".to_owned(),
                );
            }
        }
    }
    if max_token > ngroups {
        return Err(format!(
            "Rewrite schema requests {} matches, but the regexp only has {} parenthesized subexpressions.",
            max_token, ngroups
        ));
    }
    Ok(())
}

/// Escape `unquoted` so the result matches it literally.
///
/// Every byte outside `[A-Za-z0-9_]` without the high bit set gets a
/// backslash. High-bit bytes pass through untouched so UTF-8 and Latin-1
/// sequences survive. NUL becomes the four bytes `\x00`, since `\0`
/// followed by a digit would parse as a longer escape.
pub fn quote_meta(unquoted: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(unquoted.len() * 2);
    for &b in unquoted {
        if !b.is_ascii_alphanumeric() && b != b'_' && b & 0x80 == 0 {
            if b == 0 {
                result.extend_from_slice(b"\\x00");
                continue;
            }
            result.push(b'\\');
        }
        result.push(b);
    }
    result
}
