//! Regular expression matching on finite automata.
//!
//! Based on Russ Cox's article series
//! <https://swtch.com/~rsc/regexp/regexp1.html> (Thompson NFA
//! construction and simulation, DFA composition for submatch recovery):
//! matching never backtracks exponentially, and pathological patterns
//! degrade to linear scans instead of hangs.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! pattern  ──regex_syntax──>  Hir  ──program::compile──>  Program
//!                                                            │
//!                 ┌────────────┬──────────────┬──────────────┤
//!              engines::dfa  engines::onepass  engines::bitstate  engines::nfa
//!                 └────────────┴──────────────┴──────────────┘
//!                                  Regex::match_at (orchestrator)
//! ```
//!
//! Parsing is delegated to `regex-syntax`; everything after the HIR is
//! local. A [`Regex`] compiles the pattern once (factoring out a
//! required literal prefix when the pattern admits one), and each match
//! call picks among four engines by pattern shape, anchoring, input
//! size, capture requirements, and memory budget:
//!
//! - the **lazy DFA** filters non-matches and locates match bounds
//!   (a forward scan finds the end, a reverse scan over the reversed
//!   program finds the start), but knows nothing about captures and may
//!   run out of its bounded state cache;
//! - **OnePass** walks ambiguity-free automata in one deterministic
//!   pass with full capture tracking;
//! - **BitState** is a backtracker memoized by a
//!   `program.size × text.size` bit vector, exact and memory-bounded;
//! - the **Pike VM** is the always-available fallback.
//!
//! An engine that fails (DFA cache exhaustion) is never an answer: the
//! orchestrator falls down the ladder until one succeeds.
//!
//! # Example
//!
//! ```
//! use refa::{Arg, Regex};
//!
//! let re = Regex::new(r"(\d+)-(\d+)").unwrap();
//! let (mut lo, mut hi) = (0i32, 0i32);
//! assert!(re.full_match(b"42-17", &mut [Arg::new(&mut lo), Arg::new(&mut hi)]));
//! assert_eq!((lo, hi), (42, 17));
//! ```

mod args;
mod engines;
mod error;
mod options;
mod program;
mod regex;
mod rewrite;

pub use crate::args::{Arg, FromCapture, FromCaptureRadix, MAX_ARGS};
pub use crate::error::{Error, ErrorKind};
pub use crate::options::{Encoding, Options, DEFAULT_MAX_MEM};
pub use crate::regex::{Anchor, Regex};
pub use crate::rewrite::quote_meta;
