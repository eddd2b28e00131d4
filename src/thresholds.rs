//! Threshold tuple parsing for memguard.
//!
//! The `-m`/`-s`/`-M`/`-S` flags all share one grammar: `"TERM[,KILL]"`,
//! two non-negative numbers (integer or simple decimal) separated by
//! exactly one comma. This module owns that grammar and the invariant
//! that falls out of it: `0 < kill <= term <= upper_limit`.

use std::fmt;

/// Failure modes for [`parse_term_kill_tuple`]. Each variant maps to the
/// single `fatal: ...` line the CLI boundary contract requires.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdParseError {
    /// The string didn't parse as one or two numbers separated by a comma.
    Malformed(String),
    /// A value parsed fine but wasn't a finite, non-negative number.
    NotANumber(String),
    /// Zero, or more than one, comma was found.
    WrongCommaCount(usize),
    /// A value was `<= 0` or `> upper_limit`.
    OutOfRange { value: f64, upper_limit: f64 },
}

impl fmt::Display for ThresholdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdParseError::Malformed(s) => write!(f, "'{s}' is not a valid TERM[,KILL] tuple"),
            ThresholdParseError::NotANumber(s) => write!(f, "'{s}' is not a number"),
            ThresholdParseError::WrongCommaCount(n) => {
                write!(f, "expected exactly one comma, found {n}")
            }
            ThresholdParseError::OutOfRange { value, upper_limit } => write!(
                f,
                "{value} is out of range (must be > 0 and <= {upper_limit})"
            ),
        }
    }
}

impl std::error::Error for ThresholdParseError {}

/// Parse `"TERM[,KILL]"` into `(term_percent, kill_percent)`.
///
/// Rules (see `spec.md` §4.6):
/// - leading/trailing non-numeric garbage fails;
/// - zero or more than one comma fails;
/// - `KILL` defaults to `TERM / 2` when omitted;
/// - both values must be `> 0` and `<= upper_limit`;
/// - if `TERM < KILL`, `TERM` is raised to `KILL` (TermArmed must never be
///   a weaker condition than KillArmed).
pub fn parse_term_kill_tuple(s: &str, upper_limit: f64) -> Result<(f64, f64), ThresholdParseError> {
    let comma_count = s.matches(',').count();
    if comma_count > 1 {
        return Err(ThresholdParseError::WrongCommaCount(comma_count));
    }

    let (term_str, kill_str) = match s.split_once(',') {
        Some((t, k)) => (t, Some(k)),
        None => (s, None),
    };

    let term = parse_one_number(term_str)?;
    let term = validate_range(term, upper_limit)?;

    let kill = match kill_str {
        Some(k) => validate_range(parse_one_number(k)?, upper_limit)?,
        // term/2 is always in range when term is: upper_limit > 0 and
        // 0 < term/2 < term <= upper_limit.
        None => term / 2.0,
    };

    let term = if term < kill { kill } else { term };

    Ok((term, kill))
}

fn parse_one_number(s: &str) -> Result<f64, ThresholdParseError> {
    if s.is_empty() {
        return Err(ThresholdParseError::Malformed(s.to_string()));
    }
    if s.matches('.').count() > 1 {
        return Err(ThresholdParseError::Malformed(s.to_string()));
    }
    if !s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(ThresholdParseError::Malformed(s.to_string()));
    }
    s.parse::<f64>()
        .map_err(|_| ThresholdParseError::NotANumber(s.to_string()))
}

fn validate_range(value: f64, upper_limit: f64) -> Result<f64, ThresholdParseError> {
    if value > 0.0 && value <= upper_limit {
        Ok(value)
    } else {
        Err(ThresholdParseError::OutOfRange { value, upper_limit })
    }
}
