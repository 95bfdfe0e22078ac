//! errors.rs - Custom error types for the datafence-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// This enum represents all possible error types in the `datafence-core` library.
///
/// By using `#[non_exhaustive]`, we signal to consumers of this library that
/// new variants may be added in future versions. This prevents them from
/// matching all variants exhaustively, thus avoiding breaking changes.
///
/// Load-time variants are fatal to the load that produced them and never
/// activate a partial snapshot. Verification runtime faults are deliberately
/// *not* represented here: they are downgraded to a failed verification for
/// the offending match and logged, so one misbehaving rule cannot deny
/// results for the rest of a scan.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DetectError {
    #[error("Malformed pattern source '{source_id}': {message}")]
    MalformedSource { source_id: String, message: String },

    #[error("Duplicate pattern id '{0}' across loaded sources")]
    DuplicatePattern(String),

    #[error("Pattern '{pattern}' references unknown verification function '{function}'; register it before loading")]
    UnknownVerification { pattern: String, function: String },

    #[error("Failed to compile pattern '{0}': {1}")]
    PatternCompile(String, regex::Error),

    #[error("Pattern '{pattern}': {kind} example {example:?} {problem}")]
    ExampleValidation {
        pattern: String,
        kind: &'static str,
        example: String,
        problem: &'static str,
    },

    #[error("Pattern not found: {0}")]
    UnknownPattern(String),

    #[error("Token '{0}' has no entry in the supplied token map")]
    MissingToken(String),

    #[error("An unexpected I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}
