//! Core data model for `datafence-core`.
//!
//! This module defines the serializable types that make up a pattern source
//! document (namespace, entries, policies) and the result types produced by
//! the scanning and redaction pipeline. Compiled, index-backed forms of these
//! types live in [`crate::store`].
//!
//! License: MIT OR APACHE 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category a pattern (and any match it produces) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Phone,
    Ssn,
    Rrn,
    Email,
    Bank,
    Passport,
    Address,
    CreditCard,
    Ip,
    Name,
    Iban,
    Location,
    Token,
    Other,
}

impl Category {
    /// Lowercase wire name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Phone => "phone",
            Category::Ssn => "ssn",
            Category::Rrn => "rrn",
            Category::Email => "email",
            Category::Bank => "bank",
            Category::Passport => "passport",
            Category::Address => "address",
            Category::CreditCard => "credit_card",
            Category::Ip => "ip",
            Category::Name => "name",
            Category::Iban => "iban",
            Category::Location => "location",
            Category::Token => "token",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a consumer should do when a pattern matches. Advisory metadata
/// carried on every match; the engine itself does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionOnMatch {
    #[default]
    Redact,
    Report,
    Tokenize,
    Ignore,
}

/// Severity level of the data a pattern targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Per-pattern policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Policy {
    /// Whether matched plaintext may be surfaced in results.
    pub store_raw: bool,
    pub action_on_match: ActionOnMatch,
    pub severity: Severity,
}

/// Positive and negative examples used to validate a pattern at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Examples {
    #[serde(rename = "match")]
    pub matching: Vec<String>,
    pub nomatch: Vec<String>,
}

/// Regex flags a pattern source may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFlag {
    CaseInsensitive,
    Multiline,
    DotAll,
    Unicode,
    Verbose,
}

/// A single pattern entry as it appears in a source document, prior to
/// compilation. See [`crate::store::PatternDefinition`] for the compiled form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub id: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    /// The regex source. Authors are responsible for backtracking-safe
    /// expressions; runtime regex budgets are out of scope.
    pub pattern: String,
    #[serde(default)]
    pub flags: Vec<PatternFlag>,
    /// Fixed replacement used by the `mask` strategy. When absent, a generic
    /// equal-length mask is produced instead.
    #[serde(default)]
    pub mask: Option<String>,
    /// Name of a verification function registered before load.
    #[serde(default)]
    pub verification: Option<String>,
    #[serde(default)]
    pub examples: Option<Examples>,
    #[serde(default)]
    pub policy: Policy,
    /// Keyword hints feeding the candidate-selection index.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Search priority; lower sorts first and wins overlap tie-breaks.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

pub(crate) fn default_priority() -> i32 {
    100
}

/// A pattern source document: one namespace per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDocument {
    pub namespace: String,
    #[serde(default)]
    pub description: String,
    pub patterns: Vec<PatternEntry>,
}

/// Single finalized match produced by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Full `namespace/id` identifier, e.g. `"us/ssn_01"`.
    pub ns_id: String,
    pub pattern_id: String,
    pub namespace: String,
    pub category: Category,
    /// Byte offset of the match start in the scanned text.
    pub start: usize,
    /// Byte offset one past the match end.
    pub end: usize,
    /// Matched plaintext; only populated when the scan requested it *and*
    /// the pattern policy permits storing raw values.
    pub matched_text: Option<String>,
    /// Mask template declared by the pattern, if any.
    pub mask: Option<String>,
    pub severity: Severity,
    pub action_on_match: ActionOnMatch,
    /// Confidence in [0, 1]: verification base plus any context-anchor boost.
    pub confidence: f64,
}

impl Match {
    /// The `(start, end)` byte span.
    pub fn span(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Result of a find/scan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindResult {
    pub matches: Vec<Match>,
    /// Namespaces that were actually searched.
    pub namespaces_searched: Vec<String>,
}

impl FindResult {
    pub fn has_matches(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

/// Result of validating a single value against one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ns_id: String,
    pub is_valid: bool,
    pub matched: Option<Match>,
}

/// Strategy used to rewrite matched spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedactionStrategy {
    #[default]
    Mask,
    Hash,
    Tokenize,
    Fake,
}

/// Result of a redact/tokenize operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionResult {
    pub original_text: String,
    pub redacted_text: String,
    pub strategy: RedactionStrategy,
    pub matches: Vec<Match>,
    pub redaction_count: usize,
}
