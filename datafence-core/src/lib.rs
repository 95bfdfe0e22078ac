// datafence-core/src/lib.rs
//! # DataFence Core Library
//!
//! `datafence-core` provides the platform-independent logic for detecting,
//! verifying, and redacting sensitive data in text. It defines the data model
//! for namespaced pattern corpora, compiles YAML pattern documents into
//! immutable snapshots, and runs a staged detection pipeline: candidate
//! selection, regex matching, overlap resolution, programmatic verification,
//! and context-based confidence scoring.
//!
//! The library is pure and stateless per scan: every scan runs against one
//! immutable snapshot, without concerns for I/O or application-specific
//! state management.
//!
//! ## Modules
//!
//! * `models`: Defines `PatternEntry`, `PatternDocument`, `Match`, and the
//!   other serializable core types.
//! * `store`: Compiles documents into `PatternSnapshot`s and hosts the
//!   hot-reloadable `PatternStore`.
//! * `verification`: Registry of named verification functions and the
//!   built-in checkers (Luhn, IBAN mod-97, SSN rules, entropy, and so on).
//! * `context`: Candidate selection from caller hints and anchor-keyword
//!   confidence scoring.
//! * `overlap`: Deterministic resolution of overlapping raw matches.
//! * `engine`: The `Engine` scan pipeline (`find` / `validate`).
//! * `redact`: Mask/hash/tokenize/fake rendering and reversible token maps.
//! * `fake`: The pluggable `FakeValues` generator for the fake strategy.
//! * `batch`: Bounded concurrent scanning over many texts.
//! * `errors`: The `DetectError` type shared by all fallible operations.
//!
//! ## Public API
//!
//! **Corpus & Snapshots**
//!
//! * [`PatternSnapshot`]: An immutable, indexed, compiled pattern corpus.
//! * [`PatternSnapshot::load_defaults`]: Loads the bundled pattern corpus.
//! * [`PatternStore`]: Publishes snapshots atomically for hot reload.
//! * [`VerificationRegistry`]: Resolves verification names at load time.
//!
//! **Detection**
//!
//! * [`Engine`]: Runs the staged scan pipeline over a snapshot.
//! * [`ScanRequest`]: Per-scan namespace scope, hints, and flags.
//! * [`ContextHint`] / [`SelectionStrategy`]: Caller-supplied candidate
//!   narrowing.
//!
//! **Redaction**
//!
//! * [`RedactionEngine`]: Rewrites matched spans with a
//!   [`RedactionStrategy`].
//! * [`TokenMap`] / [`detokenize`]: Reversal of tokenized output.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use datafence_core::{Engine, PatternSnapshot, ScanRequest, VerificationRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let registry = VerificationRegistry::with_builtins();
//!     let snapshot = PatternSnapshot::load_defaults(&registry)?;
//!     let engine = Engine::new(Arc::new(snapshot));
//!
//!     let text = "Contact: user@example.com, SSN 123-45-6789.";
//!     let found = engine.find(text, &ScanRequest::default());
//!     assert_eq!(found.match_count(), 2);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`DetectError`], a `thiserror` enum that keeps
//! load-time failures (malformed sources, duplicate ids, bad regexes) apart
//! from scan-time ones (unknown patterns, unmapped tokens).
//!
//! ---
//! License: MIT OR APACHE 2.0

pub mod batch;
pub mod context;
pub mod engine;
pub mod errors;
pub mod fake;
pub mod models;
pub mod overlap;
pub mod redact;
pub mod store;
pub mod verification;

/// Re-exports the shared error type for clear error reporting.
pub use errors::DetectError;

/// Re-exports the serializable core data model.
pub use models::{
    ActionOnMatch, Category, Examples, FindResult, Match, PatternDocument, PatternEntry,
    PatternFlag, Policy, RedactionResult, RedactionStrategy, Severity, ValidationResult,
};

/// Re-exports corpus compilation and snapshot publishing.
pub use store::{
    LoadOptions, PatternDefinition, PatternSnapshot, PatternStore, MAX_PATTERN_LENGTH,
};

/// Re-exports the verification registry and its function type.
pub use verification::{VerificationRegistry, VerifyFn};

/// Re-exports candidate selection and context scoring.
pub use context::{CandidateSelector, ContextHint, ContextScorer, SelectionStrategy};

/// Re-exports the scan pipeline.
pub use engine::{Engine, ScanRequest};

/// Re-exports redaction rendering and token-map reversal.
pub use redact::{detokenize, detokenize_with_prefix, RedactionEngine, TokenMap};

/// Re-exports the fake-value generator seam.
pub use fake::{DefaultFakeValues, FakeValues};

/// Re-exports bounded concurrent scanning.
pub use batch::BatchScanner;
