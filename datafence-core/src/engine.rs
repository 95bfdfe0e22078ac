// datafence-core/src/engine.rs
//! The detection pipeline: candidate selection, matching, overlap
//! resolution, verification, and context scoring.
//!
//! An [`Engine`] is bound to one immutable [`PatternSnapshot`] for its whole
//! lifetime. Scanning is stateless and side-effect-free per call, so one
//! engine is safely shared across unboundedly many concurrent scans; swap in
//! a fresh engine after a snapshot reload to pick up new patterns.
//!
//! License: MIT OR APACHE 2.0

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::{CandidateSelector, ContextHint, ContextScorer};
use crate::errors::DetectError;
use crate::models::{FindResult, Match, ValidationResult};
use crate::overlap::{resolve, RawMatch};
use crate::store::{PatternDefinition, PatternSnapshot};

/// Base confidence for a match whose verification function passed.
const CONFIDENCE_VERIFIED: f64 = 1.0;
/// Base confidence for a regex-only match (no verification declared).
const CONFIDENCE_REGEX_ONLY: f64 = 0.5;

/// Parameters for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanRequest {
    /// Namespaces to search; `None` searches every loaded namespace.
    pub namespaces: Option<Vec<String>>,
    /// Optional hint narrowing the candidate pattern set.
    pub context: Option<ContextHint>,
    /// Pass overlapping matches through instead of resolving them.
    pub allow_overlaps: bool,
    /// Return after the first finalized match, iterating patterns in
    /// priority order so the result is deterministic across runs.
    pub stop_on_first_match: bool,
    /// Include matched plaintext in results where pattern policy permits.
    pub include_matched_text: bool,
}

impl ScanRequest {
    pub fn in_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespaces: Some(namespaces.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, hint: ContextHint) -> Self {
        self.context = Some(hint);
        self
    }
}

/// Core engine for detection and validation against one pattern snapshot.
#[derive(Debug)]
pub struct Engine {
    snapshot: Arc<PatternSnapshot>,
    scorer: ContextScorer,
}

impl Engine {
    /// Creates an engine with the bundled anchor tables for context scoring.
    pub fn new(snapshot: Arc<PatternSnapshot>) -> Self {
        Self::with_scorer(snapshot, ContextScorer::default())
    }

    pub fn with_scorer(snapshot: Arc<PatternSnapshot>, scorer: ContextScorer) -> Self {
        Self { snapshot, scorer }
    }

    /// The snapshot this engine scans against.
    pub fn snapshot(&self) -> &Arc<PatternSnapshot> {
        &self.snapshot
    }

    /// Finds finalized matches in `text`.
    ///
    /// Pipeline: candidate selection, regex matching, overlap resolution,
    /// verification, context scoring. Resolved spans never overlap unless
    /// `allow_overlaps` is set, and a match survives only if its declared
    /// verification function (if any) accepts the matched substring.
    /// Matches come back ordered by start ascending, then priority ascending
    /// where starts coincide.
    pub fn find(&self, text: &str, request: &ScanRequest) -> FindResult {
        let namespaces_searched: Vec<String> = match &request.namespaces {
            Some(list) => list.clone(),
            None => self
                .snapshot
                .namespaces()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let candidates = CandidateSelector::select(
            &self.snapshot,
            &namespaces_searched,
            request.context.as_ref(),
        );
        debug!(
            "Scanning {} bytes against {} candidate patterns",
            text.len(),
            candidates.len()
        );

        let mut matches = if request.stop_on_first_match {
            self.first_finalized_match(text, &candidates, request.include_matched_text)
                .into_iter()
                .collect()
        } else {
            let raw = collect_raw_matches(text, &candidates);
            let resolved = resolve(raw, request.allow_overlaps);
            resolved
                .into_iter()
                .filter(|m| m.definition.run_verify(&text[m.start..m.end]))
                .map(|m| build_match(text, &m, request.include_matched_text))
                .collect::<Vec<Match>>()
        };

        self.scorer.score(text, &mut matches);
        // Ordering carries through from `resolve`: start ascending, then
        // priority ascending within a start. Verification filtering and
        // scoring never reorder.

        FindResult {
            matches,
            namespaces_searched,
        }
    }

    /// First match that also passes verification, scanning candidates in
    /// priority-ascending order. Verification runs inline here so "first
    /// match found" always means first *finalized* match.
    fn first_finalized_match(
        &self,
        text: &str,
        candidates: &[Arc<PatternDefinition>],
        include_matched_text: bool,
    ) -> Option<Match> {
        for definition in candidates {
            for found in definition.regex.find_iter(text) {
                if definition.run_verify(found.as_str()) {
                    let raw = RawMatch {
                        definition: Arc::clone(definition),
                        start: found.start(),
                        end: found.end(),
                    };
                    return Some(build_match(text, &raw, include_matched_text));
                }
            }
        }
        None
    }

    /// Validates `text` as a whole against one pattern.
    ///
    /// The regex must match the entire string and the verification function
    /// (if any) must accept it. Fails with `UnknownPattern` for a
    /// nonexistent `(namespace, id)` key.
    pub fn validate(&self, text: &str, ns_id: &str) -> Result<ValidationResult, DetectError> {
        let definition = self
            .snapshot
            .get(ns_id)
            .ok_or_else(|| DetectError::UnknownPattern(ns_id.to_string()))?;

        let is_valid = definition.matches_exactly(text);
        let matched = is_valid.then(|| {
            let raw = RawMatch {
                definition: Arc::clone(definition),
                start: 0,
                end: text.len(),
            };
            build_match(text, &raw, definition.policy.store_raw)
        });

        Ok(ValidationResult {
            ns_id: ns_id.to_string(),
            is_valid,
            matched,
        })
    }
}

/// Applies every candidate pattern's regex to `text`, yielding all raw
/// matches with no cross-pattern ordering guarantee.
fn collect_raw_matches(text: &str, candidates: &[Arc<PatternDefinition>]) -> Vec<RawMatch> {
    let mut raw = Vec::new();
    for definition in candidates {
        for found in definition.regex.find_iter(text) {
            raw.push(RawMatch {
                definition: Arc::clone(definition),
                start: found.start(),
                end: found.end(),
            });
        }
    }
    raw
}

fn build_match(text: &str, raw: &RawMatch, include_matched_text: bool) -> Match {
    let definition = &raw.definition;
    let matched_text = (include_matched_text && definition.policy.store_raw)
        .then(|| text[raw.start..raw.end].to_string());
    let base = if definition.verification.is_some() {
        CONFIDENCE_VERIFIED
    } else {
        CONFIDENCE_REGEX_ONLY
    };

    Match {
        ns_id: definition.ns_id.clone(),
        pattern_id: definition.id.clone(),
        namespace: definition.namespace.clone(),
        category: definition.category,
        start: raw.start,
        end: raw.end,
        matched_text,
        mask: definition.mask.clone(),
        severity: definition.policy.severity,
        action_on_match: definition.policy.action_on_match,
        confidence: base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SelectionStrategy;
    use crate::models::{Category, PatternDocument};
    use crate::store::{LoadOptions, PatternSnapshot};
    use crate::verification::VerificationRegistry;

    fn engine_from(yaml: &str) -> Engine {
        let document: PatternDocument = serde_yml::from_str(yaml).unwrap();
        let snapshot = PatternSnapshot::build(
            vec![document],
            &VerificationRegistry::with_builtins(),
            &LoadOptions::default(),
        )
        .unwrap();
        Engine::with_scorer(Arc::new(snapshot), ContextScorer::disabled())
    }

    const CORPUS: &str = r#"
namespace: us
patterns:
  - id: ssn_01
    category: ssn
    pattern: "\\b\\d{3}-\\d{2}-\\d{4}\\b"
    verification: ssn
    keywords: [ssn]
    policy: { store_raw: true, severity: high }
  - id: phone_01
    category: phone
    pattern: "\\b\\d{3}-\\d{3}-\\d{4}\\b"
    keywords: [phone]
"#;

    #[test]
    fn finds_and_verifies_ssn() {
        let engine = engine_from(CORPUS);
        let result = engine.find("SSN is 123-45-6789 ok", &ScanRequest::default());
        assert_eq!(result.match_count(), 1);
        let m = &result.matches[0];
        assert_eq!(m.ns_id, "us/ssn_01");
        assert_eq!(m.category, Category::Ssn);
        assert_eq!(&"SSN is 123-45-6789 ok"[m.start..m.end], "123-45-6789");
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn verification_gates_finalization() {
        let engine = engine_from(CORPUS);
        // Area 900-999 is never issued: regex matches, verification rejects.
        let result = engine.find("SSN is 912-45-6789", &ScanRequest::default());
        assert_eq!(result.match_count(), 0);
    }

    #[test]
    fn matched_text_requires_request_and_policy() {
        let engine = engine_from(CORPUS);
        let text = "call 555-123-4567 or ssn 123-45-6789";
        let gated = engine.find(text, &ScanRequest::default());
        assert!(gated.matches.iter().all(|m| m.matched_text.is_none()));

        let request = ScanRequest {
            include_matched_text: true,
            ..Default::default()
        };
        let result = engine.find(text, &request);
        for m in &result.matches {
            match m.ns_id.as_str() {
                // store_raw: true
                "us/ssn_01" => assert_eq!(m.matched_text.as_deref(), Some("123-45-6789")),
                // store_raw defaults to false
                "us/phone_01" => assert_eq!(m.matched_text, None),
                other => panic!("unexpected match {other}"),
            }
        }
    }

    #[test]
    fn stop_on_first_match_returns_highest_priority_hit() {
        let engine = engine_from(
            r#"
namespace: t
patterns:
  - id: low
    category: other
    pattern: "b+"
    priority: 150
  - id: high
    category: other
    pattern: "a+"
    priority: 50
"#,
        );
        let request = ScanRequest {
            stop_on_first_match: true,
            ..Default::default()
        };
        // "b" occurs first in the text, but t/high is checked first.
        let result = engine.find("bbb aaa", &request);
        assert_eq!(result.match_count(), 1);
        assert_eq!(result.matches[0].ns_id, "t/high");
    }

    #[test]
    fn stop_on_first_match_skips_unverified_hits() {
        let engine = engine_from(CORPUS);
        let request = ScanRequest {
            stop_on_first_match: true,
            ..Default::default()
        };
        let result = engine.find("912-45-6789 then 123-45-6789", &request);
        assert_eq!(result.match_count(), 1);
        assert_eq!(result.matches[0].start, 17);
    }

    #[test]
    fn stop_on_first_match_honors_matched_text_request() {
        let engine = engine_from(CORPUS);
        let request = ScanRequest {
            stop_on_first_match: true,
            include_matched_text: true,
            ..Default::default()
        };
        // store_raw: true on us/ssn_01, so the requested plaintext surfaces.
        let result = engine.find("ssn 123-45-6789", &request);
        assert_eq!(result.match_count(), 1);
        assert_eq!(result.matches[0].matched_text.as_deref(), Some("123-45-6789"));

        // Policy still gates it: us/phone_01 keeps store_raw false.
        let result = engine.find("call 555-123-4567", &request);
        assert_eq!(result.match_count(), 1);
        assert_eq!(result.matches[0].ns_id, "us/phone_01");
        assert_eq!(result.matches[0].matched_text, None);
    }

    #[test]
    fn allow_overlaps_orders_by_start_then_priority() {
        let engine = engine_from(
            r#"
namespace: t
patterns:
  - id: short_low
    category: other
    pattern: "a"
    priority: 150
  - id: long_high
    category: other
    pattern: "ab+"
    priority: 50
"#,
        );
        let request = ScanRequest {
            allow_overlaps: true,
            ..Default::default()
        };
        // Both matches start at 0; the higher-priority (lower number)
        // pattern leads even though its span ends later.
        let result = engine.find("abb", &request);
        let ids: Vec<&str> = result.matches.iter().map(|m| m.ns_id.as_str()).collect();
        assert_eq!(ids, vec!["t/long_high", "t/short_low"]);
    }

    #[test]
    fn strict_hint_with_no_matching_patterns_yields_nothing() {
        let engine = engine_from(
            r#"
namespace: comm
patterns:
  - id: email_01
    category: email
    pattern: "[a-z0-9._]+@[a-z0-9.-]+"
    keywords: [email]
"#,
        );
        let hint = ContextHint {
            keywords: vec!["ssn".into()],
            strategy: SelectionStrategy::Strict,
            ..Default::default()
        };
        let result = engine.find(
            "123-45-6789 and a@b.com",
            &ScanRequest::default().with_context(hint),
        );
        assert_eq!(result.match_count(), 0);
    }

    #[test]
    fn validate_requires_whole_string_and_known_pattern() {
        let engine = engine_from(CORPUS);
        assert!(engine.validate("123-45-6789", "us/ssn_01").unwrap().is_valid);
        assert!(!engine.validate("x 123-45-6789", "us/ssn_01").unwrap().is_valid);
        assert!(!engine.validate("912-45-6789", "us/ssn_01").unwrap().is_valid);

        let err = engine.validate("123-45-6789", "us/nope").unwrap_err();
        assert!(matches!(err, DetectError::UnknownPattern(_)));
    }

    #[test]
    fn namespace_filter_limits_search_and_is_reported() {
        let engine = engine_from(CORPUS);
        let result = engine.find(
            "123-45-6789",
            &ScanRequest::in_namespaces(["kr"]),
        );
        assert_eq!(result.match_count(), 0);
        assert_eq!(result.namespaces_searched, vec!["kr".to_string()]);
    }
}
