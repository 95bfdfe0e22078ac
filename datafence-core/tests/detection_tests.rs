// datafence-core/tests/detection_tests.rs
//! End-to-end detection scenarios: bundled corpus scans, verification
//! gating, overlap resolution, candidate narrowing, and context scoring.

use std::sync::Arc;

use datafence_core::{
    ContextHint, ContextScorer, Engine, LoadOptions, PatternSnapshot, ScanRequest,
    SelectionStrategy, VerificationRegistry,
};
use test_log::test; // For integrating with `env_logger` in tests

fn engine_from(yaml: &str) -> Engine {
    let snapshot = PatternSnapshot::from_yaml_sources(
        &[("inline.yml", yaml)],
        &VerificationRegistry::with_builtins(),
        &LoadOptions::default(),
    )
    .expect("inline corpus loads");
    Engine::with_scorer(Arc::new(snapshot), ContextScorer::disabled())
}

fn default_engine() -> Engine {
    let snapshot = PatternSnapshot::load_defaults(&VerificationRegistry::with_builtins())
        .expect("bundled corpus loads");
    Engine::new(Arc::new(snapshot))
}

#[test]
fn bundled_corpus_detects_common_identifiers() {
    let engine = default_engine();
    let text = "card 4532015112830366, email user@example.com, ssn 123-45-6789";
    let result = engine.find(text, &ScanRequest::default());

    let ids: Vec<&str> = result.matches.iter().map(|m| m.ns_id.as_str()).collect();
    assert_eq!(ids, vec!["comm/card_01", "comm/email_01", "us/ssn_01"]);

    for m in &result.matches {
        match m.ns_id.as_str() {
            // Verified matches start at full confidence.
            "comm/card_01" | "us/ssn_01" => assert_eq!(m.confidence, 1.0),
            // Regex-only, but the "email" anchor sits right next to it.
            "comm/email_01" => assert!((m.confidence - 0.95).abs() < 1e-9),
            other => panic!("unexpected match {other}"),
        }
        // Plaintext was not requested.
        assert!(m.matched_text.is_none());
    }
}

#[test]
fn luhn_gates_card_detection() {
    let engine = default_engine();
    let valid = engine.find("card 4532015112830366", &ScanRequest::default());
    assert_eq!(valid.match_count(), 1);
    assert_eq!(valid.matches[0].ns_id, "comm/card_01");

    // Same shape, Luhn check digit off by one.
    let invalid = engine.find("card 4532015112830367", &ScanRequest::default());
    assert_eq!(invalid.match_count(), 0);
}

#[test]
fn priority_breaks_identical_span_ties() {
    // Both patterns produce the identical span; the lower priority value
    // wins regardless of declaration order.
    let engine = engine_from(
        r#"
namespace: t
patterns:
  - id: generic
    category: other
    pattern: "\\b\\d{3}-\\d{2}-\\d{4}\\b"
    priority: 150
  - id: specific
    category: other
    pattern: "\\b\\d{3}-\\d{2}-\\d{4}\\b"
    priority: 50
"#,
    );
    let result = engine.find("id 123-45-6789", &ScanRequest::default());
    assert_eq!(result.match_count(), 1);
    assert_eq!(result.matches[0].ns_id, "t/specific");
}

#[test]
fn resolved_matches_never_overlap() {
    let engine = engine_from(
        r#"
namespace: t
patterns:
  - id: tagged
    category: other
    pattern: "[a-z]+-\\d+"
  - id: digits
    category: other
    pattern: "\\d+"
"#,
    );
    let text = "abc-123 and 456";
    let result = engine.find(text, &ScanRequest::default());
    // "abc-123" swallows the overlapping "123"; "456" survives alone.
    assert_eq!(result.match_count(), 2);
    assert_eq!(result.matches[0].ns_id, "t/tagged");
    assert_eq!(result.matches[1].ns_id, "t/digits");
    for pair in result.matches.windows(2) {
        assert!(pair[0].end <= pair[1].start);
    }

    let request = ScanRequest {
        allow_overlaps: true,
        ..Default::default()
    };
    let overlapping = engine.find(text, &request);
    assert_eq!(overlapping.match_count(), 3);
}

#[test]
fn strict_hint_restricts_candidates() {
    let engine = default_engine();
    let text = "user@example.com and 123-45-6789";

    let strict = ContextHint {
        keywords: vec!["ssn".into()],
        strategy: SelectionStrategy::Strict,
        ..Default::default()
    };
    let result = engine.find(text, &ScanRequest::default().with_context(strict));
    assert_eq!(result.match_count(), 1);
    assert_eq!(result.matches[0].ns_id, "us/ssn_01");

    // Strict with a keyword no pattern declares selects nothing at all.
    let unknown = ContextHint {
        keywords: vec!["frobnicator".into()],
        strategy: SelectionStrategy::Strict,
        ..Default::default()
    };
    let result = engine.find(text, &ScanRequest::default().with_context(unknown));
    assert_eq!(result.match_count(), 0);
}

#[test]
fn loose_hint_falls_back_to_full_set() {
    let engine = default_engine();
    let text = "user@example.com and 123-45-6789";
    let hint = ContextHint {
        keywords: vec!["frobnicator".into()],
        strategy: SelectionStrategy::Loose,
        ..Default::default()
    };
    let result = engine.find(text, &ScanRequest::default().with_context(hint));
    let ids: Vec<&str> = result.matches.iter().map(|m| m.ns_id.as_str()).collect();
    assert_eq!(ids, vec!["comm/email_01", "us/ssn_01"]);
}

#[test]
fn field_name_hint_selects_matching_patterns() {
    let engine = default_engine();
    let hint = ContextHint::from_field_name("user_ssn", SelectionStrategy::Strict);
    let result = engine.find(
        "user@example.com 123-45-6789",
        &ScanRequest::default().with_context(hint),
    );
    assert_eq!(result.match_count(), 1);
    assert_eq!(result.matches[0].ns_id, "us/ssn_01");
}

#[test]
fn anchor_proximity_boosts_unverified_matches() {
    let engine = default_engine();

    // Anchor word directly before the match.
    let near = engine.find("phone: 555-867-5309", &ScanRequest::default());
    assert_eq!(near.match_count(), 1);
    assert!((near.matches[0].confidence - 0.95).abs() < 1e-9);

    // No anchor anywhere in the window.
    let far = engine.find("value 555-867-5309", &ScanRequest::default());
    assert_eq!(far.match_count(), 1);
    assert!((far.matches[0].confidence - 0.5).abs() < 1e-9);
}

#[test]
fn namespace_scope_is_honored_and_reported() {
    let engine = default_engine();
    let text = "user@example.com and 123-45-6789";
    let result = engine.find(text, &ScanRequest::in_namespaces(["us"]));
    assert_eq!(result.match_count(), 1);
    assert_eq!(result.matches[0].namespace, "us");
    assert_eq!(result.namespaces_searched, vec!["us".to_string()]);
}

#[test]
fn validate_checks_whole_string_with_verification() {
    let engine = default_engine();
    assert!(engine.validate("123-45-6789", "us/ssn_01").unwrap().is_valid);
    assert!(!engine
        .validate("ssn: 123-45-6789", "us/ssn_01")
        .unwrap()
        .is_valid);
    // Regex shape is right, area 666 is never issued.
    assert!(!engine.validate("666-45-6789", "us/ssn_01").unwrap().is_valid);
}
