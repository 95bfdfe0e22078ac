// datafence-core/tests/store_tests.rs
//! Corpus loading scenarios: bundled-corpus integrity, directory loads with
//! `tempfile`, atomic hot reload, and load-time failure modes.

use std::sync::Arc;

use datafence_core::{
    DetectError, Engine, LoadOptions, PatternSnapshot, PatternStore, ScanRequest,
    VerificationRegistry,
};

const VALID_DOC: &str = r#"
namespace: t
patterns:
  - id: ssn_01
    category: ssn
    pattern: "\\b\\d{3}-\\d{2}-\\d{4}\\b"
    verification: ssn
"#;

#[test]
fn bundled_corpus_passes_its_own_example_validation() {
    let registry = VerificationRegistry::with_builtins();
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/config/patterns");
    let snapshot = PatternSnapshot::from_dir(
        dir,
        &registry,
        &LoadOptions {
            validate_examples: true,
        },
    )
    .expect("bundled corpus validates");
    assert_eq!(snapshot.namespaces(), vec!["comm", "us"]);
    assert_eq!(snapshot.len(), 10);

    // And the embedded copy is the same corpus.
    let embedded = PatternSnapshot::load_defaults(&registry).unwrap();
    assert_eq!(embedded.len(), snapshot.len());
}

#[test]
fn directory_load_is_atomic_across_files() -> anyhow::Result<()> {
    let registry = VerificationRegistry::with_builtins();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.yml"), VALID_DOC)?;
    std::fs::write(dir.path().join("b.yml"), "patterns: [not-a-document")?;

    let err = PatternSnapshot::from_dir(dir.path(), &registry, &LoadOptions::default())
        .unwrap_err();
    match err {
        DetectError::MalformedSource { source_id, .. } => {
            assert!(source_id.ends_with("b.yml"), "got source_id {source_id}");
        }
        other => panic!("expected MalformedSource, got {other:?}"),
    }
    Ok(())
}

#[test]
fn duplicate_ids_across_files_fail_the_load() -> anyhow::Result<()> {
    let registry = VerificationRegistry::with_builtins();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.yml"), VALID_DOC)?;
    std::fs::write(dir.path().join("b.yml"), VALID_DOC)?;

    let err = PatternSnapshot::from_dir(dir.path(), &registry, &LoadOptions::default())
        .unwrap_err();
    assert!(matches!(err, DetectError::DuplicatePattern(id) if id == "t/ssn_01"));
    Ok(())
}

#[test]
fn unknown_verification_name_fails_the_load() {
    let registry = VerificationRegistry::with_builtins();
    let yaml = VALID_DOC.replace("verification: ssn", "verification: nonexistent");
    let err = PatternSnapshot::from_yaml_sources(
        &[("inline.yml", yaml.as_str())],
        &registry,
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DetectError::UnknownVerification { ref function, .. } if function == "nonexistent"
    ));
}

#[test]
fn reload_publishes_atomically_without_disturbing_readers() -> anyhow::Result<()> {
    let registry = VerificationRegistry::with_builtins();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.yml"), VALID_DOC)?;

    let store = PatternStore::new(PatternSnapshot::from_dir(
        dir.path(),
        &registry,
        &LoadOptions::default(),
    )?);
    let before = store.snapshot();
    let old_version = before.version();

    // A reader bound to the old snapshot keeps scanning it untouched.
    let engine = Engine::new(Arc::clone(&before));

    std::fs::write(
        dir.path().join("b.yml"),
        r#"
namespace: t2
patterns:
  - id: phone_01
    category: phone
    pattern: "\\b\\d{3}-\\d{3}-\\d{4}\\b"
"#,
    )?;
    let new_version = store.reload_from_dir(dir.path(), &registry, &LoadOptions::default())?;
    assert_ne!(new_version, old_version);

    assert_eq!(before.len(), 1);
    assert_eq!(store.snapshot().len(), 2);
    assert_eq!(store.snapshot().version(), new_version);

    // The old engine still sees only the old corpus.
    let result = engine.find("call 555-867-5309", &ScanRequest::default());
    assert_eq!(result.match_count(), 0);
    let fresh = Engine::new(store.snapshot());
    let result = fresh.find("call 555-867-5309", &ScanRequest::default());
    assert_eq!(result.match_count(), 1);
    Ok(())
}

#[test]
fn failed_reload_keeps_previous_snapshot_active() -> anyhow::Result<()> {
    let registry = VerificationRegistry::with_builtins();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.yml"), VALID_DOC)?;

    let store = PatternStore::new(PatternSnapshot::from_dir(
        dir.path(),
        &registry,
        &LoadOptions::default(),
    )?);
    let old_version = store.snapshot().version();

    std::fs::write(dir.path().join("b.yml"), "namespace: [broken")?;
    let err = store.reload_from_dir(dir.path(), &registry, &LoadOptions::default());
    assert!(err.is_err());
    assert_eq!(store.snapshot().version(), old_version);
    assert_eq!(store.snapshot().len(), 1);
    Ok(())
}
