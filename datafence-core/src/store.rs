//! store.rs - Immutable, indexed pattern snapshots and the store that
//! publishes them.
//!
//! A [`PatternSnapshot`] is built from one or more YAML source documents,
//! compiling every regex and resolving every verification-function reference
//! up front. Loading is atomic: either the whole source set validates and
//! becomes a snapshot, or nothing does. Once built, a snapshot is read-only
//! and safely shared across any number of concurrent scans; the
//! [`PatternStore`] handle swaps the active snapshot pointer atomically on
//! reload, so in-flight scans keep the snapshot they started with.
//!
//! License: MIT OR APACHE 2.0

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, info};
use regex::RegexBuilder;
use uuid::Uuid;

use crate::errors::DetectError;
use crate::models::{
    Category, Examples, PatternDocument, PatternEntry, PatternFlag, Policy,
};
use crate::verification::{run_verification, VerificationRegistry, VerifyFn};

/// Maximum allowed length for a regex pattern string.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Size limit for a single compiled regex (10 MB).
const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Options controlling snapshot construction.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// When set, every `match` example on a pattern must finalize against it
    /// (regex plus verification) and every `nomatch` example must not; a
    /// violation fails the whole load.
    pub validate_examples: bool,
}

/// A single compiled pattern definition. Immutable once loaded.
pub struct PatternDefinition {
    pub id: String,
    pub namespace: String,
    /// Precomputed `namespace/id` key, unique within a snapshot.
    pub ns_id: String,
    pub category: Category,
    pub description: String,
    pub regex: regex::Regex,
    pub flags: Vec<PatternFlag>,
    pub mask: Option<String>,
    /// Name of the bound verification function, if any.
    pub verification: Option<String>,
    pub(crate) verify: Option<VerifyFn>,
    pub examples: Option<Examples>,
    pub policy: Policy,
    /// Normalized keyword hints feeding the candidate-selection index.
    pub keywords: Vec<String>,
    /// Lower sorts first and wins overlap tie-breaks.
    pub priority: i32,
    pub metadata: std::collections::BTreeMap<String, serde_json::Value>,
    /// Stable load order, the final tie-break everywhere.
    pub(crate) order: usize,
}

impl std::fmt::Debug for PatternDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternDefinition")
            .field("ns_id", &self.ns_id)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("verification", &self.verification)
            .finish_non_exhaustive()
    }
}

impl PatternDefinition {
    /// True when `text` as a whole matches the regex *and* passes the bound
    /// verification function, if one is declared. This is the finalization
    /// rule used by `validate` and by load-time example checking.
    pub fn matches_exactly(&self, text: &str) -> bool {
        let whole = self
            .regex
            .find(text)
            .is_some_and(|m| m.start() == 0 && m.end() == text.len());
        whole && self.run_verify(text)
    }

    /// Runs the bound verification function on a matched substring; patterns
    /// without one accept on regex alone.
    pub(crate) fn run_verify(&self, value: &str) -> bool {
        match (&self.verification, &self.verify) {
            (Some(name), Some(func)) => run_verification(name, func, value),
            _ => true,
        }
    }
}

/// A versioned, read-only collection of compiled patterns plus the inverted
/// indices used for candidate selection.
///
/// Index slices are ordered by priority ascending, then stable load order.
pub struct PatternSnapshot {
    version: Uuid,
    loaded_at: DateTime<Utc>,
    patterns: Vec<Arc<PatternDefinition>>,
    by_ns_id: HashMap<String, Arc<PatternDefinition>>,
    by_namespace: HashMap<String, Vec<Arc<PatternDefinition>>>,
    by_category: HashMap<Category, Vec<Arc<PatternDefinition>>>,
    by_keyword: HashMap<String, Vec<Arc<PatternDefinition>>>,
}

impl std::fmt::Debug for PatternSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternSnapshot")
            .field("version", &self.version)
            .field("loaded_at", &self.loaded_at)
            .field("patterns", &self.patterns.len())
            .field("namespaces", &self.by_namespace.len())
            .finish()
    }
}

impl PatternSnapshot {
    /// Builds a snapshot from already-parsed documents.
    ///
    /// Every entry is validated (non-empty id, namespace and pattern), every
    /// regex compiled, and every verification reference resolved against
    /// `registry`. Duplicate `(namespace, id)` keys are an error, not a
    /// silent overwrite. Any failure aborts the whole build.
    pub fn build(
        documents: Vec<PatternDocument>,
        registry: &VerificationRegistry,
        options: &LoadOptions,
    ) -> Result<Self, DetectError> {
        let mut patterns: Vec<Arc<PatternDefinition>> = Vec::new();
        let mut by_ns_id: HashMap<String, Arc<PatternDefinition>> = HashMap::new();

        for document in documents {
            if document.namespace.trim().is_empty() {
                return Err(DetectError::MalformedSource {
                    source_id: "<document>".to_string(),
                    message: "document has an empty `namespace` field".to_string(),
                });
            }
            for entry in document.patterns {
                let order = patterns.len();
                let definition =
                    compile_entry(&document.namespace, entry, registry, order)?;

                if options.validate_examples {
                    check_examples(&definition)?;
                }

                let definition = Arc::new(definition);
                if by_ns_id
                    .insert(definition.ns_id.clone(), Arc::clone(&definition))
                    .is_some()
                {
                    return Err(DetectError::DuplicatePattern(definition.ns_id.clone()));
                }
                patterns.push(definition);
            }
        }

        let mut snapshot = Self {
            version: Uuid::new_v4(),
            loaded_at: Utc::now(),
            patterns,
            by_ns_id,
            by_namespace: HashMap::new(),
            by_category: HashMap::new(),
            by_keyword: HashMap::new(),
        };
        snapshot.build_indices();

        info!(
            "Built pattern snapshot {} with {} patterns across {} namespaces",
            snapshot.version,
            snapshot.patterns.len(),
            snapshot.by_namespace.len()
        );
        Ok(snapshot)
    }

    /// Parses one or more YAML documents and builds a snapshot from them.
    /// `source_id` is used in error messages only.
    pub fn from_yaml_sources<S: AsRef<str>>(
        sources: &[(S, S)],
        registry: &VerificationRegistry,
        options: &LoadOptions,
    ) -> Result<Self, DetectError> {
        let mut documents = Vec::with_capacity(sources.len());
        for (source_id, text) in sources {
            documents.push(parse_document(source_id.as_ref(), text.as_ref())?);
        }
        Self::build(documents, registry, options)
    }

    /// Builds a snapshot from the pattern corpus bundled with the crate.
    pub fn load_defaults(registry: &VerificationRegistry) -> Result<Self, DetectError> {
        debug!("Loading bundled default pattern corpus");
        Self::from_yaml_sources(
            &[
                ("config/patterns/common.yml", include_str!("../config/patterns/common.yml")),
                ("config/patterns/us.yml", include_str!("../config/patterns/us.yml")),
            ],
            registry,
            &LoadOptions::default(),
        )
    }

    /// Loads every `.yml`/`.yaml` file under `dir` as one atomic unit, in
    /// sorted filename order. One malformed document fails the whole load.
    pub fn from_dir<P: AsRef<Path>>(
        dir: P,
        registry: &VerificationRegistry,
        options: &LoadOptions,
    ) -> Result<Self, DetectError> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        paths.sort();

        debug!("Loading {} pattern documents from {}", paths.len(), dir.display());
        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            let text = std::fs::read_to_string(path)?;
            documents.push(parse_document(&path.display().to_string(), &text)?);
        }
        Self::build(documents, registry, options)
    }

    fn build_indices(&mut self) {
        for definition in &self.patterns {
            self.by_namespace
                .entry(definition.namespace.clone())
                .or_default()
                .push(Arc::clone(definition));
            self.by_category
                .entry(definition.category)
                .or_default()
                .push(Arc::clone(definition));
            for keyword in &definition.keywords {
                self.by_keyword
                    .entry(keyword.clone())
                    .or_default()
                    .push(Arc::clone(definition));
            }
        }
        for slice in self
            .by_namespace
            .values_mut()
            .chain(self.by_category.values_mut())
            .chain(self.by_keyword.values_mut())
        {
            slice.sort_by_key(|d| (d.priority, d.order));
        }
    }

    /// Unique version of this snapshot.
    pub fn version(&self) -> Uuid {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// All patterns in stable load order.
    pub fn patterns(&self) -> &[Arc<PatternDefinition>] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// All namespaces present, sorted.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_namespace.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks up one pattern by its full `namespace/id` key.
    pub fn get(&self, ns_id: &str) -> Option<&Arc<PatternDefinition>> {
        self.by_ns_id.get(ns_id)
    }

    /// Precomputed index slice, priority-ascending then load order.
    pub fn patterns_in_namespace(&self, namespace: &str) -> &[Arc<PatternDefinition>] {
        self.by_namespace
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Precomputed index slice, priority-ascending then load order.
    pub fn patterns_in_category(&self, category: Category) -> &[Arc<PatternDefinition>] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Precomputed index slice for a normalized keyword hint.
    pub fn patterns_for_keyword(&self, keyword: &str) -> &[Arc<PatternDefinition>] {
        self.by_keyword
            .get(&normalize_keyword(keyword))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Handle owning the active snapshot pointer.
///
/// Readers take a cheap `Arc` clone and are never blocked by a reload;
/// [`PatternStore::publish`] swaps the pointer atomically after the new
/// snapshot has been fully built, so there are no torn reads and a failed
/// load leaves the previous snapshot untouched.
#[derive(Debug)]
pub struct PatternStore {
    active: RwLock<Arc<PatternSnapshot>>,
}

impl PatternStore {
    pub fn new(snapshot: PatternSnapshot) -> Self {
        Self {
            active: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The currently active snapshot. In-flight scans holding an earlier
    /// `Arc` keep running against it after a reload.
    pub fn snapshot(&self) -> Arc<PatternSnapshot> {
        Arc::clone(&self.active.read().expect("pattern store lock poisoned"))
    }

    /// Atomically replaces the active snapshot.
    pub fn publish(&self, snapshot: PatternSnapshot) {
        let snapshot = Arc::new(snapshot);
        let mut active = self.active.write().expect("pattern store lock poisoned");
        debug!(
            "Swapping active pattern snapshot {} -> {}",
            active.version(),
            snapshot.version()
        );
        *active = snapshot;
    }

    /// Rebuilds from a directory and publishes on success; on failure the
    /// previously active snapshot remains untouched.
    pub fn reload_from_dir<P: AsRef<Path>>(
        &self,
        dir: P,
        registry: &VerificationRegistry,
        options: &LoadOptions,
    ) -> Result<Uuid, DetectError> {
        let snapshot = PatternSnapshot::from_dir(dir, registry, options)?;
        let version = snapshot.version();
        self.publish(snapshot);
        Ok(version)
    }
}

/// Normalizes a keyword for index lookup: lowercase, separators to spaces.
pub(crate) fn normalize_keyword(keyword: &str) -> String {
    keyword
        .to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_document(source_id: &str, text: &str) -> Result<PatternDocument, DetectError> {
    serde_yml::from_str(text).map_err(|e| DetectError::MalformedSource {
        source_id: source_id.to_string(),
        message: e.to_string(),
    })
}

fn compile_entry(
    namespace: &str,
    entry: PatternEntry,
    registry: &VerificationRegistry,
    order: usize,
) -> Result<PatternDefinition, DetectError> {
    let ns_id = format!("{}/{}", namespace, entry.id);

    if entry.id.trim().is_empty() {
        return Err(DetectError::MalformedSource {
            source_id: namespace.to_string(),
            message: "a pattern entry has an empty `id` field".to_string(),
        });
    }
    if entry.pattern.trim().is_empty() {
        return Err(DetectError::MalformedSource {
            source_id: ns_id,
            message: "pattern entry has an empty `pattern` field".to_string(),
        });
    }
    if entry.pattern.len() > MAX_PATTERN_LENGTH {
        return Err(DetectError::MalformedSource {
            source_id: ns_id,
            message: format!(
                "pattern length {} exceeds maximum allowed {}",
                entry.pattern.len(),
                MAX_PATTERN_LENGTH
            ),
        });
    }

    let mut builder = RegexBuilder::new(&entry.pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in &entry.flags {
        match flag {
            PatternFlag::CaseInsensitive => builder.case_insensitive(true),
            PatternFlag::Multiline => builder.multi_line(true),
            PatternFlag::DotAll => builder.dot_matches_new_line(true),
            PatternFlag::Unicode => builder.unicode(true),
            PatternFlag::Verbose => builder.ignore_whitespace(true),
        };
    }
    let regex = builder
        .build()
        .map_err(|e| DetectError::PatternCompile(ns_id.clone(), e))?;

    // Verification references resolve to bound functions at load time;
    // unknown names fail the load instead of degrading silently.
    let verify = match &entry.verification {
        Some(name) => Some(registry.get(name).ok_or_else(|| {
            DetectError::UnknownVerification {
                pattern: ns_id.clone(),
                function: name.clone(),
            }
        })?),
        None => None,
    };

    debug!("Compiled pattern '{}' (priority {})", ns_id, entry.priority);
    Ok(PatternDefinition {
        id: entry.id,
        namespace: namespace.to_string(),
        ns_id,
        category: entry.category,
        description: entry.description,
        regex,
        flags: entry.flags,
        mask: entry.mask,
        verification: entry.verification,
        verify,
        examples: entry.examples,
        policy: entry.policy,
        keywords: entry.keywords.iter().map(|k| normalize_keyword(k)).collect(),
        priority: entry.priority,
        metadata: entry.metadata,
        order,
    })
}

fn check_examples(definition: &PatternDefinition) -> Result<(), DetectError> {
    let Some(examples) = &definition.examples else {
        return Ok(());
    };
    for example in &examples.matching {
        if !definition.matches_exactly(example) {
            return Err(DetectError::ExampleValidation {
                pattern: definition.ns_id.clone(),
                kind: "match",
                example: example.clone(),
                problem: "does not finalize against the pattern",
            });
        }
    }
    for example in &examples.nomatch {
        if definition.matches_exactly(example) {
            return Err(DetectError::ExampleValidation {
                pattern: definition.ns_id.clone(),
                kind: "nomatch",
                example: example.clone(),
                problem: "unexpectedly finalizes against the pattern",
            });
        }
    }
    Ok(())
}
