//! context.rs - Context-based candidate narrowing and proximity scoring.
//!
//! Two concerns live here. [`CandidateSelector`] narrows the pattern set for
//! a scan using caller-supplied hints and the snapshot's inverted indices,
//! which is what makes targeted scans run in time proportional to the hint
//! cardinality instead of the total pattern count. [`ContextScorer`] then
//! boosts the confidence of finalized matches when category-specific anchor
//! keywords appear near the matched span.
//!
//! License: MIT OR APACHE 2.0

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::DetectError;
use crate::models::{Category, Match};
use crate::store::{normalize_keyword, PatternDefinition, PatternSnapshot};

/// Candidate-selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Only hint-matched patterns; the candidate set may be empty.
    Strict,
    /// Hint-matched patterns, falling back to the full namespace-filtered
    /// set when the computed set is empty.
    #[default]
    Loose,
    /// Ignore hints entirely.
    None,
}

/// Contextual hints guiding pattern selection for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContextHint {
    /// Keywords from surrounding metadata (column names, labels).
    pub keywords: Vec<String>,
    /// Category hints to include.
    pub categories: Vec<Category>,
    /// Explicit `namespace/id` keys; a trailing `*` acts as a
    /// namespace-scoped wildcard suffix (e.g. `"kr/bank_*"`).
    pub pattern_ids: Vec<String>,
    /// `namespace/id` keys to exclude from the computed set.
    pub exclude_patterns: Vec<String>,
    pub strategy: SelectionStrategy,
}

impl ContextHint {
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Derives a hint from a field or column name, splitting on the usual
    /// delimiters and dropping one-character fragments: `"billing_zip_code"`
    /// yields keywords `["billing", "zip", "code"]`.
    pub fn from_field_name(field_name: &str, strategy: SelectionStrategy) -> Self {
        let keywords = field_name
            .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
            .filter(|part| part.len() > 1)
            .map(|part| part.to_lowercase())
            .collect();
        Self {
            keywords,
            strategy,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.categories.is_empty() && self.pattern_ids.is_empty()
    }
}

/// Narrows the pattern set per scan using the snapshot's inverted indices.
pub struct CandidateSelector;

impl CandidateSelector {
    /// Computes the candidate set for `namespaces`, ordered by priority
    /// ascending then stable load order.
    ///
    /// With no hint (or `SelectionStrategy::None`) this is the full
    /// namespace-filtered set. Exclusions apply only to the hint-computed
    /// set, never to a `loose` fallback, matching the documented strategy
    /// semantics.
    pub fn select(
        snapshot: &PatternSnapshot,
        namespaces: &[String],
        hint: Option<&ContextHint>,
    ) -> Vec<Arc<PatternDefinition>> {
        // Membership set for the namespace filter, keyed by load order.
        let mut in_scope: HashMap<usize, Arc<PatternDefinition>> = HashMap::new();
        for namespace in namespaces {
            for definition in snapshot.patterns_in_namespace(namespace) {
                in_scope.insert(definition.order, Arc::clone(definition));
            }
        }

        let full_set = |scope: &HashMap<usize, Arc<PatternDefinition>>| {
            let mut all: Vec<Arc<PatternDefinition>> = scope.values().cloned().collect();
            all.sort_by_key(|d| (d.priority, d.order));
            all
        };

        let Some(hint) = hint else {
            return full_set(&in_scope);
        };
        if hint.strategy == SelectionStrategy::None {
            return full_set(&in_scope);
        }

        let mut selected: HashMap<usize, Arc<PatternDefinition>> = HashMap::new();

        for keyword in &hint.keywords {
            for definition in snapshot.patterns_for_keyword(keyword) {
                selected.insert(definition.order, Arc::clone(definition));
            }
        }
        for &category in &hint.categories {
            for definition in snapshot.patterns_in_category(category) {
                selected.insert(definition.order, Arc::clone(definition));
            }
        }
        for pattern_id in &hint.pattern_ids {
            match pattern_id.strip_suffix('*') {
                Some(prefix) => {
                    // Namespace-scoped wildcard: expand against that
                    // namespace's index slice only.
                    let Some((namespace, id_prefix)) = prefix.split_once('/') else {
                        warn!("Ignoring wildcard hint without namespace: '{}'", pattern_id);
                        continue;
                    };
                    for definition in snapshot.patterns_in_namespace(namespace) {
                        if definition.id.starts_with(id_prefix) {
                            selected.insert(definition.order, Arc::clone(definition));
                        }
                    }
                }
                None => {
                    if let Some(definition) = snapshot.get(pattern_id) {
                        selected.insert(definition.order, Arc::clone(definition));
                    }
                }
            }
        }

        // Keep only patterns inside the namespace filter.
        selected.retain(|order, _| in_scope.contains_key(order));

        for excluded in &hint.exclude_patterns {
            if let Some(definition) = snapshot.get(excluded) {
                selected.remove(&definition.order);
            }
        }

        if selected.is_empty() && hint.strategy == SelectionStrategy::Loose {
            debug!("Loose hint matched no patterns; falling back to full namespace set");
            return full_set(&in_scope);
        }

        let mut candidates: Vec<Arc<PatternDefinition>> = selected.into_values().collect();
        candidates.sort_by_key(|d| (d.priority, d.order));
        debug!(
            "Candidate selection: {} of {} in-scope patterns",
            candidates.len(),
            in_scope.len()
        );
        candidates
    }
}

/// Serialized form of an anchor document: category name to anchor phrases.
#[derive(Debug, Deserialize)]
struct AnchorDocument {
    categories: HashMap<String, AnchorEntry>,
}

#[derive(Debug, Deserialize)]
struct AnchorEntry {
    #[serde(default)]
    contexts: Vec<String>,
}

/// Proximity window, in characters, on each side of a match.
pub const DEFAULT_ANCHOR_WINDOW: usize = 60;

/// Boosts match confidence when category anchor keywords sit near the span.
///
/// Purely additive and advisory: the scorer never removes a match, and a
/// category without an anchor table simply receives no boost. Downstream
/// consumers may threshold on the resulting confidence.
#[derive(Debug, Clone)]
pub struct ContextScorer {
    anchors: HashMap<Category, Vec<String>>,
    window: usize,
}

impl Default for ContextScorer {
    fn default() -> Self {
        Self::from_yaml_str(include_str!("../config/anchors.yml"))
            .expect("bundled anchor table parses")
    }
}

impl ContextScorer {
    /// A scorer with no anchor tables; every boost is zero.
    pub fn disabled() -> Self {
        Self {
            anchors: HashMap::new(),
            window: DEFAULT_ANCHOR_WINDOW,
        }
    }

    /// Parses an anchor document. Unknown category names are skipped with a
    /// warning rather than failing the load; anchors are advisory.
    pub fn from_yaml_str(text: &str) -> Result<Self, DetectError> {
        let document: AnchorDocument =
            serde_yml::from_str(text).map_err(|e| DetectError::MalformedSource {
                source_id: "<anchors>".to_string(),
                message: e.to_string(),
            })?;

        let mut anchors: HashMap<Category, Vec<String>> = HashMap::new();
        for (name, entry) in document.categories {
            let Ok(category) = serde_yml::from_str::<Category>(&name) else {
                warn!("Skipping anchor table for unknown category '{}'", name);
                continue;
            };
            let phrases: Vec<String> = entry
                .contexts
                .iter()
                .map(|c| c.to_lowercase().replace(':', "").trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            anchors.entry(category).or_default().extend(phrases);
        }
        Ok(Self {
            anchors,
            window: DEFAULT_ANCHOR_WINDOW,
        })
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Applies anchor boosts to finalized matches, clamping the final
    /// confidence to [0, 1].
    pub fn score(&self, text: &str, matches: &mut [Match]) {
        for m in matches.iter_mut() {
            let boost = self.boost_for(text, m);
            m.confidence = (m.confidence + boost).clamp(0.0, 1.0);
        }
    }

    /// Confidence boost by proximity band: d<10 chars adds 0.45, d<30 adds
    /// 0.30, d<60 (within the window) adds 0.10, otherwise nothing.
    pub fn boost_for(&self, text: &str, m: &Match) -> f64 {
        let Some(phrases) = self.anchors.get(&m.category) else {
            return 0.0;
        };
        if phrases.is_empty() {
            return 0.0;
        }

        let pre_window = trailing_chars(&text[..m.start], self.window).to_lowercase();
        let post_window = leading_chars(&text[m.end..], self.window).to_lowercase();

        let mut min_distance: Option<usize> = None;
        for phrase in phrases {
            // Closest occurrence before the match.
            if let Some(pos) = pre_window.rfind(phrase.as_str()) {
                let distance = pre_window[pos + phrase.len()..].chars().count();
                min_distance = Some(min_distance.map_or(distance, |d| d.min(distance)));
            }
            // Closest occurrence after the match.
            if let Some(pos) = post_window.find(phrase.as_str()) {
                let distance = post_window[..pos].chars().count();
                min_distance = Some(min_distance.map_or(distance, |d| d.min(distance)));
            }
        }

        match min_distance {
            Some(d) if d < 10 => 0.45,
            Some(d) if d < 30 => 0.30,
            Some(d) if d < self.window => 0.10,
            _ => 0.0,
        }
    }
}

/// The last `count` characters of `s`, byte-boundary safe.
fn trailing_chars(s: &str, count: usize) -> &str {
    match s.char_indices().rev().nth(count.saturating_sub(1)) {
        Some((index, _)) if count > 0 => &s[index..],
        _ if count == 0 => "",
        _ => s,
    }
}

/// The first `count` characters of `s`, byte-boundary safe.
fn leading_chars(s: &str, count: usize) -> &str {
    match s.char_indices().nth(count) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}
