//! overlap.rs - Deterministic resolution of overlapping raw matches.
//!
//! The pattern corpus intentionally contains patterns with identical shapes
//! differentiated only by priority, so the tie-break order here is a
//! documented contract: start ascending, then priority ascending (lower
//! number wins), then span length descending, then pattern load order.
//!
//! License: MIT OR APACHE 2.0

use std::cmp::Reverse;
use std::sync::Arc;

use crate::store::PatternDefinition;

/// A single regex hit, scoped to one scan. Byte offsets into the scanned
/// text.
#[derive(Debug, Clone)]
pub struct RawMatch {
    pub definition: Arc<PatternDefinition>,
    pub start: usize,
    pub end: usize,
}

impl RawMatch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &RawMatch) -> bool {
        !(self.end <= other.start || other.end <= self.start)
    }
}

/// Picks a non-overlapping subset of `raw` under the documented tie-break
/// contract, or passes everything through sorted when overlaps are allowed.
///
/// Default mode sorts candidates by (start asc, priority asc, length desc,
/// load order asc) and greedily accepts any candidate starting at or after
/// the end of the last accepted one. Where two candidates compete for the
/// same region, the lower-priority-number pattern wins, then the longer
/// span, then the earliest-loaded pattern.
pub fn resolve(mut raw: Vec<RawMatch>, allow_overlaps: bool) -> Vec<RawMatch> {
    if allow_overlaps {
        raw.sort_by_key(|m| (m.start, m.definition.priority, m.definition.order));
        return raw;
    }

    raw.sort_by_key(|m| {
        (
            m.start,
            m.definition.priority,
            Reverse(m.end - m.start),
            m.definition.order,
        )
    });

    let mut resolved: Vec<RawMatch> = Vec::with_capacity(raw.len());
    let mut last_end = 0usize;
    for candidate in raw {
        if candidate.start >= last_end {
            last_end = candidate.end;
            resolved.push(candidate);
        }
    }
    resolved
}
