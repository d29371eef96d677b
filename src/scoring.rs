//! Candidate acceptance and ranking.
//!
//! Configured match filters are compiled once per session. A candidate is
//! accepted when any filter accepts its comparison matrix; accepted
//! candidates are ranked by:
//! - index of the first accepting filter (earlier filters are stricter by convention)
//! - summed similarity over all matrix fields, descending
//! - provider order (stable sort)

use std::cmp::Ordering;
use tracing::warn;

use crate::compare::{build_matrix, WantedFields};
use crate::config::MatchFilter;
use crate::expression::{parse_expression, Expr};
use crate::legacy::migrate_legacy_filter;
use crate::models::{CandidateTrack, ComparisonMatrix, MatchedCandidate};

// ============================================================================
// Compiled Filters
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub reason: Option<String>,
    pub expr: Expr,
}

/// The compiled form of a session's configured filters.
///
/// `configured` counts the filters in the configuration, valid or not.
/// Only an empty configuration accepts every candidate; configured filters
/// that all fail to parse accept none.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<CompiledFilter>,
    configured: usize,
}

impl FilterSet {
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// True when no filter was configured at all.
    pub fn accepts_everything(&self) -> bool {
        self.configured == 0
    }

    /// Index and reason of the first filter accepting `matrix`.
    fn accepting(
        &self,
        matrix: &ComparisonMatrix,
        default_threshold: f64,
    ) -> Option<(usize, Option<String>)> {
        if self.accepts_everything() {
            return Some((0, None));
        }
        self.filters
            .iter()
            .enumerate()
            .find(|(_, f)| f.expr.evaluate(matrix, default_threshold))
            .map(|(i, f)| (i, f.reason.clone()))
    }
}

/// Compile configured filters, skipping (and logging) the ones that do not parse.
pub fn compile_filters(filters: &[MatchFilter]) -> FilterSet {
    let compiled: Vec<CompiledFilter> = filters
        .iter()
        .filter_map(|f| match parse_expression(&f.filter) {
            Ok(expr) => Some(CompiledFilter {
                reason: f.reason.clone(),
                expr,
            }),
            Err(errors) => {
                warn!(filter = %f.filter, ?errors, "skipping invalid match filter");
                None
            }
        })
        .collect();

    if compiled.is_empty() && !filters.is_empty() {
        warn!(
            configured = filters.len(),
            "no configured match filter is valid; every candidate will be rejected"
        );
    }

    FilterSet {
        filters: compiled,
        configured: filters.len(),
    }
}

/// Validation messages for one configured filter; empty when it is usable.
/// Legacy filters get a hint with their migrated form.
pub fn get_filter_validation_errors(filter: &MatchFilter) -> Vec<String> {
    match parse_expression(&filter.filter) {
        Ok(_) => Vec::new(),
        Err(mut errors) => {
            if let Some(migrated) = migrate_legacy_filter(&filter.filter) {
                errors.insert(
                    0,
                    format!("Legacy filter format; migrate to: {}", migrated),
                );
            }
            errors
        }
    }
}

// ============================================================================
// Acceptance & Ranking
// ============================================================================

struct Scored {
    candidate: CandidateTrack,
    matrix: ComparisonMatrix,
    filter_index: usize,
    reason: Option<String>,
    total: f64,
}

/// Build matrices, drop rejected candidates and rank the rest.
/// `with_matrix` keeps the comparison matrix on each result (analyze mode).
pub fn rank_candidates(
    wanted: WantedFields<'_>,
    candidates: &[CandidateTrack],
    filters: &FilterSet,
    default_threshold: f64,
    with_matrix: bool,
) -> Vec<MatchedCandidate> {
    let mut scored: Vec<Scored> = candidates
        .iter()
        .filter_map(|candidate| {
            let matrix = build_matrix(wanted, candidate);
            let (filter_index, reason) = filters.accepting(&matrix, default_threshold)?;
            let total = matrix.total_similarity();
            Some(Scored {
                candidate: candidate.clone(),
                matrix,
                filter_index,
                reason,
                total,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        a.filter_index
            .cmp(&b.filter_index)
            .then_with(|| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal))
    });

    scored
        .into_iter()
        .map(|s| MatchedCandidate {
            track: s.candidate,
            reason: s.reason,
            matching: with_matrix.then_some(s.matrix),
        })
        .collect()
}
