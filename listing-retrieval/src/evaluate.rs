//! Retrieval quality metrics

use serde::Serialize;

/// One evaluation case: what was retrieved, and the text a relevant
/// result must contain
#[derive(Debug, Clone)]
pub struct EvalCase<S = String> {
    pub retrieved: Vec<S>,
    pub reference: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalMetrics {
    /// Fraction of cases with a relevant result in the top k
    pub recall_at_k: f64,
    /// Mean of 1/rank of the first relevant result (0 when absent)
    pub mrr: f64,
    pub k: usize,
    pub cases: usize,
}

/// 1-based rank of the first of the top `k` results containing `reference`
pub fn first_hit_rank<S: AsRef<str>>(retrieved: &[S], reference: &str, k: usize) -> Option<usize> {
    retrieved
        .iter()
        .take(k)
        .position(|text| text.as_ref().contains(reference))
        .map(|pos| pos + 1)
}

/// Recall@K and MRR over `cases`; both are 0 for no cases
pub fn evaluate<S: AsRef<str>>(cases: &[EvalCase<S>], k: usize) -> RetrievalMetrics {
    if cases.is_empty() {
        return RetrievalMetrics {
            recall_at_k: 0.0,
            mrr: 0.0,
            k,
            cases: 0,
        };
    }

    let ranks: Vec<Option<usize>> = cases
        .iter()
        .map(|case| first_hit_rank(&case.retrieved, case.reference.as_ref(), k))
        .collect();

    let n = cases.len() as f64;
    let hits = ranks.iter().filter(|r| r.is_some()).count() as f64;
    let reciprocal: f64 = ranks.iter().flatten().map(|&rank| 1.0 / rank as f64).sum();

    RetrievalMetrics {
        recall_at_k: hits / n,
        mrr: reciprocal / n,
        k,
        cases: cases.len(),
    }
}
