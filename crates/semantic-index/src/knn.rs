//! Exact k-nearest-neighbor scan.
//!
//! Ranking contract: strictly descending score, ties broken by ascending
//! internal id. NaN scores rank below every number and `-0.0` ties with `0.0`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use core_types::{InternalId, Metric};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metric::Scorer;
use crate::{FlatVectors, SearchError};

/// Rows scored per parallel task.
pub const SCAN_CHUNK: usize = 4096;

/// One scored document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: InternalId,
    pub score: f32,
}

#[inline]
fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

/// `Less` when `a` ranks ahead of `b`.
pub fn rank_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    rank_key(b.score)
        .total_cmp(&rank_key(a.score))
        .then_with(|| a.id.cmp(&b.id))
}

/// Heap entry whose maximum is the worst-ranked candidate.
struct Candidate(Neighbor);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_order(&self.0, &other.0)
    }
}

/// Top-k of a contiguous block of rows whose first row has id `first_id`.
fn top_k_block(first_id: usize, block: &[f32], dim: usize, scorer: &Scorer<'_>, k: usize) -> Vec<Neighbor> {
    let rows = block.len() / dim;
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k.min(rows) + 1);

    for (offset, row) in block.chunks_exact(dim).enumerate() {
        let candidate = Candidate(Neighbor {
            id: InternalId::from(first_id + offset),
            score: scorer.score(row),
        });
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek()
            && candidate < *worst
        {
            heap.pop();
            heap.push(candidate);
        }
    }

    // Ascending by `Ord` means best first.
    heap.into_sorted_vec().into_iter().map(|c| c.0).collect()
}

fn validate(vectors: &FlatVectors, query: &[f32], k: usize) -> Result<(), SearchError> {
    if k == 0 {
        return Err(SearchError::InvalidArgument("k must be a positive integer".into()));
    }
    if query.len() != vectors.dimension() {
        return Err(SearchError::DimensionMismatch {
            expected: vectors.dimension(),
            actual: query.len(),
        });
    }
    Ok(())
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

/// Return the `min(k, vectors.len())` best-scoring rows for `query`.
///
/// Large stores are scanned in parallel; the result is identical to
/// [`search_sequential`].
///
/// # Errors
///
/// `InvalidArgument` when `k == 0`, `DimensionMismatch` when the query width
/// differs from the store, `Cancelled` when `cancel` fires mid-scan.
pub fn search(
    vectors: &FlatVectors,
    query: &[f32],
    k: usize,
    metric: Metric,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<Neighbor>, SearchError> {
    validate(vectors, query, k)?;
    if is_cancelled(cancel) {
        return Err(SearchError::Cancelled);
    }
    if vectors.is_empty() {
        return Ok(Vec::new());
    }
    if vectors.len() <= SCAN_CHUNK {
        return search_sequential(vectors, query, k, metric, cancel);
    }

    let started = Instant::now();
    let dim = vectors.dimension();
    let scorer = Scorer::new(metric, query);

    let partials = vectors
        .as_slice()
        .par_chunks(dim * SCAN_CHUNK)
        .enumerate()
        .map(|(chunk, block)| {
            if is_cancelled(cancel) {
                return Err(SearchError::Cancelled);
            }
            Ok(top_k_block(chunk * SCAN_CHUNK, block, dim, &scorer, k))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut merged: Vec<Neighbor> = partials.into_iter().flatten().collect();
    merged.sort_unstable_by(rank_order);
    merged.truncate(k);

    debug!(
        scanned = vectors.len(),
        k,
        returned = merged.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "parallel knn scan finished"
    );
    Ok(merged)
}

/// Single-threaded reference scan with the same contract as [`search`].
///
/// # Errors
///
/// Same as [`search`].
pub fn search_sequential(
    vectors: &FlatVectors,
    query: &[f32],
    k: usize,
    metric: Metric,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<Neighbor>, SearchError> {
    validate(vectors, query, k)?;
    if is_cancelled(cancel) {
        return Err(SearchError::Cancelled);
    }
    if vectors.is_empty() {
        return Ok(Vec::new());
    }
    let scorer = Scorer::new(metric, query);
    Ok(top_k_block(0, vectors.as_slice(), vectors.dimension(), &scorer, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store(rows: &[&[f32]]) -> FlatVectors {
        let mut v = FlatVectors::new(rows[0].len());
        for r in rows {
            v.push(r).unwrap();
        }
        v
    }

    fn ids(hits: &[Neighbor]) -> Vec<u64> {
        hits.iter().map(|n| n.id.0).collect()
    }

    #[test]
    fn one_hot_query_ranks_by_dot_product() {
        let mut q = vec![0.0_f32; 384];
        q[0] = 1.0;
        let mut a = vec![0.0_f32; 384];
        a[0] = 1.0;
        let mut b = vec![0.0_f32; 384];
        b[1] = 1.0;
        let mut c = vec![0.0_f32; 384];
        c[0] = 0.5;
        c[1] = 0.5;
        let vectors = store(&[&a, &b, &c]);

        let hits = search(&vectors, &q, 30, Metric::DotProduct, None).unwrap();
        assert_eq!(ids(&hits), vec![0, 2, 1]);
        let scores: Vec<f32> = hits.iter().map(|n| n.score).collect();
        assert_eq!(scores, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn result_count_is_min_of_k_and_len() {
        let vectors = store(&[&[1.0, 0.0], &[0.0, 1.0], &[0.5, 0.5]]);
        assert_eq!(search(&vectors, &[1.0, 0.0], 30, Metric::DotProduct, None).unwrap().len(), 3);
        assert_eq!(search(&vectors, &[1.0, 0.0], 2, Metric::DotProduct, None).unwrap().len(), 2);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let vectors = store(&[&[0.5, 0.5], &[1.0, 0.0], &[0.5, 0.5], &[1.0, 0.0]]);
        let hits = search(&vectors, &[1.0, 0.0], 4, Metric::DotProduct, None).unwrap();
        assert_eq!(ids(&hits), vec![1, 3, 0, 2]);

        let top1 = search(&vectors, &[1.0, 0.0], 1, Metric::DotProduct, None).unwrap();
        assert_eq!(ids(&top1), vec![1]);
    }

    #[test]
    fn nan_scores_rank_last() {
        let vectors = store(&[&[f32::NAN, 0.0], &[-1.0, 0.0], &[2.0, 0.0]]);
        let hits = search(&vectors, &[1.0, 0.0], 3, Metric::DotProduct, None).unwrap();
        assert_eq!(ids(&hits), vec![2, 1, 0]);
    }

    #[test]
    fn zero_k_is_invalid() {
        let vectors = store(&[&[1.0, 0.0]]);
        assert!(matches!(
            search(&vectors, &[1.0, 0.0], 0, Metric::DotProduct, None),
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn query_width_must_match_store() {
        let vectors = FlatVectors::new(384);
        let err = search(&vectors, &[1.0; 383], 5, Metric::DotProduct, None).unwrap_err();
        assert_eq!(
            err,
            SearchError::DimensionMismatch {
                expected: 384,
                actual: 383
            }
        );
    }

    #[test]
    fn empty_store_yields_empty_result() {
        let vectors = FlatVectors::new(4);
        let hits = search(&vectors, &[0.0; 4], 10, Metric::DotProduct, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn cancelled_token_stops_search() {
        let vectors = store(&[&[1.0, 0.0]]);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            search(&vectors, &[1.0, 0.0], 1, Metric::DotProduct, Some(&token)),
            Err(SearchError::Cancelled)
        );
    }

    #[test]
    fn cosine_metric_reorders_by_direction() {
        // Long vector pointing slightly off-axis beats on dot product, loses on cosine.
        let vectors = store(&[&[10.0, 5.0], &[1.0, 0.0]]);
        let dot = search(&vectors, &[1.0, 0.0], 2, Metric::DotProduct, None).unwrap();
        assert_eq!(ids(&dot), vec![0, 1]);
        let cos = search(&vectors, &[1.0, 0.0], 2, Metric::Cosine, None).unwrap();
        assert_eq!(ids(&cos), vec![1, 0]);
    }

    #[test]
    fn parallel_scan_matches_sequential_on_large_store() {
        let dim = 8;
        let rows = SCAN_CHUNK * 3 + 17;
        let mut vectors = FlatVectors::with_capacity(dim, rows);
        for i in 0..rows {
            // Few distinct values so that many scores tie across chunk borders.
            let row: Vec<f32> = (0..dim).map(|d| ((i * 7 + d * 3) % 5) as f32 * 0.25).collect();
            vectors.push(&row).unwrap();
        }
        let query = vec![0.5_f32; dim];

        for k in [1, 10, 500, rows, rows + 5] {
            let par = search(&vectors, &query, k, Metric::DotProduct, None).unwrap();
            let seq = search_sequential(&vectors, &query, k, Metric::DotProduct, None).unwrap();
            assert_eq!(par, seq, "k = {k}");
            assert_eq!(par.len(), k.min(rows));
        }
    }

    fn small_store() -> impl Strategy<Value = (usize, Vec<Vec<f32>>)> {
        (1usize..6).prop_flat_map(|dim| {
            let row = prop::collection::vec(-4i8..=4, dim)
                .prop_map(|v| v.into_iter().map(|x| f32::from(x) * 0.5).collect::<Vec<f32>>());
            (Just(dim), prop::collection::vec(row, 0..40))
        })
    }

    proptest! {
        #[test]
        fn full_search_returns_every_doc_once_in_rank_order(
            (dim, rows) in small_store(),
            extra in 0usize..5,
        ) {
            let mut vectors = FlatVectors::new(dim);
            for r in &rows {
                vectors.push(r).unwrap();
            }
            let query: Vec<f32> = (0..dim).map(|d| if d % 2 == 0 { 1.0 } else { -0.5 }).collect();
            let k = rows.len() + extra + 1;

            let hits = search(&vectors, &query, k, Metric::DotProduct, None).unwrap();
            prop_assert_eq!(hits.len(), rows.len());

            let mut seen: Vec<u64> = ids(&hits);
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..rows.len() as u64).collect::<Vec<_>>());

            for pair in hits.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                prop_assert!(a.score > b.score || (a.score == b.score && a.id < b.id));
            }
        }

        #[test]
        fn repeated_queries_are_bit_identical((dim, rows) in small_store(), k in 1usize..50) {
            let mut vectors = FlatVectors::new(dim);
            for r in &rows {
                vectors.push(r).unwrap();
            }
            let query = vec![0.75_f32; dim];
            let first = search(&vectors, &query, k, Metric::Cosine, None).unwrap();
            let second = search(&vectors, &query, k, Metric::Cosine, None).unwrap();
            let bits = |h: &[Neighbor]| h.iter().map(|n| (n.id, n.score.to_bits())).collect::<Vec<_>>();
            prop_assert_eq!(bits(&first), bits(&second));
        }
    }
}
