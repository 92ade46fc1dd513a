use core_types::Metric;

/// Σ a[i]·b[i], accumulated left to right in f32.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0_f32, |acc, (x, y)| acc + x * y)
}

#[inline]
fn norm(a: &[f32]) -> f32 {
    dot_product(a, a).sqrt()
}

/// Cosine similarity; 0.0 when either side has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_query_norm(a, norm(a), b)
}

#[inline]
pub(crate) fn cosine_with_query_norm(query: &[f32], query_norm: f32, b: &[f32]) -> f32 {
    let denom = query_norm * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot_product(query, b) / denom
    }
}

/// Score `b` against `a` under `metric`.
pub fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::DotProduct => dot_product(a, b),
        Metric::Cosine => cosine(a, b),
    }
}

/// Query-side scorer with per-query work (the query norm) done once.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scorer<'q> {
    metric: Metric,
    query: &'q [f32],
    query_norm: f32,
}

impl<'q> Scorer<'q> {
    pub(crate) fn new(metric: Metric, query: &'q [f32]) -> Self {
        let query_norm = match metric {
            Metric::DotProduct => 0.0,
            Metric::Cosine => norm(query),
        };
        Self {
            metric,
            query,
            query_norm,
        }
    }

    #[inline]
    pub(crate) fn score(&self, v: &[f32]) -> f32 {
        match self.metric {
            Metric::DotProduct => dot_product(self.query, v),
            Metric::Cosine => cosine_with_query_norm(self.query, self.query_norm, v),
        }
    }
}
