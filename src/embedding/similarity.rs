//! Cosine similarity kernels.
//!
//! [`SimilarityBlock`] holds one rows × cols sub-matrix of the pairwise
//! similarity matrix; the simplifier walks the full matrix block by block so
//! peak memory stays at `batch_size²` values.

/// Cosine similarity of two equal-length vectors, accumulated in `f64`.
///
/// Returns 0.0 when either vector has zero norm; the result is clamped to
/// `[-1, 1]` so rounding never pushes parallel vectors past a 1.0 threshold.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    cosine_with_norms(a, norm(a), b, norm(b))
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

/// Cosine from precomputed norms; 0.0 when either norm is zero.
fn cosine_with_norms(a: &[f32], norm_a: f64, b: &[f32], norm_b: f64) -> f64 {
    let denom = norm_a * norm_b;
    if denom == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (x as f64) * (y as f64))
        .sum();
    (dot / denom).clamp(-1.0, 1.0)
}

/// Dense row-major block of pairwise cosine similarities.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityBlock {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl SimilarityBlock {
    /// Compute similarities between every row vector and every column vector.
    pub fn compute<R, C>(rows: &[R], cols: &[C]) -> Self
    where
        R: AsRef<[f32]>,
        C: AsRef<[f32]>,
    {
        let col_norms: Vec<f64> = cols.iter().map(|c| norm(c.as_ref())).collect();
        let mut values = Vec::with_capacity(rows.len() * cols.len());
        for r in rows {
            let r = r.as_ref();
            let r_norm = norm(r);
            for (c, &c_norm) in cols.iter().zip(&col_norms) {
                values.push(cosine_with_norms(r, r_norm, c.as_ref(), c_norm));
            }
        }
        Self {
            rows: rows.len(),
            cols: cols.len(),
            values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Similarity of row `r` and column `c`.
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.values[r * self.cols + c]
    }

    /// `(row, col)` pairs whose similarity exceeds `threshold`, row-major.
    pub fn above(&self, threshold: f64) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(move |&(_, &v)| v > threshold)
            .map(|(i, _)| (i / self.cols, i % self.cols))
    }
}
