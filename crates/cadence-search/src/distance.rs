//! Vector helpers for cosine space.
//!
//! Indices store L2-normalized vectors, so cosine distance reduces to
//! `1 - dot(a, b)` and ranges over `[0, 2]`.

use cadence_core::{magnitude, MIN_MAGNITUDE};

/// Dot product of two equal-length slices.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scale a vector to unit length. Anything below [`MIN_MAGNITUDE`] maps to
/// the zero vector, the same cut-off `FeatureVector::validate` applies.
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = magnitude(v);
    if n < MIN_MAGNITUDE {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| (f64::from(*x) / n) as f32).collect()
}

/// Cosine distance between two **normalized** vectors, clamped to `[0, 2]`.
#[inline]
#[must_use]
pub fn cosine_distance_normalized(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - dot(a, b)).clamp(0.0, 2.0)
}

/// Element-wise mean of equal-length vectors. `None` for an empty input.
#[must_use]
pub fn mean<'a, I>(vectors: I, dimension: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum = vec![0.0_f64; dimension];
    let mut count = 0_usize;
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += f64::from(*x);
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| (s / count as f64) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let v = normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_vanishing_vector_is_zero() {
        assert_eq!(normalize(&[1e-14; 4]), vec![0.0; 4]);
        let faint = normalize(&[1e-6, 0.0]);
        assert!((faint[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_range() {
        let a = normalize(&[1.0, 0.0]);
        let b = normalize(&[-1.0, 0.0]);
        let c = normalize(&[0.0, 1.0]);
        assert!(cosine_distance_normalized(&a, &a).abs() < 1e-6);
        assert!((cosine_distance_normalized(&a, &b) - 2.0).abs() < 1e-6);
        assert!((cosine_distance_normalized(&a, &c) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean() {
        let a = [1.0_f32, 2.0];
        let b = [3.0_f32, 4.0];
        let m = mean([&a[..], &b[..]], 2).unwrap();
        assert_eq!(m, vec![2.0, 3.0]);
        assert!(mean(std::iter::empty::<&[f32]>(), 2).is_none());
    }
}
