use crate::store::VectorError;

/// Cosine similarity of two equal-length, finite vectors, in `[-1, 1]`.
///
/// A zero-magnitude operand yields `0.0`.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Result<f64, VectorError> {
    if left.len() != right.len() {
        return Err(VectorError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    ensure_finite(left)?;
    ensure_finite(right)?;

    let mut dot = 0.0f64;
    let mut left_norm = 0.0f64;
    let mut right_norm = 0.0f64;
    for (left, right) in left.iter().zip(right) {
        let (left, right) = (f64::from(*left), f64::from(*right));
        dot += left * right;
        left_norm += left * left;
        right_norm += right * right;
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (left_norm.sqrt() * right_norm.sqrt())).clamp(-1.0, 1.0))
}

/// Rejects provider output that is empty, mis-sized, or non-finite.
pub fn validate_embedding(vector: &[f32], expected_dimensions: Option<usize>) -> Result<(), VectorError> {
    if vector.is_empty() {
        return Err(VectorError::Empty);
    }
    if let Some(expected) = expected_dimensions {
        if vector.len() != expected {
            return Err(VectorError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
    }
    ensure_finite(vector)
}

fn ensure_finite(vector: &[f32]) -> Result<(), VectorError> {
    match vector.iter().position(|component| !component.is_finite()) {
        Some(index) => Err(VectorError::NonFinite { index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, validate_embedding};
    use crate::store::VectorError;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn unit_identical_vectors_have_unit_similarity() {
        let vector: [f32; 4] = [0.3, -1.2, 4.5, 0.0];
        assert_close(cosine_similarity(&vector, &vector).expect("similarity"), 1.0);
    }

    #[test]
    fn unit_orthogonal_vectors_have_zero_similarity() {
        let similarity = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).expect("similarity");
        assert_close(similarity, 0.0);
    }

    #[test]
    fn unit_opposite_vectors_have_negative_unit_similarity() {
        let vector: [f32; 3] = [1.5, -2.0, 0.25];
        let negated = vector.map(|component: f32| -component);
        assert_close(cosine_similarity(&vector, &negated).expect("similarity"), -1.0);
    }

    #[test]
    fn regression_length_mismatch_is_rejected() {
        let error = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0]).expect_err("mismatch");
        assert!(matches!(
            error,
            VectorError::LengthMismatch { left: 3, right: 2 }
        ));
    }

    #[test]
    fn regression_zero_magnitude_yields_zero_not_nan() {
        let similarity = cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).expect("similarity");
        assert_eq!(similarity, 0.0);
        assert!(!similarity.is_nan());
    }

    #[test]
    fn regression_non_finite_components_are_rejected() {
        let error = cosine_similarity(&[1.0, f32::NAN], &[1.0, 0.0]).expect_err("nan");
        assert!(matches!(error, VectorError::NonFinite { index: 1 }));
        let error = cosine_similarity(&[1.0, 0.0], &[f32::INFINITY, 0.0]).expect_err("inf");
        assert!(matches!(error, VectorError::NonFinite { index: 0 }));
    }

    #[test]
    fn functional_validate_embedding_checks_shape_and_values() {
        assert!(validate_embedding(&[0.1, 0.2], Some(2)).is_ok());
        assert!(validate_embedding(&[0.1, 0.2], None).is_ok());
        assert!(matches!(
            validate_embedding(&[], None),
            Err(VectorError::Empty)
        ));
        assert!(matches!(
            validate_embedding(&[0.1], Some(2)),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            validate_embedding(&[f32::NEG_INFINITY], Some(1)),
            Err(VectorError::NonFinite { index: 0 })
        ));
    }
}
