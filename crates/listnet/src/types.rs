/// Precondition violations raised by the ranking losses, the NDCG metric,
/// and dataset validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RankingError {
    /// Two vectors that must be compared elementwise have different lengths.
    #[error("Shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The list is shorter than the requested cutoff (or the cutoff is 0
    /// where a positive cutoff is required).
    #[error("Cutoff k={k} is out of bounds for a list of {len} items")]
    Bounds { len: usize, k: usize },

    /// The ideal DCG is zero, so NDCG is undefined.
    #[error("Degenerate input: ideal DCG is zero (no relevant items in the top {k})")]
    DegenerateInput { k: usize },

    /// An operation that needs at least one item received none.
    #[error("Empty input: {0}")]
    Empty(&'static str),

    /// Minibatch size of zero.
    #[error("Batch size must be > 0")]
    ZeroBatchSize,

    /// Feature rows of a dataset do not all have the same width.
    #[error("Ragged features: row {row} has {actual} columns, expected {expected}")]
    RaggedFeatures {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Check that two vectors have the same length.
pub(crate) fn ensure_same_len(expected: usize, actual: usize) -> Result<(), RankingError> {
    if expected != actual {
        return Err(RankingError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = RankingError::ShapeMismatch { expected: 3, actual: 2 };
        assert_eq!(e.to_string(), "Shape mismatch: expected 3 elements, got 2");

        let e = RankingError::Bounds { len: 4, k: 20 };
        assert!(e.to_string().contains("k=20"));
        assert!(e.to_string().contains("4 items"));
    }

    #[test]
    fn test_ensure_same_len() {
        assert!(ensure_same_len(3, 3).is_ok());
        assert_eq!(
            ensure_same_len(3, 4),
            Err(RankingError::ShapeMismatch { expected: 3, actual: 4 })
        );
    }
}
