/// Errors returned by [TDigest](crate::TDigest) operations.
///
/// Both kinds are caller mistakes and leave the digest untouched. Broken
/// internal invariants are not reported here; they panic.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DigestError {
    /// An argument was non-finite, non-positive or out of range.
    #[error("invalid {what}: {value}")]
    InvalidArgument {
        /// Which argument was rejected, e.g. `"weight"`.
        what: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The digest has not absorbed any weight yet.
    #[error("digest is empty")]
    EmptyDigest,
}

impl DigestError {
    #[inline]
    pub(crate) fn invalid(what: &'static str, value: f64) -> Self {
        Self::InvalidArgument { what, value }
    }
}

pub type Result<T, E = DigestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            DigestError::invalid("weight", 0.0).to_string(),
            "invalid weight: 0"
        );
        assert_eq!(DigestError::EmptyDigest.to_string(), "digest is empty");
    }
}
