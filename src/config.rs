use crate::{
    error::{DigestError, Result},
    scale::ScaleFunction,
    t_digest::TDigest,
};

/// Smallest automatic buffer, so tiny compressions do not compress on every
/// other insert.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Multiple of the compression at which a digest keeps its working clusters.
/// Queries read a summary of them at the compression itself.
pub const WORKING_RESOLUTION: f64 = 8.0;

/// Construction parameters for a [TDigest].
///
/// ```rust
/// use tdigest_core::{Config, ScaleFunction};
///
/// let digest = Config::new(200.0)
///     .with_scale(ScaleFunction::Sqrt)
///     .with_seed(7)
///     .build()
///     .unwrap();
/// assert_eq!(digest.compression(), 200.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Accuracy/memory trade-off, typically 20 to 1000.
    pub compression: f64,
    pub scale: ScaleFunction,
    /// Buffered points before a compression pass. Derived from `compression`
    /// when unset.
    pub buffer_size: Option<usize>,
    /// Seed for the shuffle applied before each compression pass. Drawn from
    /// entropy when unset.
    pub seed: Option<u64>,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Config {
    #[inline]
    pub fn new(compression: f64) -> Self {
        Self {
            compression,
            scale: ScaleFunction::default(),
            buffer_size: None,
            seed: None,
        }
    }

    #[inline]
    pub fn with_scale(mut self, scale: ScaleFunction) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    #[inline]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.compression.is_finite() && self.compression > 0.0) {
            return Err(DigestError::invalid("compression", self.compression));
        }
        if self.buffer_size == Some(0) {
            return Err(DigestError::invalid("buffer size", 0.0));
        }
        Ok(())
    }

    /// Number of buffered points that triggers a compression pass.
    pub fn buffer_limit(&self) -> usize {
        self.buffer_size.unwrap_or_else(|| {
            // `as` saturates, so huge compressions just never auto-compress.
            ((2.0 * self.compression).ceil() as usize).max(MIN_BUFFER_SIZE)
        })
    }

    /// Compression of the working clusters that buffered points fold into.
    #[inline]
    pub(crate) fn working_compression(&self) -> f64 {
        (self.compression * WORKING_RESOLUTION).min(f64::MAX)
    }

    #[inline]
    pub fn build(self) -> Result<TDigest> {
        TDigest::with_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Config::new(100.0).validate().is_ok());
        assert!(Config::new(0.5).validate().is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Config::new(bad).validate(),
                Err(DigestError::InvalidArgument { what: "compression", .. })
            ));
        }
        assert!(Config::new(100.0).with_buffer_size(0).validate().is_err());
    }

    #[test]
    fn test_buffer_limit() {
        assert_eq!(Config::new(100.0).buffer_limit(), 200);
        assert_eq!(Config::new(100.5).buffer_limit(), 201);
        assert_eq!(Config::new(1.0).buffer_limit(), MIN_BUFFER_SIZE);
        assert_eq!(Config::new(100.0).with_buffer_size(3).buffer_limit(), 3);
        assert_eq!(Config::new(1e300).buffer_limit(), usize::MAX);
    }

    #[test]
    fn test_working_compression() {
        assert_eq!(Config::new(100.0).working_compression(), 800.0);
        assert_eq!(Config::new(f64::MAX).working_compression(), f64::MAX);
    }
}
