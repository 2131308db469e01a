use crate::{
    cluster::Cluster,
    config::Config,
    error::{DigestError, Result},
    scale::ScaleFunction,
    t_digest::TDigest,
};
use float_ord::FloatOrd;
use serde::{Deserialize, Serialize};

/// Plain-data form of a [TDigest], used for its serde representation.
///
/// The digest is compressed before it is captured, so the state carries no
/// buffered points. The shuffle seed is not kept; a restored digest draws a
/// fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestState {
    pub compression: f64,
    pub scale: ScaleFunction,
    pub buffer_size: Option<usize>,
    pub centroids: Vec<Cluster>,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl From<TDigest> for DigestState {
    fn from(digest: TDigest) -> Self {
        let (config, centroids, sum, min, max) = digest.into_parts();
        // JSON has no infinities; an empty digest's extremes are meaningless.
        let (sum, min, max) = if centroids.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (sum, min, max)
        };
        Self {
            compression: config.compression,
            scale: config.scale,
            buffer_size: config.buffer_size,
            centroids,
            sum,
            min,
            max,
        }
    }
}

impl TryFrom<DigestState> for TDigest {
    type Error = DigestError;

    fn try_from(state: DigestState) -> Result<Self> {
        let config = Config {
            compression: state.compression,
            scale: state.scale,
            buffer_size: state.buffer_size,
            seed: None,
        };
        config.validate()?;

        for c in &state.centroids {
            if !c.mean.is_finite() {
                return Err(DigestError::invalid("centroid mean", c.mean));
            }
            if !(c.weight.is_finite() && c.weight > 0.0) {
                return Err(DigestError::invalid("centroid weight", c.weight));
            }
        }
        if let Some(w) = state
            .centroids
            .windows(2)
            .find(|w| FloatOrd(w[0].mean) > FloatOrd(w[1].mean))
        {
            return Err(DigestError::invalid("centroid order", w[1].mean));
        }
        let total_weight: f64 = state.centroids.iter().map(Cluster::weight).sum();
        if !total_weight.is_finite() {
            return Err(DigestError::invalid("total weight", total_weight));
        }
        if !state.sum.is_finite() {
            return Err(DigestError::invalid("sum", state.sum));
        }
        if let (Some(first), Some(last)) = (state.centroids.first(), state.centroids.last()) {
            if !(state.min.is_finite() && state.min <= first.mean) {
                return Err(DigestError::invalid("min", state.min));
            }
            if !(state.max.is_finite() && state.max >= last.mean) {
                return Err(DigestError::invalid("max", state.max));
            }
        }

        Ok(TDigest::from_parts(
            config,
            state.centroids,
            state.sum,
            state.min,
            state.max,
        ))
    }
}
