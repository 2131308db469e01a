use crate::{
    cluster::*,
    config::Config,
    error::{DigestError, Result},
    scale::ScaleFunction,
};
use float_ord::FloatOrd;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{
    borrow::Borrow,
    cell::{Ref, RefCell},
};

/// Clusters plus the points not yet folded into them.
///
/// Kept behind a `RefCell` so that `&self` queries can flush the buffer.
#[derive(Debug, Clone)]
struct Store {
    /// Sorted by mean, bounded by [Config::working_compression].
    clusters: Vec<Cluster>,
    /// Raw observations, and incoming clusters during a merge.
    buffer: Vec<Cluster>,
    /// `clusters` re-merged under the digest's own compression. `None` once
    /// stale.
    summary: Option<Vec<Cluster>>,
    rng: StdRng,
}

/// Approximation of a weighted sample distribution's [quantile
/// function](https://en.wikipedia.org/wiki/Quantile_function).
///
/// Observations are buffered and periodically compressed into [Cluster]s whose
/// size is bounded by a [ScaleFunction], so memory stays `O(compression)`
/// however many samples are added.
///
/// Buffered points fold into working clusters kept at
/// [WORKING_RESOLUTION](crate::WORKING_RESOLUTION) times the compression.
/// Queries and [centroids](TDigest::centroids) read a summary of those at the
/// compression itself, rebuilt only after new data arrives.
///
/// `TDigest` is `Send` but not `Sync`: queries take `&self` and compress any
/// buffered points in place. Share it behind a `Mutex`, or keep one digest per
/// worker and [merge](TDigest::merge) them.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "crate::DigestState", try_from = "crate::DigestState")
)]
pub struct TDigest {
    config: Config,
    buffer_limit: usize,
    store: RefCell<Store>,
    total_weight: f64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for TDigest {
    #[inline]
    fn default() -> Self {
        Self::from_valid_config(Config::default())
    }
}

impl TDigest {
    /// Empty digest with the default scale function and buffer size.
    ///
    /// Fails if `compression` is not finite and positive.
    pub fn new(compression: f64) -> Result<Self> {
        Self::with_config(Config::new(compression))
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: Config) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let buffer_limit = config.buffer_limit();
        tracing::debug!(
            target: "tdigest",
            compression = config.compression,
            scale = ?config.scale,
            buffer_limit,
            "created digest"
        );
        Self {
            config,
            buffer_limit,
            store: RefCell::new(Store {
                clusters: Vec::new(),
                buffer: Vec::new(),
                summary: None,
                rng,
            }),
            total_weight: 0.0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn compression(&self) -> f64 {
        self.config.compression
    }

    #[inline]
    pub fn scale(&self) -> ScaleFunction {
        self.config.scale
    }

    /// Total weight of all samples.
    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Weighted sum of all samples.
    #[inline]
    pub fn sum(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.sum)
    }

    /// Weighted mean of all samples.
    #[inline]
    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.sum / self.total_weight)
    }

    /// Minimum of all samples.
    #[inline]
    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    /// Maximum of all samples.
    #[inline]
    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0.0
    }

    /// Number of clusters after folding in any buffered points.
    pub fn centroid_count(&self) -> usize {
        self.summary().len()
    }

    /// Copy of the compressed clusters, sorted by mean.
    pub fn centroids(&self) -> Vec<Cluster> {
        self.summary().to_vec()
    }

    /// Adds `value` with the given `weight`.
    ///
    /// Fails, leaving the digest unchanged, if `value` is not finite, `weight`
    /// is not finite and positive, or the digest's total weight or weighted
    /// sum would overflow.
    pub fn add(&mut self, value: f64, weight: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(DigestError::invalid("value", value));
        }
        if !(weight.is_finite() && weight > 0.0) {
            return Err(DigestError::invalid("weight", weight));
        }
        let total_weight = self.total_weight + weight;
        if !total_weight.is_finite() {
            return Err(DigestError::invalid("total weight", total_weight));
        }
        let sum = self.sum + value * weight;
        if !sum.is_finite() {
            return Err(DigestError::invalid("sum", sum));
        }

        self.total_weight = total_weight;
        self.sum = sum;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let store = self.store.get_mut();
        store.buffer.push(Cluster::new(value, weight));
        store.summary = None;
        if store.buffer.len() > self.buffer_limit {
            flush(store, &self.config);
        }
        Ok(())
    }

    /// Adds `value` with weight 1.
    #[inline]
    pub fn insert(&mut self, value: f64) -> Result<()> {
        self.add(value, 1.0)
    }

    /// Adds every value with weight 1, streaming them through the buffer.
    ///
    /// Stops at the first value [add](TDigest::add) rejects and returns its
    /// error; the values before it stay in the digest.
    pub fn add_all<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = f64>,
    {
        for value in values {
            self.insert(value)?;
        }
        Ok(())
    }

    /// Folds all buffered points into the clusters.
    pub fn compress(&mut self) {
        compress_store(self.store.get_mut(), &self.config);
    }

    /// Compressed clusters, compressing first if anything changed since the
    /// last query.
    fn summary(&self) -> Ref<'_, [Cluster]> {
        let stale = {
            let store = self.store.borrow();
            !store.buffer.is_empty() || store.summary.is_none()
        };
        if stale {
            compress_store(&mut self.store.borrow_mut(), &self.config);
        }
        Ref::map(self.store.borrow(), |store| {
            store.summary.as_deref().unwrap_or_default()
        })
    }

    /// Absorbs all of `other`'s samples. The receiver's compression and scale
    /// function bound the result; `other` is not modified.
    ///
    /// Fails, leaving the receiver unchanged, if the combined total weight or
    /// weighted sum would overflow.
    pub fn merge(&mut self, other: &TDigest) -> Result<()> {
        if self.absorb(other)? {
            flush(self.store.get_mut(), &self.config);
            tracing::debug!(
                target: "tdigest",
                other_weight = other.total_weight,
                total_weight = self.total_weight,
                "merged digest"
            );
        }
        Ok(())
    }

    /// Merges all of `digests` into a single new digest built from `config`,
    /// compressing once.
    pub fn merge_digests<I>(config: Config, digests: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Borrow<TDigest>,
    {
        let mut merged = Self::with_config(config)?;
        let mut count = 0usize;
        for digest in digests {
            merged.absorb(digest.borrow())?;
            count += 1;
        }
        merged.compress();
        tracing::debug!(
            target: "tdigest",
            digests = count,
            total_weight = merged.total_weight,
            "merged digests"
        );
        Ok(merged)
    }

    /// Queues `other`'s clusters and buffered points for the next compression.
    /// Returns false if there was nothing to take.
    fn absorb(&mut self, other: &TDigest) -> Result<bool> {
        if other.is_empty() {
            return Ok(false);
        }
        let total_weight = self.total_weight + other.total_weight;
        if !total_weight.is_finite() {
            return Err(DigestError::invalid("total weight", total_weight));
        }
        let sum = self.sum + other.sum;
        if !sum.is_finite() {
            return Err(DigestError::invalid("sum", sum));
        }

        let incoming = other.store.borrow();
        let store = self.store.get_mut();
        store.buffer.extend(
            incoming
                .clusters
                .iter()
                .chain(incoming.buffer.iter())
                .copied(),
        );
        store.summary = None;
        self.total_weight = total_weight;
        self.sum = sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(true)
    }

    /// Forgets all samples, keeping the configuration.
    pub fn clear(&mut self) {
        let store = self.store.get_mut();
        store.clusters.clear();
        store.buffer.clear();
        store.summary = None;
        self.total_weight = 0.0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    /// Returns an estimate for
    /// [quantile](https://en.wikipedia.org/wiki/Quantile) `q` where `0.0 <= q
    /// <= 1.0`.
    ///
    /// For example:
    ///   - `q=0.0` returns the _minimum_
    ///   - `q=0.5` returns the _median_
    ///   - `q=1.0` returns the _maximum_
    pub fn quantile(&self, q: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&q) {
            return Err(DigestError::invalid("quantile", q));
        }
        if self.is_empty() {
            return Err(DigestError::EmptyDigest);
        }
        Ok(self.estimate_quantile(&self.summary(), q))
    }

    #[inline]
    pub fn median(&self) -> Result<f64> {
        self.quantile(0.5)
    }

    /// Estimates several quantiles, failing on the first invalid one.
    pub fn quantiles(&self, qs: &[f64]) -> Result<Vec<f64>> {
        qs.iter().map(|&q| self.quantile(q)).collect()
    }

    /// Estimated fraction of the total weight at or below `value`.
    pub fn cdf(&self, value: f64) -> Result<f64> {
        if value.is_nan() {
            return Err(DigestError::invalid("value", value));
        }
        if self.is_empty() {
            return Err(DigestError::EmptyDigest);
        }
        Ok(self.estimate_cdf(&self.summary(), value))
    }

    /*
     * Both queries walk the same piecewise-linear curve through
     *   (rank 0, min), (anchor_i, mean_i), (total, max)
     * so that cdf(quantile(q)) ~= q. A cluster's anchor is the midpoint of its
     * rank range, except that a first cluster sitting on min holds all of its
     * weight there (anchor at its upper rank), and likewise a last cluster
     * sitting on max (anchor at its lower rank).
     */

    fn anchor(&self, clusters: &[Cluster], i: usize, cumulative: f64) -> f64 {
        let cluster = &clusters[i];
        if i == 0 && cluster.mean <= self.min {
            cumulative + cluster.weight
        } else if i + 1 == clusters.len() && cluster.mean >= self.max {
            cumulative
        } else {
            cumulative + cluster.weight / 2.0
        }
    }

    fn estimate_quantile(&self, clusters: &[Cluster], q: f64) -> f64 {
        if q <= 0.0 {
            return self.min;
        }
        if q >= 1.0 {
            return self.max;
        }

        let total = self.total_weight;
        let rank = q * total;

        let mut prev_rank = 0.0;
        let mut prev_mean = self.min;
        let mut cumulative = 0.0;
        for (i, cluster) in clusters.iter().enumerate() {
            let anchor = self.anchor(clusters, i, cumulative);
            if rank <= anchor {
                let span = anchor - prev_rank;
                let value = if span > 0.0 {
                    prev_mean + (rank - prev_rank) / span * (cluster.mean - prev_mean)
                } else {
                    prev_mean
                };
                return value.clamp(self.min, self.max);
            }
            cumulative += cluster.weight;
            prev_rank = anchor;
            prev_mean = cluster.mean;
        }

        // Past the last anchor, head for the maximum.
        let span = total - prev_rank;
        let value = if span > 0.0 {
            prev_mean + (rank - prev_rank) / span * (self.max - prev_mean)
        } else {
            self.max
        };
        value.clamp(self.min, self.max)
    }

    fn estimate_cdf(&self, clusters: &[Cluster], value: f64) -> f64 {
        // max first, so a digest of identical values reports 1 at that value
        if value >= self.max {
            return 1.0;
        }
        if value < self.min {
            return 0.0;
        }

        let total = self.total_weight;

        let mut prev_rank = 0.0;
        let mut prev_mean = self.min;
        let mut cumulative = 0.0;
        for (i, cluster) in clusters.iter().enumerate() {
            let anchor = self.anchor(clusters, i, cumulative);
            if value < cluster.mean {
                let span = cluster.mean - prev_mean;
                let rank = if span > 0.0 {
                    prev_rank + (value - prev_mean) / span * (anchor - prev_rank)
                } else {
                    prev_rank
                };
                return (rank / total).clamp(0.0, 1.0);
            }
            cumulative += cluster.weight;
            prev_rank = anchor;
            prev_mean = cluster.mean;
        }

        let span = self.max - prev_mean;
        let rank = if span > 0.0 {
            prev_rank + (value - prev_mean) / span * (total - prev_rank)
        } else {
            total
        };
        (rank / total).clamp(0.0, 1.0)
    }

    /// Rebuilds a digest from already-validated parts.
    #[cfg(feature = "serde")]
    pub(crate) fn from_parts(
        config: Config,
        clusters: Vec<Cluster>,
        sum: f64,
        min: f64,
        max: f64,
    ) -> Self {
        let mut digest = Self::from_valid_config(config);
        digest.total_weight = clusters.iter().map(Cluster::weight).sum();
        if digest.total_weight > 0.0 {
            digest.sum = sum;
            digest.min = min;
            digest.max = max;
        }
        let store = digest.store.get_mut();
        store.clusters = clusters.clone();
        store.summary = Some(clusters);
        digest
    }

    /// Compresses and hands back the config, clusters, sum, min and max.
    #[cfg(feature = "serde")]
    pub(crate) fn into_parts(mut self) -> (Config, Vec<Cluster>, f64, f64, f64) {
        self.compress();
        let store = self.store.into_inner();
        let clusters = store.summary.unwrap_or_default();
        (self.config, clusters, self.sum, self.min, self.max)
    }
}

/// Folds the buffer into the working clusters. Candidates are shuffled before
/// a stable sort by mean so that equal means do not always cluster the same
/// way.
fn flush(store: &mut Store, config: &Config) {
    if store.buffer.is_empty() {
        return;
    }

    let mut candidates = std::mem::take(&mut store.clusters);
    candidates.append(&mut store.buffer);
    let n_candidates = candidates.len();
    candidates.shuffle(&mut store.rng);
    candidates.sort_by_key(|c| FloatOrd(c.mean));

    store.clusters = merge_clusters(config.scale, config.working_compression(), candidates);
    store.summary = None;
    tracing::trace!(
        target: "tdigest",
        candidates = n_candidates,
        clusters = store.clusters.len(),
        "compressed"
    );
}

/// Flushes the buffer, then rebuilds the summary if it is stale.
fn compress_store(store: &mut Store, config: &Config) {
    flush(store, config);
    if store.summary.is_none() {
        let summary = merge_clusters(config.scale, config.compression, store.clusters.clone());
        tracing::trace!(
            target: "tdigest",
            clusters = store.clusters.len(),
            summary = summary.len(),
            "summarized"
        );
        store.summary = Some(summary);
    }
}

/// Merge adjacent clusters while keeping clusters smaller than the upper
/// bound determined by the scaling function.
fn merge_clusters(
    scale: ScaleFunction,
    compression: f64,
    sorted_clusters: Vec<Cluster>,
) -> Vec<Cluster> {
    let total_weight: f64 = sorted_clusters.iter().map(Cluster::weight).sum();
    let mut sorted_clusters = sorted_clusters.into_iter();
    let Some(mut current_merge) = sorted_clusters.next() else {
        return Vec::new();
    };

    let mut merged_clusters: Vec<Cluster> = Vec::new();
    let mut weight_so_far = 0.0;
    let mut q_limit = scale.q_limit(0.0, compression);
    for cluster in sorted_clusters {
        let q = (weight_so_far + current_merge.weight + cluster.weight) / total_weight;
        // Once k runs out of range the rest of the tail is one cluster.
        if q_limit >= 1.0 || q <= q_limit {
            current_merge += cluster;
        } else {
            // Finish the current merge and start a new one.
            weight_so_far += current_merge.weight;
            q_limit = scale.q_limit(weight_so_far / total_weight, compression);
            merged_clusters.push(std::mem::replace(&mut current_merge, cluster));
        }
    }
    merged_clusters.push(current_merge);
    merged_clusters.sort(); // Only necessary to fix float imprecision.

    debug_assert!(merged_clusters.iter().all(|c| c.weight > 0.0));
    debug_assert!({
        let merged_weight: f64 = merged_clusters.iter().map(Cluster::weight).sum();
        merged_weight == total_weight
            || (merged_weight - total_weight).abs() <= 1e-9 * total_weight
    });
    merged_clusters
}
