use float_ord::FloatOrd;
use std::{
    cmp::Ordering,
    ops::{Add, AddAssign},
};

/// A cluster of samples collapsed to their weighted mean.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    pub(crate) mean: f64,
    pub(crate) weight: f64,
}

impl PartialEq for Cluster {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        FloatOrd(self.mean) == FloatOrd(other.mean)
            && FloatOrd(self.weight) == FloatOrd(other.weight)
    }
}
impl Eq for Cluster {}

impl PartialOrd for Cluster {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cluster {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        FloatOrd(self.mean)
            .cmp(&FloatOrd(other.mean))
            .then_with(|| FloatOrd(self.weight).cmp(&FloatOrd(other.weight)))
    }
}

impl Add for Cluster {
    type Output = Self;

    #[inline]
    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for Cluster {
    /// Folds `rhs` in, keeping the mean between the two input means.
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        let weight = self.weight + rhs.weight;
        self.mean += (rhs.mean - self.mean) * (rhs.weight / weight);
        self.weight = weight;
    }
}

impl Cluster {
    /// Panics if `weight` is not finite and positive; callers validate user
    /// input before it gets here.
    #[inline]
    pub fn new(mean: f64, weight: f64) -> Self {
        assert!(
            weight.is_finite() && weight > 0.0,
            "cluster weight must be finite and positive, got {weight}"
        );
        Self { mean, weight }
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_weighted_mean() {
        let c = Cluster::new(1.0, 1.0) + Cluster::new(4.0, 3.0);
        assert_eq!(c.weight(), 4.0);
        assert!((c.mean() - 3.25).abs() < 1e-12);
    }

    #[test]
    fn test_add_same_mean_is_stable() {
        let mut c = Cluster::new(0.1, 7.0);
        for _ in 0..1000 {
            c += Cluster::new(0.1, 1.0);
        }
        assert_eq!(c.mean(), 0.1);
        assert_eq!(c.weight(), 1007.0);
    }

    #[test]
    fn test_ordering_by_mean() {
        let mut clusters = vec![
            Cluster::new(3.0, 1.0),
            Cluster::new(-1.0, 2.0),
            Cluster::new(2.0, 5.0),
        ];
        clusters.sort();
        let means: Vec<f64> = clusters.iter().map(Cluster::mean).collect();
        assert_eq!(means, vec![-1.0, 2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "cluster weight must be finite and positive")]
    fn test_zero_weight_panics() {
        Cluster::new(1.0, 0.0);
    }
}
