use std::f64::consts::PI;

/// Scale function bounding how much weight a cluster may absorb at a given
/// position in the distribution.
///
/// Each cluster may span at most one unit of `k`, so a steep `k(q)` near the
/// tails yields small, accurate clusters there and larger ones around the
/// median.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScaleFunction {
    /// `k(q, d) = d / (2π) * asin(2q - 1)`
    #[default]
    K1,
    /// Piecewise square root, see [ScaleFunction::k].
    Sqrt,
}

/*
 * A good biased scaling function has the following properties:
 *   - The limit of the derivative of the function dk/dq at 0 is inf, and at
 *     1 is inf. This provides bias to improve accuracy at the tails.
 *   - For any q <= 0.5, dk/dq(q) = dk/dq(1-q). This ensures that the accuracy
 *     of upper and lower quantiles are equivalent.
 *
 * K1 spans [-d/4, d/4], giving roughly d/2 clusters.
 *
 * Sqrt spans [0, d]:
 *   k(q, d) = (IF q >= 0.5, d - d * sqrt(2 - 2q) / 2, d * sqrt(2q) / 2)
 *   dk/dq = (IF q >= 0.5, d / sqrt(2-2q), d / sqrt(2q))
 */

impl ScaleFunction {
    /// Maps quantile `q` to k-space for compression `d`. `q` is clamped to
    /// `[0, 1]`.
    pub fn k(&self, q: f64, d: f64) -> f64 {
        let q = q.clamp(0.0, 1.0);
        match self {
            Self::K1 => d / (2.0 * PI) * (2.0 * q - 1.0).asin(),
            Self::Sqrt => {
                if q >= 0.5 {
                    d - d * (0.5 - 0.5 * q).sqrt()
                } else {
                    d * (0.5 * q).sqrt()
                }
            }
        }
    }

    /// Inverse of [ScaleFunction::k]. `k` is clamped to the function's range.
    pub fn q(&self, k: f64, d: f64) -> f64 {
        match self {
            Self::K1 => {
                let range = 0.25 * d;
                let k = k.clamp(-range, range);
                (((2.0 * PI * k / d).sin() + 1.0) / 2.0).clamp(0.0, 1.0)
            }
            Self::Sqrt => {
                let k_div_d = (k / d).clamp(0.0, 1.0);
                if k_div_d >= 0.5 {
                    let base = 1.0 - k_div_d;
                    1.0 - 2.0 * base * base
                } else {
                    2.0 * k_div_d * k_div_d
                }
            }
        }
    }

    /// Largest quantile a cluster starting at `q0` may reach, one unit of `k`
    /// further along.
    #[inline]
    pub(crate) fn q_limit(&self, q0: f64, d: f64) -> f64 {
        self.q(self.k(q0, d) + 1.0, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_k1_endpoints() {
        let d = 100.0;
        assert!((ScaleFunction::K1.k(0.5, d)).abs() < EPS);
        assert!((ScaleFunction::K1.k(0.0, d) + d / 4.0).abs() < EPS);
        assert!((ScaleFunction::K1.k(1.0, d) - d / 4.0).abs() < EPS);
    }

    #[test]
    fn test_sqrt_endpoints() {
        let d = 100.0;
        assert_eq!(ScaleFunction::Sqrt.k(0.0, d), 0.0);
        assert!((ScaleFunction::Sqrt.k(0.5, d) - d / 2.0).abs() < EPS);
        assert_eq!(ScaleFunction::Sqrt.k(1.0, d), d);
    }

    #[test]
    fn test_inverse() {
        for scale in [ScaleFunction::K1, ScaleFunction::Sqrt] {
            for d in [10.0, 100.0, 1000.0] {
                for i in 0..=100 {
                    let q = i as f64 / 100.0;
                    let q2 = scale.q(scale.k(q, d), d);
                    assert!((q - q2).abs() < 1e-6, "{scale:?} d={d} q={q} q2={q2}");
                }
            }
        }
    }

    #[test]
    fn test_clamping() {
        for scale in [ScaleFunction::K1, ScaleFunction::Sqrt] {
            assert_eq!(scale.k(-0.1, 50.0), scale.k(0.0, 50.0));
            assert_eq!(scale.k(1.1, 50.0), scale.k(1.0, 50.0));
            assert_eq!(scale.q(1e9, 50.0), 1.0);
            assert_eq!(scale.q(-1e9, 50.0), 0.0);
        }
    }

    #[test]
    fn test_tails_get_smaller_clusters() {
        for scale in [ScaleFunction::K1, ScaleFunction::Sqrt] {
            let d = 100.0;
            let tail = scale.q_limit(0.0, d);
            let middle = scale.q_limit(0.5, d) - 0.5;
            assert!(tail > 0.0);
            assert!(tail < middle, "{scale:?} tail={tail} middle={middle}");

            // symmetric around the median
            let upper = 1.0 - scale.q(scale.k(1.0, d) - 1.0, d);
            assert!((tail - upper).abs() < 1e-9);
        }
    }
}
