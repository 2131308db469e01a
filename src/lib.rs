//! Weighted, mergeable T-Digest in Rust
//!
//! A data structure for approximating the [quantile
//! function](https://en.wikipedia.org/wiki/Quantile_function) of a sample
//! distribution. T-digests have bounded memory requirements, making them useful
//! for streaming data analysis, and they can be merged, so partial digests
//! built on separate workers combine into one.
//!
//! [t-digest
//! paper](https://github.com/tdunning/t-digest/blob/main/docs/t-digest-paper/histo.pdf)
//!
//! ## Example
//!
//! ```rust
//! use tdigest_core::TDigest;
//!
//! let mut t = TDigest::new(100.0).unwrap();
//! t.add_all((1..=1_000_000).map(f64::from)).unwrap();
//!
//! let ans = t.quantile(0.99).unwrap();
//! let expected: f64 = 990_000.0;
//!
//! let percentage: f64 = (expected - ans).abs() / expected;
//! assert!(percentage < 0.01);
//! ```
//!
//! ## Merging
//!
//! ```rust
//! use tdigest_core::TDigest;
//!
//! let mut left = TDigest::new(100.0).unwrap();
//! let mut right = TDigest::new(100.0).unwrap();
//! left.add(1.0, 2.0).unwrap();
//! right.add(3.0, 2.0).unwrap();
//!
//! left.merge(&right).unwrap();
//! assert_eq!(left.total_weight(), 4.0);
//! assert_eq!(left.quantile(1.0).unwrap(), 3.0);
//! ```
//!
//! ## Feature flags
//!
//! - `serde`: (de)serialize a digest through `DigestState`, so it can be
//!   shipped elsewhere and merged there.

mod cluster;
mod config;
mod error;
mod scale;
#[cfg(feature = "serde")]
mod snapshot;
mod t_digest;

pub use cluster::*;
pub use config::*;
pub use error::*;
pub use scale::*;
#[cfg(feature = "serde")]
pub use snapshot::*;
pub use t_digest::*;
