//! The sync pipeline.
//!
//! Ties the other crates together into one idempotent pass over the
//! upstream: [`detect`] decides what might have changed, [`gather`]
//! resolves candidates concurrently, the converter renders what actually
//! did, and [`Publisher`] lands every rendering in the durable store and
//! the double-buffered volatile cache. [`Runner::run`] is the entry point.

pub mod detect;
pub mod error;
mod gather;
mod publish;
mod run;
mod shard;

pub use crate::detect::{Candidate, Detector, IndexPlan, ListingProbe, SyncPlan, VersionProbe};
pub use crate::gather::{Resolution, Resolved, gather};
pub use crate::publish::{CachedHead, Publisher, read_published};
pub use crate::run::{RunOptions, RunReport, Runner};
pub use crate::shard::{MAX_PART_LEN, join, shard};
