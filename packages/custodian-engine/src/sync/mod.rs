//! Leaf concurrency primitives: [`Semaphore`] and [`CapacitySet`].
//!
//! These have no dependency on anything else in this crate and sit at the
//! bottom of the dependency order: the retry facade, batched writer, and
//! reclaimer are all built on top of them.

pub mod capacity_set;
pub mod semaphore;

pub use capacity_set::CapacitySet;
pub use semaphore::Semaphore;
