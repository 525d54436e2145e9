//! Migration System
//!
//! [`definitions`] holds the registry types and reports, [`runner`] the
//! [`Migrator`] that reconciles them with the tracking table.

pub mod definitions;
pub mod runner;

pub use definitions::*;
pub use runner::{Migrator, TrackingLookup};
