//! # void_sync - Property Synchronization
//!
//! Smooths authoritative property updates that arrive sparsely over the
//! network:
//! - One scalar Kalman filter per value channel
//! - Measurement rate learned from arrival intervals
//! - Per-tick regression between the shown and the filtered value
//! - Rotations filtered as forward and up directions
//! - Output through the regular dispatch path via [`ChainSink`]
//!
//! ## Example
//!
//! ```ignore
//! use void_sync::prelude::*;
//!
//! let mut sync = PropertySynchronizer::new(SyncConfig::default());
//! sync.start(id, PropertyKey::POSITION, Vec3::ZERO.into(), now)?;
//! sync.on_measurement(id, PropertyKey::POSITION, &Vec3::X.into(), later)?;
//! sync.tick(frame, &mut ChainSink::new(&chain, &mut ctx));
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod sink;
pub mod strategy;
pub mod synchronizer;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use filter::ChannelFilter;
pub use sink::{ChainSink, UpdateSink};
pub use strategy::{decompose, look_rotation, FilterStrategy};
pub use synchronizer::PropertySynchronizer;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::sink::{ChainSink, UpdateSink};
    pub use crate::synchronizer::PropertySynchronizer;
}
