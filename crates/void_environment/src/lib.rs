//! # void_environment - Environment Context
//!
//! Ties the loading substrate together behind one owner:
//! - [`Environment`] owns the entity registry, resource cache, asset pipeline,
//!   dispatch chain, property synchronizer and scene sink
//! - Batch loading where one failed entity never stops the rest
//! - Inbound operations routed to the synchronizer or straight to dispatch
//! - A per-tick driver applying fetch results, deferred attachments and
//!   filtered values on the owning thread
//! - TOML configuration with `VOID_ENV_*` overrides
//!
//! ## Example
//!
//! ```ignore
//! use void_environment::prelude::*;
//!
//! let mut env = Environment::builder(EnvironmentConfig::load())
//!     .decoders(decoders)
//!     .sink(MyScene::new())
//!     .build()?;
//!
//! let report = env.load_batch(descriptors);
//! loop {
//!     for op in inbound.try_iter() {
//!         env.apply(&op)?;
//!     }
//!     env.tick(clock.elapsed());
//! }
//! ```

pub mod batch;
pub mod config;
pub mod environment;
pub mod error;

pub use batch::BatchReport;
pub use config::{CacheConfig, EnvironmentConfig, CONFIG_FILES};
pub use environment::{Environment, EnvironmentBuilder, TickReport};
pub use error::{EnvironmentError, EnvironmentResult};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::batch::BatchReport;
    pub use crate::config::EnvironmentConfig;
    pub use crate::environment::{Environment, EnvironmentBuilder, TickReport};
    pub use crate::error::{EnvironmentError, EnvironmentResult};
    pub use void_core::{CancellationToken, EntityId, Version};
    pub use void_dispatch::{InboundOperation, PropertyKey, PropertyValue, SceneSink};
    pub use void_entity::{EntityDescriptor, EntityPayload};
}
