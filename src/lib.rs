pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod models;
pub(crate) mod reconcile;
pub mod scheduler;

pub use cache::{ReadFilter, StateCache};
pub use config::Config;
pub use dispatch::ActionOutcome;
pub use engine::Engine;
pub use error::{ActionError, ApiError, RegionUnavailable};
pub use events::CacheEvent;
pub use models::{Instance, InstanceAction, InstanceState, Region};
