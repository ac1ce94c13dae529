mod components;
mod config;
mod counters;
mod error;
mod gateway;
mod ingestor;
pub mod measure;
mod scheduler;
mod summary;
mod window;

pub use crate::components::*;
pub use crate::config::{EmissionPolicy, WindowConfig};
pub use crate::counters::IngestStats;
pub use crate::error::WindowError;
pub use crate::gateway::{AllowList, GatewayId, Rssi};
pub use crate::ingestor::EventIngestor;
pub use crate::scheduler::{RotationLatency, WindowScheduler};
pub use crate::summary::{GatewayStats, Summary};
pub use crate::window::Window;
