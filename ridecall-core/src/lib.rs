pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hub;
pub mod link;
pub mod logging;
pub mod models;
pub mod registry;
pub mod ride;
pub mod singleflight;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::MediaRegistry;
pub use ride::RideService;
