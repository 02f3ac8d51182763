pub mod channels;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod loyalty;
pub mod types;

pub use config::AppConfig;
pub use error::{OmnilyError, OmnilyResult};
