pub mod config;

pub use config::{ConfigStore, ServiceTarget, DEFAULT_ENDPOINT};
