pub mod config;
pub use config::*;

pub mod config_loader;
pub use config_loader::load_config;

pub mod worker;
pub use worker::*;

pub mod context;
pub use context::*;
