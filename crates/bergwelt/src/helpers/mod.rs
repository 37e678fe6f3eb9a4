pub mod errors;
pub use errors::*;

pub mod channel;

pub mod logging;
pub use logging::*;
