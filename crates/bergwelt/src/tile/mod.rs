pub mod id;
pub use id::*;

pub mod srs;
pub use srs::*;

pub mod aabb;
pub use aabb::*;

pub mod heights;
pub use heights::*;

pub mod types;
pub use types::*;

pub mod draw_list;
pub use draw_list::*;
