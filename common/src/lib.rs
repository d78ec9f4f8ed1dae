//! Shared voxel containers and process setup for the microglia workspace.

pub mod bit_buffer3;
pub mod buffer3;
pub mod log_setup;

pub use bit_buffer3::BitBuffer3;
pub use buffer3::Buffer3;
