pub mod compositor;
pub mod geometry;
pub mod resize;
