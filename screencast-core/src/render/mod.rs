pub mod canvas_track;
pub mod driver;
pub mod ticker;
