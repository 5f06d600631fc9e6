pub mod lifecycle;
pub mod recorder;
pub mod recording;
pub mod state_machine;
