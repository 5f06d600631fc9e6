pub mod chunk_log;
pub mod codec;
pub mod driver;
