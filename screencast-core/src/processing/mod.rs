pub mod audio_graph;
pub mod audio_mixer;
pub mod compressor;
pub mod ring_buffer;
