//! WebM (Matroska) output
//!
//! A streaming muxer writing one SimpleBlock per sample, plus a small
//! reader used to inspect finished recordings.

pub mod ebml;
pub mod reader;
pub mod writer;

pub use reader::{parse, probe, BlockInfo, WebmInfo};
pub use writer::{
    new_simple_block_writer, AudioSettings, BlockWriter, TrackEntry, TrackType, VideoSettings,
};
