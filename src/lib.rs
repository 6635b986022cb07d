// Clipsmith library entry point
//
// Clip extraction, compilation and storyline assembly over a catalog of
// transcribed videos. The CLI in cli.rs is a thin layer over these modules.

pub mod clips;
pub mod compile;
pub mod config;
pub mod constants;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod media;
pub mod naming;
pub mod storage;
pub mod storyline;
pub mod tools;
pub mod transcripts;
pub mod videos;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, Result};
