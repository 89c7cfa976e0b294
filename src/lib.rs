pub mod cancel;
pub mod checkpoint;
pub mod chunk_plan;
pub mod cli;
pub mod config;
pub mod correction;
pub mod dedup;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod postprocess;
pub mod report;
pub mod service;
pub mod structure;
pub mod util;
