//! Receipt Scanner
//!
//! An extraction service that reads receipt images through generative vision
//! models, plus the upload client that feeds it.
//!
//! # Modules
//!
//! - `scan`: ordered model fallback and response normalization
//! - `routes`: HTTP surface (`POST /api/scan`, health)
//! - `shield`: bot gate in front of the scan endpoint
//! - `client`: upload client with size ceiling and busy guard
//! - `jobs`: background-job event client

pub mod client;
pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod scan;
pub mod shield;
pub mod state;
