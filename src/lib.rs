//! Zeppelin remote index build: offloads vector index construction to a
//! remote build service, falling back to a local build on failure.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod repository;
pub mod storage;
pub mod strategy;
pub mod stream;
pub mod types;
pub mod vectors;
