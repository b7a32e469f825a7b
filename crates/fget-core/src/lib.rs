//! Multi-threaded resumable HTTP download engine.
//!
//! [`scheduler::Engine`] is the entry point: it owns the task table, a
//! bounded worker pool, and the process-wide resources (rate limiter, host
//! policy, connection budget, callback bus) every download shares.

pub mod callbacks;
pub mod checkpoint;
pub mod checksum;
pub mod config;
pub mod controller;
pub mod downloader;
pub mod error;
pub mod fetch_head;
pub mod host_policy;
pub mod logging;
pub mod ratelimiter;
pub mod retry;
pub mod scheduler;
pub mod segmenter;
pub mod storage;
pub mod task;
pub mod transport;
pub mod url_model;

pub use callbacks::Callbacks;
pub use config::EngineConfig;
pub use error::EngineError;
pub use scheduler::Engine;
pub use task::{Task, TaskSnapshot, TaskStatus};
