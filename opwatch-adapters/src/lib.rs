//! # opwatch-adapters
//!
//! Ready-made building blocks for plugging backends into the opwatch
//! polling core.
//!
//! ## Supported Sources
//!
//! - **HTTP/JSON** (`http` feature) - polls a JSON endpoint into a cache,
//!   reads a health string out of the response, and serves issue lists
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use opwatch_adapters::http::{json_status, HttpJsonSource};
//! use opwatch_core::Cache;
//!
//! # fn main() -> Result<(), opwatch_adapters::AdapterError> {
//! let source = HttpJsonSource::builder()
//!     .endpoint("http://localhost:8080/health")
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//!
//! let health = Cache::builder("Health")
//!     .owner("Http", "api")
//!     .interpret(json_status("/status"))
//!     .build(source.fetcher::<serde_json::Value>());
//! # let _ = health;
//! # Ok(())
//! # }
//! ```

pub mod error;

#[cfg(feature = "http")]
pub mod http;

pub use error::AdapterError;
