//! Common utilities and shared types for murmur.
//!
//! This crate provides the foundational components used across the murmur
//! workspace:
//!
//! - **Configuration**: application settings via [`Config`]
//! - **Error handling**: unified error types via [`AppError`] and [`AppResult`]
//! - **ID generation**: ULID/UUID identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use murmur_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     println!("backend at {}", config.backend.url);
//!     println!("generated id: {}", id_gen.generate());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{BackendConfig, Config, FeedConfig, SearchConfig, StorageConfig};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
