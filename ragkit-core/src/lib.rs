//! Core library for ragkit: retrieval-augmented generation over hosted
//! embedding, vector-index, and text-generation APIs.
//!
//! The typical flow is to load a [`config::RagConfig`], build a
//! [`rag::RagPipeline`] from it, ingest documents, and ask questions:
//!
//! ```no_run
//! # async fn run() -> Result<(), ragkit_core::error::RagError> {
//! use ragkit_core::{config, rag::RagPipeline};
//!
//! let cfg = config::load_config(None, None).map_err(|e| {
//!     ragkit_core::error::ConfigError::Invalid { message: e.to_string() }
//! })?;
//! let pipeline = RagPipeline::from_config(&cfg)?;
//! pipeline.ingest_path(std::path::Path::new("docs/")).await?;
//! let answer = pipeline.answer("How do I configure retries?").await?;
//! println!("{}", answer.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod providers;
pub mod rag;
pub mod retry;
pub mod structured;
pub mod types;

pub use config::RagConfig;
pub use error::RagError;
pub use rag::{RagAnswer, RagPipeline};
pub use structured::StructuredExtractor;
