//! # Hasher Jitter
//!
//! Temporal-loop inference over double SHA-256.
//!
//! This crate provides:
//! - The 80-byte camouflaged header codec (semantic slots in mining fields)
//! - Flash search: a three-zone associative memory over training frames
//! - The 21-pass jitter engine and golden nonce hunting
//! - Token resolution by nonce or by context
//! - JSON loading of training frames
//!
//! ```no_run
//! use std::sync::Arc;
//! use hasher_jitter::{header, FlashSearcher, JitterConfig, JitterEngine};
//!
//! let config = JitterConfig::default();
//! let searcher = Arc::new(FlashSearcher::new(&config));
//! hasher_jitter::loader::load_from_directory(&searcher, "data/frames").unwrap();
//!
//! let engine = JitterEngine::new(searcher, config);
//! let result = engine.execute_loop(header::encode(&[0; 12], 0), 42);
//! println!("nonce {:08x} alignment {:.3}", result.nonce, result.alignment);
//! ```

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod flash_search;
pub mod header;
pub mod loader;
pub mod resolve;
pub mod types;

// Re-exports for convenience
pub use backend::{HashBackend, SoftwareHasher};
pub use config::{JitterConfig, JitterConfigBuilder};
pub use engine::{
    compute_alignment, compute_pass_reward, compute_stability, EngineStatistics, JitterEngine,
};
pub use error::{JitterError, Result};
pub use flash_search::{default_jitter, FlashSearcher, IndexSummary};
pub use header::InjectionStrategy;
pub use types::{
    GoldenNonceResult, HashState, JitterVector, PassRecord, SearchStats, SearchZone, Slots,
    TrainingFrame, SLOT_COUNT,
};
