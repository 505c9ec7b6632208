//! clipbrain - content intelligence for short-form video catalogs
//!
//! Turns a creator's own video records into searchable embedded fragments,
//! ranks them with a multi-factor score, and derives clusters, viral-potential
//! predictions and insights from the index. Outcome feedback tunes the
//! per-account ranking weights.

pub mod account;
pub mod analytics;
pub mod brain;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod content;
pub mod embedding;
pub mod error;
pub mod retrieval;
pub mod stats;
pub mod storage;

pub use brain::{Brain, OutcomeReceipt};
pub use error::{BrainError, Result};
