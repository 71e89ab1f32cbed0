//! Error types for the event indexer repository.
//!
//! This module provides a unified error type for all indexing operations.

mod index_error;

pub use index_error::{IndexError, IndexErrorKind};
