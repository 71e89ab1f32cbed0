//! Interface definitions for the indexing client.
//!
//! This module defines the abstract `IndexingClient` trait that allows
//! for dependency injection and swappable search backend implementations.

mod indexing_client;

pub use indexing_client::IndexingClient;
