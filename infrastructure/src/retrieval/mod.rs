//! Local-document retrieval adapters

pub mod keyword;

pub use keyword::{DEFAULT_RETRIEVAL_SIZE, KeywordRetrievalClient};
