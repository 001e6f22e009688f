//! End-to-end test support for reverie-core
//!
//! - [`harness`]: isolated engines backed by a temporary state directory
//! - [`mocks`]: deterministic collaborators and test data

pub mod harness;
pub mod mocks;

pub use harness::TestEngineManager;
pub use mocks::{
    FailingGenerator, MockEmbedder, MockGenerator, MockSummarizer, TestDataFactory, init_tracing,
    DIM,
};
