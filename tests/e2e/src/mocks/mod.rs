//! Mock collaborators and test data factory

mod fixtures;

pub use fixtures::{
    DIM, FailingGenerator, MockEmbedder, MockGenerator, MockSummarizer, TestDataFactory,
    init_tracing,
};
