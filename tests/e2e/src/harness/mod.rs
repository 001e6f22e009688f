//! Test harness
//!
//! Isolated engine instances with their own state directory.

mod engine_manager;

pub use engine_manager::TestEngineManager;
