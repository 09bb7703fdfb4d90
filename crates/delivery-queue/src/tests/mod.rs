//! Integration tests for the delivery worker.
//!
//! - `harness.rs`     - Mock transport with scripted responses and a test harness
//! - `retry.rs`       - Attempt counting, retry limits and failure reporting
//! - `ordering.rs`    - Pop order and batching
//! - `persistence.rs` - Re-hydration and storage degradation
//! - `offline.rs`     - Connectivity handling and worker lifecycle

mod offline;

#[allow(unused_imports)]
pub use harness::{MockTransport, ScriptedResponse, TestHarness};
