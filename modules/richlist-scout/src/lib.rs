pub mod cascade;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod run_log;
pub mod sources;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
