pub mod bootstrap;
pub mod cycle;
pub mod fetchers;
pub mod orchestrator;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
