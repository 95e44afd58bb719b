pub mod intent_adapter;
pub mod lifecycle_coordinator;
pub mod progress_poller;

pub use intent_adapter::{Intent, IntentAdapter, IntentOutcome};
pub use lifecycle_coordinator::LifecycleCoordinator;
pub use progress_poller::PollConfig;
