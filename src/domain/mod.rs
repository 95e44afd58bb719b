pub mod error;
pub mod model;

pub use error::LifecycleError;
pub use model::{Service, ServiceSnapshot, ServiceState};
