use thiserror::Error;

use super::model::ServiceState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Service manager unreachable: {0}")]
    Unreachable(String),

    #[error("Service manager rejected the request: {0}")]
    BackendRejected(String),

    #[error("A download is already in progress")]
    AlreadyInProgress,

    #[error("Not possible while the service is {state}")]
    NotReady { state: ServiceState },

    #[error("Another operation is still pending for this service")]
    Busy,

    #[error("No download progress reported after {misses} polls")]
    ProgressUnavailable { misses: u32 },

    #[error("Invalid service id: {0:?}")]
    InvalidServiceId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_names_state() {
        let err = LifecycleError::NotReady {
            state: ServiceState::Downloading,
        };
        assert_eq!(err.to_string(), "Not possible while the service is downloading");
    }
}
