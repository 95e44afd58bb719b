use std::sync::LazyLock;

use regex::Regex;

use crate::domain::LifecycleError;

/// The service manager uses the id as a file name, so keep it path-safe.
static SERVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("valid regex"));

/// Trim and validate a user-supplied service id
pub fn validate_service_id(raw: &str) -> Result<&str, LifecycleError> {
    let service_id = raw.trim();
    if SERVICE_ID.is_match(service_id) {
        Ok(service_id)
    } else {
        Err(LifecycleError::InvalidServiceId(service_id.to_string()))
    }
}

/// Backend progress arrives as a float percentage; floor and clamp it.
pub fn percent_from_reported(reported: f64) -> u8 {
    if reported.is_nan() {
        return 0;
    }
    reported.floor().clamp(0.0, 100.0) as u8
}
