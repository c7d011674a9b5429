use thiserror::Error;

/// Error taxonomy for the Taskfleet control plane.
///
/// `Validation`, `NotFound` and `QueueFull` are surfaced to HTTP callers
/// with dedicated status codes; everything else is absorbed internally or
/// mapped to a generic 500 by the adapter.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Task queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = FleetError::Validation("missing field: id".to_string());
        assert_eq!(e.to_string(), "Validation error: missing field: id");

        let e = FleetError::QueueFull(1000);
        assert_eq!(e.to_string(), "Task queue is full (capacity 1000)");

        let e = FleetError::NotFound("worker w1".to_string());
        assert_eq!(e.to_string(), "Not found: worker w1");
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: FleetError = err.into();
        assert!(matches!(e, FleetError::Json(_)));
    }
}
