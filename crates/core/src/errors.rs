use thiserror::Error;

use crate::domain::turn::TurnId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("turn `{0}` is not held by the telemetry bus")]
    UnknownTurn(TurnId),
    #[error("unknown experiment `{0}`")]
    UnknownExperiment(String),
    #[error("experiment `{0}` is not running")]
    ExperimentNotRunning(String),
    #[error("unknown training batch `{0}`")]
    UnknownBatch(String),
}

/// Failure of a signal extractor. Callers treat it as "no signal".
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("scorer `{scorer}` is unavailable: {reason}")]
    Unavailable { scorer: &'static str, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("export failure: {0}")]
    Export(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(
                error @ (DomainError::UnknownTurn(_)
                | DomainError::UnknownExperiment(_)
                | DomainError::UnknownBatch(_)),
            ) => Self::NotFound { message: error.to_string(), correlation_id },
            ApplicationError::Domain(error @ DomainError::ExperimentNotRunning(_)) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) | ApplicationError::Export(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::turn::TurnId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn unknown_experiment_maps_to_not_found() {
        let interface = ApplicationError::from(DomainError::UnknownExperiment("ab-1".to_owned()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref correlation_id, ref message }
                if correlation_id == "req-1" && message.contains("ab-1")
        ));
        assert_eq!(interface.user_message(), "The requested resource does not exist.");
    }

    #[test]
    fn stopped_experiment_maps_to_bad_request() {
        let interface =
            ApplicationError::from(DomainError::ExperimentNotRunning("ab-2".to_owned()))
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn evicted_turn_maps_to_not_found() {
        let interface = ApplicationError::from(DomainError::UnknownTurn(TurnId("c#1".to_owned())))
            .into_interface("req-3");
        assert_eq!(interface.correlation_id(), "req-3");
        assert!(matches!(interface, InterfaceError::NotFound { .. }));
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Integration("alert endpoint refused".to_owned()).into_interface("r");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid alert url".to_owned()).into_interface("r");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
