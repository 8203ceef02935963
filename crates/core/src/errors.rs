use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use crate::domain::order::OrderStatus;
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_errors_wrap_into_application_errors() {
        let error = ApplicationError::from(DomainError::InvalidStatusTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Completed,
        });
        assert!(matches!(error, ApplicationError::Domain(_)));
    }

    #[test]
    fn persistence_error_carries_detail() {
        let error = ApplicationError::Persistence("database lock timeout".to_owned());
        assert!(error.to_string().contains("database lock timeout"));
    }
}
