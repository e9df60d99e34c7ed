//! Error taxonomy for permit operations.
//!
//! Only caller mistakes are errors. Partial grants, clamped releases and
//! revocations that run out of holders are reported through the values of
//! successful responses instead.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermitError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider '{provider_id}' holds no permits")]
    NotFound { provider_id: String },

    #[error("Cannot resize pool to {requested}: {allocated} permits are currently allocated")]
    Conflict { requested: u64, allocated: u64 },
}

impl PermitError {
    /// Stable discriminator for RPC error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            PermitError::InvalidArgument(_) => "invalid_argument",
            PermitError::NotFound { .. } => "not_found",
            PermitError::Conflict { .. } => "conflict",
        }
    }

    pub(crate) fn empty_provider() -> Self {
        PermitError::InvalidArgument("provider_id must not be empty".to_string())
    }

    pub(crate) fn non_positive(field: &str, value: i64) -> Self {
        PermitError::InvalidArgument(format!("{field} must be positive, got {value}"))
    }
}

pub type Result<T> = std::result::Result<T, PermitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(PermitError::empty_provider().kind(), "invalid_argument");
        assert_eq!(
            PermitError::NotFound {
                provider_id: "nvd".to_string()
            }
            .kind(),
            "not_found"
        );
        assert_eq!(
            PermitError::Conflict {
                requested: 5,
                allocated: 8
            }
            .kind(),
            "conflict"
        );
    }

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            PermitError::non_positive("count", -3).to_string(),
            "Invalid argument: count must be positive, got -3"
        );
        assert_eq!(
            PermitError::Conflict {
                requested: 5,
                allocated: 8
            }
            .to_string(),
            "Cannot resize pool to 5: 8 permits are currently allocated"
        );
    }
}
