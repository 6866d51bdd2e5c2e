use crate::provider::ProviderKind;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Unified error contract for adapter and facade operations.
///
/// Configuration, validation and capability errors are raised before any
/// network call is made; transport errors say nothing about remote state.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Missing or malformed provider credentials. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Malformed amount, phone number or currency, rejected pre-network.
    #[error("validation error: {0}")]
    Validation(String),
    /// The external API answered with a non-success code. The provider's own
    /// code and message are carried verbatim, never re-interpreted.
    #[error("provider {provider} returned {code}: {message}")]
    Provider {
        provider: ProviderKind,
        code: String,
        message: String,
    },
    /// Network or timeout failure. Not retried here; redelivery is the
    /// provider's responsibility.
    #[error("transport failure reaching {provider}: {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },
    /// Operation not supported by the selected provider.
    #[error("{provider} does not support {operation}")]
    Capability {
        provider: ProviderKind,
        operation: &'static str,
    },
    #[error("unknown payment provider: {0}")]
    UnknownProvider(String),
}

impl PaymentError {
    /// True when the failure was produced locally, before any request left
    /// the process.
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self,
            PaymentError::Configuration(_)
                | PaymentError::Validation(_)
                | PaymentError::Capability { .. }
                | PaymentError::UnknownProvider(_)
        )
    }
}
