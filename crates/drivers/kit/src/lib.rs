//! Shared plumbing for the provider adapters: credential checks, pre-network
//! request validation and the bounded-timeout HTTP client. Adapters stay
//! stateless aside from credentials and never retry internally.

use std::time::Duration;

use jobpay_types::{Currency, PaymentError, PaymentResult, ProviderKind};

/// Bound on every outbound provider call. Timeouts surface as transport
/// failures; redelivery is the provider's own responsibility.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Smallest chargeable amount in minor units, common to all providers.
pub const MIN_AMOUNT_MINOR: i64 = 100;

/// Reject an empty credential at construction time, before any request is
/// possible.
pub fn require_credential(field: &str, value: &str) -> PaymentResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PaymentError::Configuration(format!(
            "missing provider credential: {field}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Amount precondition, enforced before any network call.
pub fn ensure_amount(amount: i64) -> PaymentResult<()> {
    if amount < MIN_AMOUNT_MINOR {
        return Err(PaymentError::Validation(format!(
            "amount {amount} is below the {MIN_AMOUNT_MINOR} minor-unit minimum"
        )));
    }
    Ok(())
}

/// Local mobile-money numbers are nine digits starting with 65-69.
pub fn ensure_phone(phone: &str) -> PaymentResult<()> {
    let mut chars = phone.chars();
    let valid = phone.len() == 9
        && chars.next() == Some('6')
        && matches!(chars.next(), Some('5'..='9'))
        && chars.all(|c| c.is_ascii_digit());
    if !valid {
        return Err(PaymentError::Validation(format!(
            "phone number {phone} does not match the local mobile pattern"
        )));
    }
    Ok(())
}

/// Per-provider currency allow-list check.
pub fn ensure_currency(currency: Currency, allowed: &[Currency]) -> PaymentResult<()> {
    if !allowed.contains(&currency) {
        return Err(PaymentError::Validation(format!(
            "currency {currency} is not accepted by this provider"
        )));
    }
    Ok(())
}

/// HTTP client shared by one adapter instance.
pub fn http_client() -> PaymentResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PaymentError::Configuration(format!("failed to build http client: {e}")))
}

/// Map a reqwest failure to a transport error. The ledger is left untouched
/// by callers when they see this variant.
pub fn transport_error(provider: ProviderKind, err: reqwest::Error) -> PaymentError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    PaymentError::Transport { provider, message }
}

/// Pull a string field out of a provider JSON response, failing as a
/// provider error when the field is absent.
pub fn json_str<'a>(
    provider: ProviderKind,
    value: &'a serde_json::Value,
    pointer: &str,
) -> PaymentResult<&'a str> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .ok_or_else(|| PaymentError::Provider {
            provider,
            code: "malformed_response".to_string(),
            message: format!("response is missing {pointer}"),
        })
}
