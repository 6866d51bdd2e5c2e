//! PayUnit adapter: checkout-redirect aggregator. The only flow it offers is
//! a hosted payment page; direct debit, balance and payout are not available
//! and are gated off by the routing facade before this crate is reached.

use jobpay_driver_kit::{ensure_amount, ensure_currency, http_client, json_str, transport_error};
use jobpay_types::{
    ChargeStatus, Currency, InitiatedPayment, PaymentError, PaymentRequest, PaymentResult,
    ProviderKind,
};
use tracing::debug;
use url::Url;

const PROVIDER: ProviderKind = ProviderKind::Payunit;

pub const ALLOWED_CURRENCIES: [Currency; 4] =
    [Currency::Xaf, Currency::Xof, Currency::Cdf, Currency::Gnf];

/// PayUnit API credentials, validated non-empty at construction.
#[derive(Debug, Clone)]
pub struct PayunitCredentials {
    pub api_user: String,
    pub api_password: String,
    pub api_key: String,
    pub base_url: Url,
}

impl PayunitCredentials {
    pub fn new(
        api_user: &str,
        api_password: &str,
        api_key: &str,
        base_url: Url,
    ) -> PaymentResult<Self> {
        Ok(PayunitCredentials {
            api_user: jobpay_driver_kit::require_credential("api_user", api_user)?,
            api_password: jobpay_driver_kit::require_credential("api_password", api_password)?,
            api_key: jobpay_driver_kit::require_credential("api_key", api_key)?,
            base_url,
        })
    }
}

/// Stateless client for the PayUnit gateway API.
#[derive(Debug, Clone)]
pub struct PayunitClient {
    credentials: PayunitCredentials,
    http: reqwest::Client,
}

impl PayunitClient {
    pub fn new(credentials: PayunitCredentials) -> PaymentResult<Self> {
        Ok(PayunitClient {
            credentials,
            http: http_client()?,
        })
    }

    fn endpoint(&self, path: &str) -> PaymentResult<Url> {
        self.credentials
            .base_url
            .join(path)
            .map_err(|e| PaymentError::Configuration(format!("invalid endpoint {path}: {e}")))
    }

    /// Open a hosted checkout session and return the page the browser must be
    /// redirected to.
    pub async fn initiate(&self, request: &PaymentRequest) -> PaymentResult<InitiatedPayment> {
        ensure_amount(request.amount)?;
        ensure_currency(request.currency, &ALLOWED_CURRENCIES)?;

        debug!(
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "initializing payunit checkout"
        );

        let body = serde_json::json!({
            "transaction_id": request.transaction_id,
            "total_amount": request.amount,
            "currency": request.currency.as_str(),
            "description": request.description,
            "return_url": request.return_url.as_str(),
            "notify_url": request.notify_url.as_str(),
            "payment_country": "CM",
            "customer_name": request.customer.name,
            "customer_email": request.customer.email,
        });

        let response = self
            .http
            .post(self.endpoint("gateway/initialize")?)
            .basic_auth(&self.credentials.api_user, Some(&self.credentials.api_password))
            .header("x-api-key", &self.credentials.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_envelope(response).await?;
        let redirect = json_str(PROVIDER, &envelope, "/data/transaction_url")?;
        let reference = json_str(PROVIDER, &envelope, "/data/t_id")?.to_string();
        let redirect_url = Url::parse(redirect).map_err(|e| PaymentError::Provider {
            provider: PROVIDER,
            code: "malformed_response".to_string(),
            message: format!("unparseable transaction_url: {e}"),
        })?;

        Ok(InitiatedPayment {
            reference,
            redirect_url: Some(redirect_url),
        })
    }

    /// Authoritative status of a checkout session, keyed by our transaction
    /// id (PayUnit echoes it back on callbacks).
    pub async fn check_status(&self, transaction_id: &str) -> PaymentResult<ChargeStatus> {
        let response = self
            .http
            .get(self.endpoint(&format!("gateway/paymentstatus/{transaction_id}"))?)
            .basic_auth(&self.credentials.api_user, Some(&self.credentials.api_password))
            .header("x-api-key", &self.credentials.api_key)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_envelope(response).await?;
        let status = json_str(PROVIDER, &envelope, "/data/transaction_status")?;
        Ok(map_transaction_status(status, &envelope))
    }
}

fn map_transaction_status(status: &str, envelope: &serde_json::Value) -> ChargeStatus {
    match status {
        "SUCCESS" => ChargeStatus::Accepted {
            amount: envelope
                .pointer("/data/transaction_amount")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        },
        "FAILED" | "CANCELLED" | "EXPIRED" => ChargeStatus::Refused {
            reason: envelope
                .pointer("/message")
                .and_then(|v| v.as_str())
                .unwrap_or(status)
                .to_string(),
        },
        _ => ChargeStatus::Pending,
    }
}

/// PayUnit wraps everything in `{status, message, data}`. A non-SUCCESS
/// status carries the provider's own code and message, surfaced verbatim.
async fn read_envelope(response: reqwest::Response) -> PaymentResult<serde_json::Value> {
    let http_status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;

    if !http_status.is_success() {
        return Err(PaymentError::Provider {
            provider: PROVIDER,
            code: http_status.as_u16().to_string(),
            message: body,
        });
    }

    let envelope: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| PaymentError::Provider {
            provider: PROVIDER,
            code: "malformed_response".to_string(),
            message: format!("invalid json: {e}"),
        })?;

    let status = envelope
        .pointer("/status")
        .and_then(|v| v.as_str())
        .unwrap_or("UNKNOWN");
    if status != "SUCCESS" {
        return Err(PaymentError::Provider {
            provider: PROVIDER,
            code: status.to_string(),
            message: envelope
                .pointer("/message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        });
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobpay_types::Customer;

    fn credentials() -> PayunitCredentials {
        PayunitCredentials::new(
            "pu_user",
            "pu_password",
            "pu_api_key",
            Url::parse("https://gateway.payunit.example/api/").unwrap(),
        )
        .unwrap()
    }

    fn request(amount: i64) -> PaymentRequest {
        PaymentRequest {
            transaction_id: "tx-1".to_string(),
            amount,
            currency: Currency::Xaf,
            description: "AI CV review".to_string(),
            customer: Customer::default(),
            return_url: Url::parse("https://jobpay.example/payments/payunit/return").unwrap(),
            notify_url: Url::parse("https://jobpay.example/payments/payunit/notify").unwrap(),
        }
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = PayunitCredentials::new(
            "",
            "pw",
            "key",
            Url::parse("https://gateway.payunit.example/").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
    }

    #[tokio::test]
    async fn undersized_amount_never_reaches_the_network() {
        let client = PayunitClient::new(credentials()).unwrap();
        let err = client.initiate(&request(99)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[test]
    fn status_mapping_covers_the_three_verdicts() {
        let accepted = serde_json::json!({"data": {"transaction_amount": 300}});
        assert_eq!(
            map_transaction_status("SUCCESS", &accepted),
            ChargeStatus::Accepted { amount: 300 }
        );
        let refused = serde_json::json!({"message": "insufficient funds"});
        assert_eq!(
            map_transaction_status("FAILED", &refused),
            ChargeStatus::Refused {
                reason: "insufficient funds".to_string()
            }
        );
        assert_eq!(
            map_transaction_status("INITIATED", &serde_json::json!({})),
            ChargeStatus::Pending
        );
    }
}
