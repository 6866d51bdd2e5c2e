//! Monetbil adapter: Cameroonian mobile-money processor. Offers a widget
//! checkout page and a direct USSD push to the customer's handset. No payout
//! and no balance endpoint.

use jobpay_driver_kit::{
    ensure_amount, ensure_currency, ensure_phone, http_client, json_str, transport_error,
};
use jobpay_types::{
    ChargeStatus, Currency, InitiatedPayment, PaymentError, PaymentRequest, PaymentResult,
    ProviderKind,
};
use tracing::debug;
use url::Url;

const PROVIDER: ProviderKind = ProviderKind::Monetbil;

pub const ALLOWED_CURRENCIES: [Currency; 1] = [Currency::Xaf];

/// Monetbil service credentials, validated non-empty at construction.
#[derive(Debug, Clone)]
pub struct MonetbilCredentials {
    pub service_key: String,
    pub service_secret: String,
    pub base_url: Url,
}

impl MonetbilCredentials {
    pub fn new(service_key: &str, service_secret: &str, base_url: Url) -> PaymentResult<Self> {
        Ok(MonetbilCredentials {
            service_key: jobpay_driver_kit::require_credential("service_key", service_key)?,
            service_secret: jobpay_driver_kit::require_credential(
                "service_secret",
                service_secret,
            )?,
            base_url,
        })
    }
}

/// Stateless client for the Monetbil widget and payment APIs.
#[derive(Debug, Clone)]
pub struct MonetbilClient {
    credentials: MonetbilCredentials,
    http: reqwest::Client,
}

impl MonetbilClient {
    pub fn new(credentials: MonetbilCredentials) -> PaymentResult<Self> {
        Ok(MonetbilClient {
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

    /// Open a widget checkout session and return its hosted payment page.
    pub async fn initiate(&self, request: &PaymentRequest) -> PaymentResult<InitiatedPayment> {
        ensure_amount(request.amount)?;
        ensure_currency(request.currency, &ALLOWED_CURRENCIES)?;

        debug!(
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "creating monetbil widget payment"
        );

        let body = serde_json::json!({
            "amount": request.amount,
            "currency": request.currency.as_str(),
            "item_ref": request.transaction_id,
            "payment_ref": request.transaction_id,
            "return_url": request.return_url.as_str(),
            "notify_url": request.notify_url.as_str(),
            "email": request.customer.email,
        });

        let url = self.endpoint(&format!("widget/v2.1/{}", self.credentials.service_key))?;
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        let payment_url = json_str(PROVIDER, &envelope, "/payment_url")?;
        let redirect_url = Url::parse(payment_url).map_err(|e| PaymentError::Provider {
            provider: PROVIDER,
            code: "malformed_response".to_string(),
            message: format!("unparseable payment_url: {e}"),
        })?;

        Ok(InitiatedPayment {
            // The widget keys callbacks by our own payment_ref.
            reference: request.transaction_id.clone(),
            redirect_url: Some(redirect_url),
        })
    }

    /// Push a debit request straight to the customer's handset. The customer
    /// confirms over USSD; the verdict arrives on the notify channel.
    pub async fn direct_pay(
        &self,
        phone: &str,
        request: &PaymentRequest,
    ) -> PaymentResult<InitiatedPayment> {
        ensure_amount(request.amount)?;
        ensure_phone(phone)?;
        ensure_currency(request.currency, &ALLOWED_CURRENCIES)?;

        debug!(
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "placing monetbil direct payment"
        );

        let body = serde_json::json!({
            "service": self.credentials.service_key,
            "phonenumber": phone,
            "amount": request.amount,
            "item_ref": request.transaction_id,
            "notify_url": request.notify_url.as_str(),
        });

        let response = self
            .http
            .post(self.endpoint("payment/v1/placePayment")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        let status = json_str(PROVIDER, &envelope, "/status")?;
        if status != "REQUEST_ACCEPTED" {
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

        let payment_id = json_str(PROVIDER, &envelope, "/paymentId")?.to_string();
        Ok(InitiatedPayment {
            reference: payment_id,
            redirect_url: None,
        })
    }

    /// Authoritative status of a payment, keyed by the reference returned at
    /// initiation.
    pub async fn check_status(&self, reference: &str) -> PaymentResult<ChargeStatus> {
        let body = serde_json::json!({
            "service": self.credentials.service_key,
            "service_secret": self.credentials.service_secret,
            "paymentId": reference,
        });

        let response = self
            .http
            .post(self.endpoint("payment/v1/checkPayment")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        Ok(map_transaction(&envelope))
    }
}

/// Monetbil reports the verdict as a signed integer on the transaction
/// object: 1 settled, -1 refused or cancelled, 0 still pending.
fn map_transaction(envelope: &serde_json::Value) -> ChargeStatus {
    let status = envelope
        .pointer("/transaction/status")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    match status {
        1 => ChargeStatus::Accepted {
            amount: envelope
                .pointer("/transaction/amount")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        },
        -1 => ChargeStatus::Refused {
            reason: envelope
                .pointer("/transaction/message")
                .and_then(|v| v.as_str())
                .unwrap_or("payment refused")
                .to_string(),
        },
        _ => ChargeStatus::Pending,
    }
}

async fn read_body(response: reqwest::Response) -> PaymentResult<serde_json::Value> {
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

    serde_json::from_str(&body).map_err(|e| PaymentError::Provider {
        provider: PROVIDER,
        code: "malformed_response".to_string(),
        message: format!("invalid json: {e}"),
    })
}
