//! CamPay adapter: the full-featured processor. Hosted payment links, direct
//! mobile-money debit, merchant balance and payouts, all behind a short-lived
//! bearer token fetched per call. No retries here; a token or call failure is
//! surfaced as-is.

use jobpay_driver_kit::{
    ensure_amount, ensure_currency, ensure_phone, http_client, json_str, transport_error,
};
use jobpay_types::{
    ChargeStatus, Currency, InitiatedPayment, PaymentError, PaymentRequest, PaymentResult,
    ProviderKind,
};
use tracing::debug;
use url::Url;

const PROVIDER: ProviderKind = ProviderKind::Campay;

pub const ALLOWED_CURRENCIES: [Currency; 1] = [Currency::Xaf];

/// Dialing prefix prepended to local subscriber numbers on the wire.
const COUNTRY_PREFIX: &str = "237";

/// CamPay application credentials, validated non-empty at construction.
#[derive(Debug, Clone)]
pub struct CampayCredentials {
    pub app_username: String,
    pub app_password: String,
    pub base_url: Url,
}

impl CampayCredentials {
    pub fn new(app_username: &str, app_password: &str, base_url: Url) -> PaymentResult<Self> {
        Ok(CampayCredentials {
            app_username: jobpay_driver_kit::require_credential("app_username", app_username)?,
            app_password: jobpay_driver_kit::require_credential("app_password", app_password)?,
            base_url,
        })
    }
}

/// Stateless client for the CamPay API. A fresh bearer token is fetched for
/// each operation; CamPay tokens are short-lived and cheap to mint.
#[derive(Debug, Clone)]
pub struct CampayClient {
    credentials: CampayCredentials,
    http: reqwest::Client,
}

impl CampayClient {
    pub fn new(credentials: CampayCredentials) -> PaymentResult<Self> {
        Ok(CampayClient {
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

    async fn access_token(&self) -> PaymentResult<String> {
        let body = serde_json::json!({
            "username": self.credentials.app_username,
            "password": self.credentials.app_password,
        });
        let response = self
            .http
            .post(self.endpoint("token/")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let envelope = read_body(response).await?;
        Ok(json_str(PROVIDER, &envelope, "/token")?.to_string())
    }

    /// Create a hosted payment link the browser can be redirected to.
    pub async fn initiate(&self, request: &PaymentRequest) -> PaymentResult<InitiatedPayment> {
        ensure_amount(request.amount)?;
        ensure_currency(request.currency, &ALLOWED_CURRENCIES)?;

        debug!(
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "creating campay payment link"
        );

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "amount": request.amount,
            "currency": request.currency.as_str(),
            "description": request.description,
            "external_reference": request.transaction_id,
            "redirect_url": request.return_url.as_str(),
            "failure_redirect_url": request.return_url.as_str(),
        });

        let response = self
            .http
            .post(self.endpoint("get_payment_link/")?)
            .header("Authorization", format!("Token {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        let link = json_str(PROVIDER, &envelope, "/link")?;
        let redirect_url = Url::parse(link).map_err(|e| PaymentError::Provider {
            provider: PROVIDER,
            code: "malformed_response".to_string(),
            message: format!("unparseable payment link: {e}"),
        })?;

        Ok(InitiatedPayment {
            // Payment-link flows are keyed by our external reference.
            reference: request.transaction_id.clone(),
            redirect_url: Some(redirect_url),
        })
    }

    /// Debit the customer's mobile-money account directly. Returns CamPay's
    /// own reference, used for all later status checks.
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
            "collecting via campay direct debit"
        );

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "amount": request.amount,
            "currency": request.currency.as_str(),
            "from": format!("{COUNTRY_PREFIX}{phone}"),
            "description": request.description,
            "external_reference": request.transaction_id,
        });

        let response = self
            .http
            .post(self.endpoint("collect/")?)
            .header("Authorization", format!("Token {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        let reference = json_str(PROVIDER, &envelope, "/reference")?.to_string();
        Ok(InitiatedPayment {
            reference,
            redirect_url: None,
        })
    }

    /// Authoritative status of a transaction, keyed by the CamPay reference.
    pub async fn check_status(&self, reference: &str) -> PaymentResult<ChargeStatus> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.endpoint(&format!("transaction/{reference}/"))?)
            .header("Authorization", format!("Token {token}"))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        let status = json_str(PROVIDER, &envelope, "/status")?;
        Ok(map_transaction_status(status, &envelope))
    }

    /// Current merchant balance in minor units.
    pub async fn balance(&self) -> PaymentResult<i64> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.endpoint("balance/")?)
            .header("Authorization", format!("Token {token}"))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        envelope
            .pointer("/total_balance")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| PaymentError::Provider {
                provider: PROVIDER,
                code: "malformed_response".to_string(),
                message: "response is missing total_balance".to_string(),
            })
    }

    /// Send money out to a subscriber. Returns the CamPay payout reference.
    pub async fn payout(
        &self,
        phone: &str,
        amount: i64,
        currency: Currency,
        description: &str,
    ) -> PaymentResult<String> {
        ensure_amount(amount)?;
        ensure_phone(phone)?;
        ensure_currency(currency, &ALLOWED_CURRENCIES)?;

        debug!(amount, "sending campay payout");

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "amount": amount,
            "currency": currency.as_str(),
            "to": format!("{COUNTRY_PREFIX}{phone}"),
            "description": description,
        });

        let response = self
            .http
            .post(self.endpoint("withdraw/")?)
            .header("Authorization", format!("Token {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let envelope = read_body(response).await?;
        Ok(json_str(PROVIDER, &envelope, "/reference")?.to_string())
    }
}

fn map_transaction_status(status: &str, envelope: &serde_json::Value) -> ChargeStatus {
    match status {
        "SUCCESSFUL" => ChargeStatus::Accepted {
            amount: envelope
                .pointer("/amount")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        },
        "FAILED" => ChargeStatus::Refused {
            reason: envelope
                .pointer("/reason")
                .and_then(|v| v.as_str())
                .unwrap_or("transaction failed")
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
        // CamPay error bodies carry {error_code, message}; keep them verbatim.
        let (code, message) = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                let code = v.pointer("/error_code")?.to_string();
                let message = v
                    .pointer("/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("")
                    .to_string();
                Some((code, message))
            })
            .unwrap_or_else(|| (http_status.as_u16().to_string(), body.clone()));
        return Err(PaymentError::Provider {
            provider: PROVIDER,
            code,
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| PaymentError::Provider {
        provider: PROVIDER,
        code: "malformed_response".to_string(),
        message: format!("invalid json: {e}"),
    })
}
