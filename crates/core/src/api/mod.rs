//! HTTP boundary for asynchronous payment confirmation. Two channels per
//! provider: server-to-server notify (the authoritative one) and the customer
//! return redirect (display only, never mutates). Every accepted status is
//! re-checked against the provider before anything is settled.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Router,
    body::Bytes,
    extract::{Path, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use jobpay_types::{ChargeStatus, IntentStatus, PaymentIntent, PaymentMethod, ProviderKind};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use url::Url;

use crate::db::DbManager;
use crate::facade::Gateway;
use crate::wallet::WalletService;

/// Where customers land after checkout, with the transaction appended as
/// query parameters.
#[derive(Debug, Clone)]
pub struct RedirectPages {
    pub success_url: Url,
    pub failure_url: Url,
}

/// Shared state for the confirmation endpoints.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<DbManager>,
    pub gateway: Arc<dyn Gateway>,
    pub wallet: Arc<WalletService>,
    pub pages: RedirectPages,
}

pub fn create_router(state: ApiState) -> Router<()> {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/payments/{provider}/notify", get(health).post(notify))
        .route(
            "/payments/{provider}/return",
            get(return_page).post(return_page),
        )
        .layer(Extension(Arc::new(state)))
        .layer(cors_layer)
}

/// Liveness probe. Providers also poke the notify and return URLs with
/// parameterless GETs when a merchant account is configured; those land here.
async fn health() -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "message": "jobpay payment service",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}

/// Server-to-server payment notification.
///
/// The payload is only used to locate the intent; the status that settles it
/// always comes from a fresh provider status check. Terminal intents are
/// acknowledged without effect so redelivered notifications stay harmless.
async fn notify(
    Extension(state): Extension<Arc<ApiState>>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Response {
    let provider: ProviderKind = match provider.parse() {
        Ok(p) => p,
        Err(_) => return (StatusCode::NOT_FOUND, "unknown provider").into_response(),
    };
    let Some(reference) = extract_reference(provider, &body) else {
        warn!(%provider, "notification without a transaction reference");
        return (StatusCode::BAD_REQUEST, "missing transaction reference").into_response();
    };

    let intent = match state.db.find_intent_by_reference(&reference) {
        Ok(Some(intent)) => intent,
        Ok(None) => {
            warn!(%provider, reference, "notification for unknown transaction");
            return (StatusCode::NOT_FOUND, "unknown transaction").into_response();
        }
        Err(err) => {
            warn!(%provider, reference, error = %err, "intent lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "lookup failed").into_response();
        }
    };
    // Callbacks are unauthenticated; only the provider that owns the intent
    // may drive it, otherwise a replayed reference on another provider's URL
    // could force-fail a live payment.
    if intent.payment_method != PaymentMethod::Provider(provider) {
        warn!(
            %provider,
            transaction_id = %intent.transaction_id,
            "notification provider does not match the intent"
        );
        return (StatusCode::NOT_FOUND, "unknown transaction").into_response();
    }
    if intent.status.is_terminal() {
        return (StatusCode::OK, "OK").into_response();
    }

    let check_ref = intent.external_id.as_deref().unwrap_or(&intent.transaction_id);
    match state.gateway.check_status(provider, check_ref).await {
        Err(err) => {
            // Nothing is mutated; the provider will redeliver.
            warn!(
                %provider,
                transaction_id = %intent.transaction_id,
                error = %err,
                "status re-check failed"
            );
            (StatusCode::BAD_GATEWAY, "status check failed").into_response()
        }
        Ok(ChargeStatus::Accepted { amount }) => {
            info!(
                %provider,
                transaction_id = %intent.transaction_id,
                amount,
                "notification confirmed accepted"
            );
            match state.wallet.complete_intent(&intent).await {
                Ok(_) => (StatusCode::OK, "OK").into_response(),
                Err(err) => {
                    warn!(
                        transaction_id = %intent.transaction_id,
                        error = %err,
                        "completion failed"
                    );
                    (StatusCode::INTERNAL_SERVER_ERROR, "completion failed").into_response()
                }
            }
        }
        Ok(status) => {
            info!(
                %provider,
                transaction_id = %intent.transaction_id,
                ?status,
                "notification did not confirm acceptance"
            );
            let payload = String::from_utf8_lossy(&body);
            match state.db.mark_failed(&intent.transaction_id, Some(payload.as_ref())) {
                Ok(_) => (StatusCode::OK, "OK").into_response(),
                Err(err) => {
                    warn!(
                        transaction_id = %intent.transaction_id,
                        error = %err,
                        "failed to record refusal"
                    );
                    (StatusCode::INTERNAL_SERVER_ERROR, "persist failed").into_response()
                }
            }
        }
    }
}

/// Customer return redirect. Display-only: the wallet is never touched here,
/// settlement belongs to the notify channel. A best-effort status check picks
/// the landing page; on transport failure the stored status decides.
async fn return_page(
    Extension(state): Extension<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let provider: ProviderKind = match provider.parse() {
        Ok(p) => p,
        Err(_) => return (StatusCode::NOT_FOUND, "unknown provider").into_response(),
    };
    // Returns arrive as query parameters on a GET or as a form post,
    // depending on the provider.
    let reference =
        reference_from_params(provider, &params).or_else(|| extract_reference(provider, &body));
    let Some(reference) = reference else {
        if params.is_empty() && body.is_empty() {
            return health().await;
        }
        return (StatusCode::BAD_REQUEST, "missing transaction reference").into_response();
    };

    let intent = match state.db.find_intent_by_reference(&reference) {
        Ok(Some(intent)) => intent,
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown transaction").into_response(),
        Err(err) => {
            warn!(%provider, reference, error = %err, "intent lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "lookup failed").into_response();
        }
    };
    if intent.payment_method != PaymentMethod::Provider(provider) {
        return (StatusCode::NOT_FOUND, "unknown transaction").into_response();
    }

    let succeeded = if intent.status.is_terminal() {
        intent.status == IntentStatus::Completed
    } else {
        let check_ref = intent.external_id.as_deref().unwrap_or(&intent.transaction_id);
        match state.gateway.check_status(provider, check_ref).await {
            Ok(ChargeStatus::Accepted { .. }) => true,
            Ok(_) => false,
            Err(err) => {
                warn!(
                    transaction_id = %intent.transaction_id,
                    error = %err,
                    "return-channel status check failed, using stored status"
                );
                intent.status == IntentStatus::Completed
            }
        }
    };

    redirect_to(&state.pages, succeeded, &intent)
}

fn redirect_to(pages: &RedirectPages, succeeded: bool, intent: &PaymentIntent) -> Response {
    let base = if succeeded {
        &pages.success_url
    } else {
        &pages.failure_url
    };
    let mut target = base.clone();
    target
        .query_pairs_mut()
        .append_pair("transaction_id", &intent.transaction_id)
        .append_pair("amount", &intent.amount.to_string());
    // Plain 302 so every provider's in-app browser follows it.
    match HeaderValue::from_str(target.as_str()) {
        Ok(location) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Err(err) => {
            warn!(error = %err, "redirect target is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, "bad redirect target").into_response()
        }
    }
}

/// Field names each provider uses for the transaction reference in callbacks.
fn reference_keys(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::Payunit => &["transaction_id"],
        ProviderKind::Monetbil => &["item_ref", "payment_ref"],
        ProviderKind::Campay => &["external_reference", "reference"],
    }
}

/// Pull the transaction reference out of a notification body, which arrives
/// as JSON or as a form-urlencoded post depending on the provider.
fn extract_reference(provider: ProviderKind, body: &[u8]) -> Option<String> {
    let keys = reference_keys(provider);
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in keys {
            if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    for (k, v) in url::form_urlencoded::parse(body) {
        if keys.contains(&k.as_ref()) && !v.is_empty() {
            return Some(v.into_owned());
        }
    }
    None
}

fn reference_from_params(
    provider: ProviderKind,
    params: &HashMap<String, String>,
) -> Option<String> {
    reference_keys(provider)
        .iter()
        .find_map(|key| params.get(*key))
        .filter(|v| !v.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use crate::wallet::{CallbackUrls, CheckoutOutcome, CheckoutRoute};
    use axum::body::Body;
    use axum::http::{Request, header};
    use jobpay_types::{
        Currency, Customer, PaymentType, ServiceCatalog, TokenPackCatalog,
    };
    use tower::ServiceExt;

    struct Fixture {
        app: Router<()>,
        db: Arc<DbManager>,
        gateway: Arc<MockGateway>,
        wallet: Arc<WalletService>,
    }

    fn fixture() -> Fixture {
        fixture_with(MockGateway::default())
    }

    fn fixture_with(gateway: MockGateway) -> Fixture {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(gateway);
        let wallet = Arc::new(WalletService::new(
            db.clone(),
            gateway.clone(),
            ServiceCatalog::builtin(),
            TokenPackCatalog::builtin(),
            CallbackUrls::new(Url::parse("https://jobpay.example/").unwrap()),
            Currency::Xaf,
        ));
        let state = ApiState {
            db: db.clone(),
            gateway: gateway.clone(),
            wallet: wallet.clone(),
            pages: RedirectPages {
                success_url: Url::parse("https://jobpay.example/pay/success").unwrap(),
                failure_url: Url::parse("https://jobpay.example/pay/failure").unwrap(),
            },
        };
        Fixture {
            app: create_router(state),
            db,
            gateway,
            wallet,
        }
    }

    async fn initiated_pack_intent(fx: &Fixture) -> PaymentIntent {
        let outcome = fx
            .wallet
            .request_token_pack_purchase(
                "user-1",
                "starter",
                CheckoutRoute {
                    payment_type: PaymentType::Web,
                    customer: Customer::default(),
                },
            )
            .await
            .unwrap();
        match outcome {
            CheckoutOutcome::ProviderInitiated { intent, .. } => intent,
            other => panic!("expected provider initiation, got {other:?}"),
        }
    }

    fn json_notify(provider: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/payments/{provider}/notify"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let fx = fixture();
        let response = fx
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn parameterless_get_on_callback_urls_is_a_probe() {
        let fx = fixture();
        let response = fx
            .app
            .clone()
            .oneshot(
                Request::get("/payments/payunit/notify")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = fx
            .app
            .oneshot(
                Request::get("/payments/payunit/return")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let fx = fixture();
        let response = fx
            .app
            .oneshot(json_notify("paypal", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn accepted_notification_settles_and_credits() {
        let fx = fixture();
        let intent = initiated_pack_intent(&fx).await;
        fx.gateway.set_status(ChargeStatus::Accepted { amount: 1000 });

        let body = serde_json::json!({
            "transaction_id": intent.transaction_id,
            "status": "SUCCESS",
        });
        let response = fx
            .app
            .clone()
            .oneshot(json_notify("payunit", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 25);

        // Redelivery acknowledges without crediting again.
        let response = fx.app.oneshot(json_notify("payunit", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 25);
    }

    #[tokio::test]
    async fn notification_is_located_by_provider_reference_too() {
        use jobpay_types::{IntentMetadata, PaymentMethod as Method, ProviderKind};

        let fx = fixture();
        let intent = PaymentIntent::new(
            "user-1",
            1000,
            Currency::Xaf,
            Method::Provider(ProviderKind::Monetbil),
            IntentMetadata::TokenPack {
                pack_id: "starter".into(),
                base_tokens: 20,
                bonus_tokens: 5,
                total_tokens: 25,
            },
        );
        fx.db.insert_intent(&intent).unwrap();
        fx.db
            .mark_initiated(&intent.transaction_id, "mb-payment-7")
            .unwrap();
        fx.gateway.set_status(ChargeStatus::Accepted { amount: 1000 });

        let body = "payment_ref=mb-payment-7&status=1".to_string();
        let response = fx
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/monetbil/notify")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 25);
    }

    #[tokio::test]
    async fn refused_status_marks_the_intent_failed() {
        let fx = fixture();
        let intent = initiated_pack_intent(&fx).await;
        fx.gateway.set_status(ChargeStatus::Refused {
            reason: "insufficient funds".into(),
        });

        let response = fx
            .app
            .oneshot(json_notify(
                "payunit",
                serde_json::json!({ "transaction_id": intent.transaction_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = fx.db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Failed);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 0);
    }

    #[tokio::test]
    async fn transport_failure_answers_bad_gateway_and_mutates_nothing() {
        let fx = fixture_with(MockGateway {
            fail_status: true,
            ..MockGateway::default()
        });
        let intent = initiated_pack_intent(&fx).await;

        let response = fx
            .app
            .oneshot(json_notify(
                "payunit",
                serde_json::json!({ "transaction_id": intent.transaction_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let stored = fx.db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Initiated);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 0);
    }

    #[tokio::test]
    async fn notify_on_the_wrong_provider_path_cannot_fail_the_intent() {
        let fx = fixture();
        // Web route initiates through payunit.
        let intent = initiated_pack_intent(&fx).await;

        // A replayed reference on another provider's URL would re-check
        // against a provider that does not know the transaction and report
        // pending, which must not force-fail the live intent.
        let response = fx
            .app
            .clone()
            .oneshot(json_notify(
                "campay",
                serde_json::json!({ "external_reference": intent.transaction_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let stored = fx.db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Initiated);

        // The legitimate channel still settles and credits.
        fx.gateway.set_status(ChargeStatus::Accepted { amount: 1000 });
        let response = fx
            .app
            .oneshot(json_notify(
                "payunit",
                serde_json::json!({ "transaction_id": intent.transaction_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 25);
    }

    #[tokio::test]
    async fn return_on_the_wrong_provider_path_is_not_found() {
        let fx = fixture();
        let intent = initiated_pack_intent(&fx).await;

        let response = fx
            .app
            .oneshot(
                Request::get(format!(
                    "/payments/campay/return?external_reference={}",
                    intent.transaction_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn form_post_return_redirects_the_customer() {
        let fx = fixture();
        let intent = initiated_pack_intent(&fx).await;
        fx.gateway.set_status(ChargeStatus::Accepted { amount: 1000 });

        let response = fx
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/payunit/return")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!(
                        "transaction_id={}",
                        intent.transaction_id
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://jobpay.example/pay/success"));
    }

    #[tokio::test]
    async fn notification_for_unknown_transaction_is_not_found() {
        let fx = fixture();
        let response = fx
            .app
            .oneshot(json_notify(
                "campay",
                serde_json::json!({ "external_reference": "never-created" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn return_redirects_to_success_without_settling() {
        let fx = fixture();
        let intent = initiated_pack_intent(&fx).await;
        fx.gateway.set_status(ChargeStatus::Accepted { amount: 1000 });

        let response = fx
            .app
            .oneshot(
                Request::get(format!(
                    "/payments/payunit/return?transaction_id={}",
                    intent.transaction_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://jobpay.example/pay/success"));
        assert!(location.contains(&format!("transaction_id={}", intent.transaction_id)));

        // Display only: the intent stays initiated and nothing was credited.
        let stored = fx.db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Initiated);
        assert_eq!(fx.db.wallet_balance("user-1").unwrap(), 0);
    }

    #[tokio::test]
    async fn return_falls_back_to_stored_status_on_transport_error() {
        let fx = fixture_with(MockGateway {
            fail_status: true,
            ..MockGateway::default()
        });
        let intent = initiated_pack_intent(&fx).await;

        let response = fx
            .app
            .oneshot(
                Request::get(format!(
                    "/payments/payunit/return?transaction_id={}",
                    intent.transaction_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://jobpay.example/pay/failure"));
    }
}
