//! Wallet & entitlement service: decides the token-vs-money path for priced
//! services, owns the catalogs, and is the only writer of wallet credits. The
//! provider path never leaves a pending row behind: an adapter failure marks
//! the intent failed in the same call.

use std::sync::Arc;

use jobpay_types::{
    Currency, Customer, InitiatedPayment, IntentMetadata, IntentStatus, PaymentError,
    PaymentIntent, PaymentMethod, PaymentRequest, PaymentType, PlanPrice, ProviderKind,
    ServiceCatalog, TokenPackCatalog,
};
use tracing::{info, warn};
use url::Url;

use crate::db::{CompletionOutcome, DbError, DbManager};
use crate::facade::{Gateway, RoutingContext, recommend_provider};

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("unknown service or plan: {0}")]
    UnknownService(String),
    #[error("unknown token pack: {0}")]
    UnknownPack(String),
    /// Token-pack metadata whose declared total disagrees with base + bonus.
    /// Nothing is credited; the intent is left for manual audit.
    #[error("corrupt token-pack metadata on intent {0}")]
    CorruptMetadata(String),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Where provider callbacks land, derived from the public base URL.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    pub public_base_url: Url,
}

impl CallbackUrls {
    pub fn new(public_base_url: Url) -> Self {
        CallbackUrls { public_base_url }
    }

    pub fn notify_url(&self, provider: ProviderKind) -> Result<Url, PaymentError> {
        self.join(provider, "notify")
    }

    pub fn return_url(&self, provider: ProviderKind) -> Result<Url, PaymentError> {
        self.join(provider, "return")
    }

    fn join(&self, provider: ProviderKind, channel: &str) -> Result<Url, PaymentError> {
        self.public_base_url
            .join(&format!("payments/{provider}/{channel}"))
            .map_err(|e| PaymentError::Configuration(format!("bad public base url: {e}")))
    }
}

/// How the customer arrived at checkout, and who they are.
#[derive(Debug, Clone)]
pub struct CheckoutRoute {
    pub payment_type: PaymentType,
    pub customer: Customer,
}

/// Result of a checkout request.
#[derive(Debug)]
pub enum CheckoutOutcome {
    /// Paid with tokens; the service is unlocked immediately.
    Unlocked {
        intent: PaymentIntent,
        remaining_balance: i64,
    },
    /// A provider flow was opened; the caller drives the customer to it.
    ProviderInitiated {
        intent: PaymentIntent,
        provider: ProviderKind,
        payment: InitiatedPayment,
    },
}

pub struct WalletService {
    db: Arc<DbManager>,
    gateway: Arc<dyn Gateway>,
    services: ServiceCatalog,
    packs: TokenPackCatalog,
    callbacks: CallbackUrls,
    currency: Currency,
}

impl WalletService {
    pub fn new(
        db: Arc<DbManager>,
        gateway: Arc<dyn Gateway>,
        services: ServiceCatalog,
        packs: TokenPackCatalog,
        callbacks: CallbackUrls,
        currency: Currency,
    ) -> Self {
        WalletService {
            db,
            gateway,
            services,
            packs,
            callbacks,
            currency,
        }
    }

    /// Token and money cost of a service plan. Read-only.
    pub fn cost_of(&self, service_id: &str, plan: &str) -> WalletResult<PlanPrice> {
        self.services
            .lookup(service_id, plan)
            .map(|(_, price)| price)
            .ok_or_else(|| WalletError::UnknownService(format!("{service_id}/{plan}")))
    }

    /// Whether the user's balance covers a plan. Read-only.
    pub fn can_afford(&self, user_id: &str, service_id: &str, plan: &str) -> WalletResult<bool> {
        let price = self.cost_of(service_id, plan)?;
        Ok(self.db.wallet_balance(user_id)? >= price.tokens)
    }

    pub fn balance_of(&self, user_id: &str) -> WalletResult<i64> {
        Ok(self.db.wallet_balance(user_id)?)
    }

    /// Unlock a priced service: wallet debit when the balance covers it,
    /// provider checkout otherwise.
    pub async fn request_service_access(
        &self,
        user_id: &str,
        service_id: &str,
        plan: &str,
        route: CheckoutRoute,
    ) -> WalletResult<CheckoutOutcome> {
        let (entry, price) = self
            .services
            .lookup(service_id, plan)
            .ok_or_else(|| WalletError::UnknownService(format!("{service_id}/{plan}")))?;
        let metadata = IntentMetadata::ServiceAccess {
            service_id: service_id.to_string(),
            plan: plan.to_string(),
            tokens_required: price.tokens,
        };

        let balance = self.db.wallet_balance(user_id)?;
        if balance >= price.tokens {
            let intent =
                PaymentIntent::completed_wallet_debit(user_id, self.currency, metadata);
            self.db.debit_for_service(&intent, price.tokens)?;
            info!(
                user_id,
                service_id,
                tokens = price.tokens,
                transaction_id = %intent.transaction_id,
                "service unlocked from wallet"
            );
            return Ok(CheckoutOutcome::Unlocked {
                intent,
                remaining_balance: balance - price.tokens,
            });
        }

        self.initiate_with_provider(user_id, price.price, &entry.name, metadata, route)
            .await
    }

    /// Buy a token pack. Packs are real-money only; the token total is baked
    /// into the metadata now so completion needs no catalog lookup.
    pub async fn request_token_pack_purchase(
        &self,
        user_id: &str,
        pack_id: &str,
        route: CheckoutRoute,
    ) -> WalletResult<CheckoutOutcome> {
        let pack = self
            .packs
            .lookup(pack_id)
            .ok_or_else(|| WalletError::UnknownPack(pack_id.to_string()))?;
        let metadata = IntentMetadata::TokenPack {
            pack_id: pack_id.to_string(),
            base_tokens: pack.base_tokens,
            bonus_tokens: pack.bonus_tokens,
            total_tokens: pack.total_tokens(),
        };
        self.initiate_with_provider(user_id, pack.price, &pack.name, metadata, route)
            .await
    }

    async fn initiate_with_provider(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
        metadata: IntentMetadata,
        route: CheckoutRoute,
    ) -> WalletResult<CheckoutOutcome> {
        let context = RoutingContext {
            phone: route.customer.phone.clone(),
        };
        let provider = recommend_provider(route.payment_type, &context);

        let mut intent = PaymentIntent::new(
            user_id,
            amount,
            self.currency,
            PaymentMethod::Provider(provider),
            metadata,
        );
        self.db.insert_intent(&intent)?;

        let request = PaymentRequest {
            transaction_id: intent.transaction_id.clone(),
            amount,
            currency: self.currency,
            description: description.to_string(),
            customer: route.customer.clone(),
            return_url: self.callbacks.return_url(provider)?,
            notify_url: self.callbacks.notify_url(provider)?,
        };

        let use_direct_debit = provider.supports(jobpay_types::Capability::DirectDebit)
            && route.customer.phone.is_some();
        let result = if use_direct_debit {
            let phone = route.customer.phone.as_deref().unwrap_or_default();
            self.gateway.direct_pay(provider, phone, &request).await
        } else {
            self.gateway.initiate(provider, &request).await
        };

        match result {
            Ok(payment) => {
                self.db
                    .mark_initiated(&intent.transaction_id, &payment.reference)?;
                intent.status = IntentStatus::Initiated;
                intent.external_id = Some(payment.reference.clone());
                info!(
                    user_id,
                    provider = %provider,
                    amount,
                    transaction_id = %intent.transaction_id,
                    "payment initiated"
                );
                Ok(CheckoutOutcome::ProviderInitiated {
                    intent,
                    provider,
                    payment,
                })
            }
            Err(err) => {
                // Never leave a dangling pending row behind an adapter error.
                self.db.mark_failed(&intent.transaction_id, None)?;
                warn!(
                    user_id,
                    provider = %provider,
                    transaction_id = %intent.transaction_id,
                    error = %err,
                    "payment initiation failed"
                );
                Err(err.into())
            }
        }
    }

    /// Settle an intent after an authoritative accepted status. Idempotent:
    /// an already-terminal intent is acknowledged without any ledger effect.
    pub async fn complete_intent(&self, intent: &PaymentIntent) -> WalletResult<CompletionOutcome> {
        if intent.status.is_terminal() {
            return Ok(CompletionOutcome::AlreadySettled);
        }

        let credit = match &intent.metadata {
            // Any wallet movement for a service happened synchronously at
            // checkout; completion only records the money payment.
            IntentMetadata::ServiceAccess { .. } => None,
            IntentMetadata::TokenPack {
                base_tokens,
                bonus_tokens,
                total_tokens,
                ..
            } => {
                if *total_tokens != base_tokens + bonus_tokens {
                    return Err(WalletError::CorruptMetadata(intent.transaction_id.clone()));
                }
                Some((intent.user_id.as_str(), *total_tokens))
            }
        };

        let outcome = self.db.complete_intent(&intent.transaction_id, credit)?;
        if outcome == CompletionOutcome::Applied {
            info!(
                user_id = %intent.user_id,
                amount = intent.amount,
                transaction_id = %intent.transaction_id,
                credited = credit.map(|(_, t)| t).unwrap_or(0),
                "intent completed"
            );
        }
        Ok(outcome)
    }

    /// Explicit expiry of a stale initiated intent.
    pub fn expire_intent(&self, transaction_id: &str) -> WalletResult<bool> {
        Ok(self.db.expire_intent(transaction_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use jobpay_types::ChargeStatus;
    use std::sync::atomic::Ordering;

    fn service(db: Arc<DbManager>, gateway: Arc<MockGateway>) -> WalletService {
        WalletService::new(
            db,
            gateway,
            ServiceCatalog::builtin(),
            TokenPackCatalog::builtin(),
            CallbackUrls::new(Url::parse("https://jobpay.example/").unwrap()),
            Currency::Xaf,
        )
    }

    fn web_route() -> CheckoutRoute {
        CheckoutRoute {
            payment_type: PaymentType::Web,
            customer: Customer::default(),
        }
    }

    #[tokio::test]
    async fn sufficient_balance_never_touches_a_provider() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());
        db.grant_tokens("alice", 10).unwrap();

        let outcome = service(db.clone(), gateway.clone())
            .request_service_access("alice", "cv-review", "basic", web_route())
            .await
            .unwrap();

        match outcome {
            CheckoutOutcome::Unlocked {
                intent,
                remaining_balance,
            } => {
                assert_eq!(intent.status, IntentStatus::Completed);
                assert_eq!(intent.amount, 0);
                assert_eq!(remaining_balance, 5);
            }
            other => panic!("expected wallet unlock, got {other:?}"),
        }
        assert_eq!(gateway.initiate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.direct_pay_calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.wallet_balance("alice").unwrap(), 5);
    }

    #[tokio::test]
    async fn insufficient_balance_initiates_exactly_one_intent() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());

        let outcome = service(db.clone(), gateway.clone())
            .request_service_access("bob", "cv-review", "basic", web_route())
            .await
            .unwrap();

        match outcome {
            CheckoutOutcome::ProviderInitiated {
                intent,
                provider,
                payment,
            } => {
                assert_eq!(provider, ProviderKind::Payunit);
                assert_eq!(intent.status, IntentStatus::Initiated);
                assert_eq!(intent.amount, 300);
                assert!(payment.redirect_url.is_some());
                let stored = db.find_intent(&intent.transaction_id).unwrap().unwrap();
                assert_eq!(stored.status, IntentStatus::Initiated);
                assert!(stored.external_id.is_some());
            }
            other => panic!("expected provider initiation, got {other:?}"),
        }
        assert_eq!(gateway.initiate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mobile_route_with_phone_uses_direct_debit() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());

        let route = CheckoutRoute {
            payment_type: PaymentType::Mobile,
            customer: Customer {
                phone: Some("690000000".to_string()),
                ..Customer::default()
            },
        };
        let outcome = service(db, gateway.clone())
            .request_token_pack_purchase("carol", "starter", route)
            .await
            .unwrap();

        match outcome {
            CheckoutOutcome::ProviderInitiated { provider, .. } => {
                assert_eq!(provider, ProviderKind::Campay);
            }
            other => panic!("expected provider initiation, got {other:?}"),
        }
        assert_eq!(gateway.direct_pay_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.initiate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn adapter_failure_marks_the_intent_failed() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway {
            fail_initiate: true,
            ..MockGateway::default()
        });

        let err = service(db.clone(), gateway)
            .request_token_pack_purchase("dave", "starter", web_route())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Payment(_)));

        // The pending row was not left dangling.
        let history = db.intents_for_user("dave").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, IntentStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_service_is_a_not_found_error() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());
        let err = service(db, gateway)
            .request_service_access("erin", "palm-reading", "basic", web_route())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::UnknownService(_)));
    }

    #[tokio::test]
    async fn pack_completion_credits_exactly_the_baked_total() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());
        let svc = service(db.clone(), gateway);

        let outcome = svc
            .request_token_pack_purchase("frank", "starter", web_route())
            .await
            .unwrap();
        let intent = match outcome {
            CheckoutOutcome::ProviderInitiated { intent, .. } => intent,
            other => panic!("expected provider initiation, got {other:?}"),
        };

        assert_eq!(
            svc.complete_intent(&intent).await.unwrap(),
            CompletionOutcome::Applied
        );
        assert_eq!(db.wallet_balance("frank").unwrap(), 25);

        // Duplicate delivery: no further credit.
        let stored = db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(
            svc.complete_intent(&stored).await.unwrap(),
            CompletionOutcome::AlreadySettled
        );
        assert_eq!(db.wallet_balance("frank").unwrap(), 25);
    }

    #[tokio::test]
    async fn service_completion_never_credits_tokens() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());
        let svc = service(db.clone(), gateway);

        let outcome = svc
            .request_service_access("grace", "cv-review", "basic", web_route())
            .await
            .unwrap();
        let intent = match outcome {
            CheckoutOutcome::ProviderInitiated { intent, .. } => intent,
            other => panic!("expected provider initiation, got {other:?}"),
        };

        svc.complete_intent(&intent).await.unwrap();
        assert_eq!(db.wallet_balance("grace").unwrap(), 0);
        let stored = db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Completed);
    }

    #[tokio::test]
    async fn corrupt_pack_metadata_is_rejected_not_guessed() {
        let db = Arc::new(DbManager::in_memory().unwrap());
        let gateway = Arc::new(MockGateway::default());
        let svc = service(db.clone(), gateway);

        let intent = PaymentIntent::new(
            "heidi",
            1000,
            Currency::Xaf,
            PaymentMethod::Provider(ProviderKind::Campay),
            IntentMetadata::TokenPack {
                pack_id: "starter".into(),
                base_tokens: 20,
                bonus_tokens: 5,
                total_tokens: 99,
            },
        );
        db.insert_intent(&intent).unwrap();

        let err = svc.complete_intent(&intent).await.unwrap_err();
        assert!(matches!(err, WalletError::CorruptMetadata(_)));
        assert_eq!(db.wallet_balance("heidi").unwrap(), 0);
        let stored = db.find_intent(&intent.transaction_id).unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Pending);
    }

    #[tokio::test]
    async fn gateway_status_scripting_is_available_to_tests() {
        // Sanity-check the mock itself so api tests can rely on it.
        let gateway = MockGateway::default();
        gateway.set_status(ChargeStatus::Refused {
            reason: "no funds".into(),
        });
        let status = gateway
            .check_status(ProviderKind::Campay, "ref")
            .await
            .unwrap();
        assert!(matches!(status, ChargeStatus::Refused { .. }));
    }
}
