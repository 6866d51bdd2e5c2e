//! Routing facade over the three provider adapters: provider validation, the
//! recommendation decision table, capability gating and response
//! normalization. All gating happens before adapter code runs, so an
//! unsupported operation never forms a request.

use async_trait::async_trait;
use jobpay_driver_campay::CampayClient;
use jobpay_driver_monetbil::MonetbilClient;
use jobpay_driver_payunit::PayunitClient;
use jobpay_types::{
    Capability, ChargeStatus, Currency, InitiatedPayment, PaymentError, PaymentRequest,
    PaymentResult, PaymentType, ProviderKind,
};
use tracing::info;

/// Reject unknown provider names before any dispatch.
pub fn validate_provider(name: &str) -> PaymentResult<ProviderKind> {
    name.parse()
}

/// Context available when choosing a provider for a checkout.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub phone: Option<String>,
}

/// Pure decision table mapping a payment entry point to a provider.
///
/// Web checkouts go through the hosted-page aggregator. A mobile payment
/// with a phone number on hand can be pushed straight to the handset via the
/// full-featured provider; without a number the hosted page still offers
/// mobile money as an option.
pub fn recommend_provider(payment_type: PaymentType, context: &RoutingContext) -> ProviderKind {
    match (payment_type, context.phone.as_deref()) {
        (PaymentType::Web, _) => ProviderKind::Payunit,
        (PaymentType::Mobile, Some(_)) => ProviderKind::Campay,
        (PaymentType::Mobile, None) => ProviderKind::Payunit,
    }
}

/// Uniform call contract over the provider adapters. The facade implements
/// it for production; tests substitute a mock to count and script calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a checkout with the selected provider.
    async fn initiate(
        &self,
        provider: ProviderKind,
        request: &PaymentRequest,
    ) -> PaymentResult<InitiatedPayment>;

    /// Push a debit to the customer's handset (direct-debit providers only).
    async fn direct_pay(
        &self,
        provider: ProviderKind,
        phone: &str,
        request: &PaymentRequest,
    ) -> PaymentResult<InitiatedPayment>;

    /// Authoritative provider-side verdict, keyed by the initiation
    /// reference.
    async fn check_status(
        &self,
        provider: ProviderKind,
        reference: &str,
    ) -> PaymentResult<ChargeStatus>;

    /// Merchant balance (capability-gated).
    async fn balance(&self, provider: ProviderKind) -> PaymentResult<i64>;

    /// Outbound transfer to a subscriber (capability-gated).
    async fn payout(
        &self,
        provider: ProviderKind,
        phone: &str,
        amount: i64,
        currency: Currency,
        description: &str,
    ) -> PaymentResult<String>;
}

/// Production gateway holding one client per provider.
pub struct PaymentFacade {
    payunit: PayunitClient,
    monetbil: MonetbilClient,
    campay: CampayClient,
}

impl PaymentFacade {
    pub fn new(payunit: PayunitClient, monetbil: MonetbilClient, campay: CampayClient) -> Self {
        PaymentFacade {
            payunit,
            monetbil,
            campay,
        }
    }
}

fn ensure_capability(
    provider: ProviderKind,
    capability: Capability,
    operation: &'static str,
) -> PaymentResult<()> {
    if !provider.supports(capability) {
        return Err(PaymentError::Capability {
            provider,
            operation,
        });
    }
    Ok(())
}

#[async_trait]
impl Gateway for PaymentFacade {
    async fn initiate(
        &self,
        provider: ProviderKind,
        request: &PaymentRequest,
    ) -> PaymentResult<InitiatedPayment> {
        ensure_capability(provider, Capability::HostedCheckout, "initiate")?;
        info!(
            provider = %provider,
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "initiating payment"
        );
        match provider {
            ProviderKind::Payunit => self.payunit.initiate(request).await,
            ProviderKind::Monetbil => self.monetbil.initiate(request).await,
            ProviderKind::Campay => self.campay.initiate(request).await,
        }
    }

    async fn direct_pay(
        &self,
        provider: ProviderKind,
        phone: &str,
        request: &PaymentRequest,
    ) -> PaymentResult<InitiatedPayment> {
        ensure_capability(provider, Capability::DirectDebit, "direct_pay")?;
        info!(
            provider = %provider,
            transaction_id = %request.transaction_id,
            amount = request.amount,
            "placing direct debit"
        );
        match provider {
            ProviderKind::Monetbil => self.monetbil.direct_pay(phone, request).await,
            ProviderKind::Campay => self.campay.direct_pay(phone, request).await,
            ProviderKind::Payunit => Err(PaymentError::Capability {
                provider,
                operation: "direct_pay",
            }),
        }
    }

    async fn check_status(
        &self,
        provider: ProviderKind,
        reference: &str,
    ) -> PaymentResult<ChargeStatus> {
        match provider {
            ProviderKind::Payunit => self.payunit.check_status(reference).await,
            ProviderKind::Monetbil => self.monetbil.check_status(reference).await,
            ProviderKind::Campay => self.campay.check_status(reference).await,
        }
    }

    async fn balance(&self, provider: ProviderKind) -> PaymentResult<i64> {
        ensure_capability(provider, Capability::Balance, "balance")?;
        match provider {
            ProviderKind::Campay => self.campay.balance().await,
            _ => Err(PaymentError::Capability {
                provider,
                operation: "balance",
            }),
        }
    }

    async fn payout(
        &self,
        provider: ProviderKind,
        phone: &str,
        amount: i64,
        currency: Currency,
        description: &str,
    ) -> PaymentResult<String> {
        ensure_capability(provider, Capability::Payout, "payout")?;
        info!(provider = %provider, amount, "sending payout");
        match provider {
            ProviderKind::Campay => self.campay.payout(phone, amount, currency, description).await,
            _ => Err(PaymentError::Capability {
                provider,
                operation: "payout",
            }),
        }
    }
}
