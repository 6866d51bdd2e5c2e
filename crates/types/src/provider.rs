use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PaymentError;
use crate::intent::Currency;

/// External payment processors known to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Checkout-redirect aggregator: hosted payment page only.
    Payunit,
    /// Mobile-money processor: widget checkout and USSD push to handset.
    Monetbil,
    /// Full-featured processor: checkout, direct debit, balance and payout.
    Campay,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Payunit,
        ProviderKind::Monetbil,
        ProviderKind::Campay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Payunit => "payunit",
            ProviderKind::Monetbil => "monetbil",
            ProviderKind::Campay => "campay",
        }
    }

    /// Capability matrix. Gated operations are rejected against providers
    /// that return `false` here, before any network call.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::HostedCheckout => true,
            Capability::DirectDebit => {
                matches!(self, ProviderKind::Monetbil | ProviderKind::Campay)
            }
            Capability::Payout | Capability::Balance => matches!(self, ProviderKind::Campay),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payunit" => Ok(ProviderKind::Payunit),
            "monetbil" => Ok(ProviderKind::Monetbil),
            "campay" => Ok(ProviderKind::Campay),
            other => Err(PaymentError::UnknownProvider(other.to_string())),
        }
    }
}

/// Operations a provider may or may not expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    HostedCheckout,
    DirectDebit,
    Payout,
    Balance,
}

/// Payment entry points a checkout request can arrive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Web,
    Mobile,
}

/// Customer contact details forwarded to the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Local mobile-money number, nine digits starting with 65-69.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Generic initiation request, shaped into provider-specific payloads by the
/// routing facade.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Our correlation key, echoed back by the provider on every callback.
    pub transaction_id: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub customer: Customer,
    /// Browser redirect target after checkout.
    pub return_url: Url,
    /// Server-to-server confirmation target.
    pub notify_url: Url,
}

/// Successful initiation, normalized across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedPayment {
    /// Provider-side token for the payment; persisted as the intent's
    /// external id.
    pub reference: String,
    /// Hosted page the browser must be sent to. Absent for handset push
    /// flows, where the customer confirms on the phone instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<Url>,
}

/// Authoritative provider-side verdict for one transaction, as reported by
/// the provider's status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChargeStatus {
    Accepted { amount: i64 },
    Refused { reason: String },
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = "paypal".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, PaymentError::UnknownProvider(name) if name == "paypal"));
    }

    #[test]
    fn payout_is_campay_only() {
        assert!(ProviderKind::Campay.supports(Capability::Payout));
        assert!(!ProviderKind::Payunit.supports(Capability::Payout));
        assert!(!ProviderKind::Monetbil.supports(Capability::Payout));
    }

    #[test]
    fn every_provider_offers_hosted_checkout() {
        for kind in ProviderKind::ALL {
            assert!(kind.supports(Capability::HostedCheckout));
        }
    }
}
