use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// Settlement currencies accepted by the configured providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Xaf,
    Xof,
    Cdf,
    Gnf,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Xaf, Currency::Xof, Currency::Cdf, Currency::Gnf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Xaf => "XAF",
            Currency::Xof => "XOF",
            Currency::Cdf => "CDF",
            Currency::Gnf => "GNF",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "XAF" => Ok(Currency::Xaf),
            "XOF" => Ok(Currency::Xof),
            "CDF" => Ok(Currency::Cdf),
            "GNF" => Ok(Currency::Gnf),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// Lifecycle state of a payment intent.
///
/// The only live path is pending -> initiated -> {completed, failed}, plus an
/// explicit expire edge from initiated. Completed, failed and expired are
/// absorbing: no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Initiated,
    Completed,
    Failed,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Initiated => "initiated",
            IntentStatus::Completed => "completed",
            IntentStatus::Failed => "failed",
            IntentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Completed | IntentStatus::Failed | IntentStatus::Expired
        )
    }

    /// Whether `next` is a legal successor of `self`. Completion is only
    /// reachable from `initiated`; wallet debits are born completed and
    /// never transition.
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        match self {
            IntentStatus::Pending => {
                matches!(next, IntentStatus::Initiated | IntentStatus::Failed)
            }
            IntentStatus::Initiated => matches!(
                next,
                IntentStatus::Completed | IntentStatus::Failed | IntentStatus::Expired
            ),
            _ => false,
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "initiated" => Ok(IntentStatus::Initiated),
            "completed" => Ok(IntentStatus::Completed),
            "failed" => Ok(IntentStatus::Failed),
            "expired" => Ok(IntentStatus::Expired),
            other => Err(format!("unknown intent status: {other}")),
        }
    }
}

/// How an intent was (or will be) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Paid with internal tokens; no provider involved.
    Wallet,
    Provider(ProviderKind),
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Provider(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "wallet" {
            return Ok(PaymentMethod::Wallet);
        }
        s.parse::<ProviderKind>()
            .map(PaymentMethod::Provider)
            .map_err(|_| format!("unknown payment method: {s}"))
    }
}

impl Serialize for PaymentMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a payment pays for. Written once when the intent is created and
/// treated as the sole source of truth at completion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentMetadata {
    /// Unlocks a priced platform service. Never credits tokens on completion;
    /// any wallet debit happened synchronously at checkout.
    ServiceAccess {
        service_id: String,
        plan: String,
        tokens_required: i64,
    },
    /// Buys a token pack. `total_tokens` is baked in at purchase time so that
    /// completion needs no catalog lookup.
    TokenPack {
        pack_id: String,
        base_tokens: i64,
        bonus_tokens: i64,
        total_tokens: i64,
    },
}

/// Durable record of one payment attempt or outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Globally unique correlation key echoed by providers on callbacks.
    pub transaction_id: String,
    pub user_id: String,
    /// Amount in minor units. Zero for pure-wallet debits.
    pub amount: i64,
    pub currency: Currency,
    pub status: IntentStatus,
    pub payment_method: PaymentMethod,
    /// Provider-side token, set once the adapter accepts the initiation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub metadata: IntentMetadata,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentIntent {
    /// New pending intent awaiting a provider initiation.
    pub fn new(
        user_id: impl Into<String>,
        amount: i64,
        currency: Currency,
        payment_method: PaymentMethod,
        metadata: IntentMetadata,
    ) -> Self {
        PaymentIntent {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            amount,
            currency,
            status: IntentStatus::Pending,
            payment_method,
            external_id: None,
            metadata,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Already-completed zero-amount intent recording a pure-wallet debit.
    pub fn completed_wallet_debit(
        user_id: impl Into<String>,
        currency: Currency,
        metadata: IntentMetadata,
    ) -> Self {
        let now = Utc::now();
        PaymentIntent {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            amount: 0,
            currency,
            status: IntentStatus::Completed,
            payment_method: PaymentMethod::Wallet,
            external_id: None,
            metadata,
            created_at: now,
            completed_at: Some(now),
        }
    }
}
