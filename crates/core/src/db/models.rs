use chrono::{DateTime, Utc};
use diesel::prelude::*;
use jobpay_types::{IntentMetadata, PaymentIntent};

use crate::db::DbError;
use crate::db::schema::*;

/// Row shape of a persisted payment intent. Status, method, currency and
/// metadata are stored as text and parsed back on read.
#[derive(Debug, Queryable, Identifiable, Selectable)]
#[diesel(table_name = payment_intents)]
pub struct PaymentIntentModel {
    pub id: i32,
    pub transaction_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub external_id: Option<String>,
    pub metadata: String,
    /// Raw provider payload stored for audit when a notify marks the intent
    /// failed.
    pub provider_payload: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl PaymentIntentModel {
    pub fn into_domain(self) -> Result<PaymentIntent, DbError> {
        let corrupt = |what: &str| {
            DbError::CorruptRow(format!(
                "intent {}: unreadable {what}",
                self.transaction_id
            ))
        };
        let metadata: IntentMetadata =
            serde_json::from_str(&self.metadata).map_err(|_| corrupt("metadata"))?;
        Ok(PaymentIntent {
            currency: self.currency.parse().map_err(|_| corrupt("currency"))?,
            status: self.status.parse().map_err(|_| corrupt("status"))?,
            payment_method: self
                .payment_method
                .parse()
                .map_err(|_| corrupt("payment_method"))?,
            metadata,
            transaction_id: self.transaction_id,
            user_id: self.user_id,
            amount: self.amount,
            external_id: self.external_id,
            created_at: epoch_to_datetime(self.created_at),
            completed_at: self.completed_at.map(epoch_to_datetime),
        })
    }
}

fn epoch_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payment_intents)]
pub struct NewPaymentIntent {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub external_id: Option<String>,
    pub metadata: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl NewPaymentIntent {
    pub fn from_domain(intent: &PaymentIntent) -> Result<Self, DbError> {
        let metadata = serde_json::to_string(&intent.metadata).map_err(|e| {
            DbError::CorruptRow(format!(
                "intent {}: unserializable metadata: {e}",
                intent.transaction_id
            ))
        })?;
        Ok(NewPaymentIntent {
            transaction_id: intent.transaction_id.clone(),
            user_id: intent.user_id.clone(),
            amount: intent.amount,
            currency: intent.currency.as_str().to_string(),
            status: intent.status.as_str().to_string(),
            payment_method: intent.payment_method.as_str().to_string(),
            external_id: intent.external_id.clone(),
            metadata,
            created_at: intent.created_at.timestamp(),
            completed_at: intent.completed_at.map(|dt| dt.timestamp()),
        })
    }
}

#[derive(Debug, Queryable, Identifiable, Selectable)]
#[diesel(table_name = wallet_balances)]
pub struct WalletBalanceModel {
    pub id: i32,
    pub user_id: String,
    pub balance: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wallet_balances)]
pub struct NewWalletBalance<'a> {
    pub user_id: &'a str,
    pub balance: i64,
    pub updated_at: i64,
}
