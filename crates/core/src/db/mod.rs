//! Persistence layer: payment intents and wallet balances in sqlite behind an
//! r2d2 pool. Status transitions are guarded single UPDATEs (the affected-row
//! count is the compare-and-swap), and every ledger mutation shares a
//! transaction with the intent transition it belongs to.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use jobpay_types::{IntentStatus, PaymentIntent};
use tracing::debug;

pub mod models;
pub mod schema;

use models::{NewPaymentIntent, NewWalletBalance, PaymentIntentModel};
use schema::{payment_intents, wallet_balances};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./src/db/migrations");

type DbConnection = diesel::sqlite::SqliteConnection;

pub type PooledConnection = diesel::r2d2::PooledConnection<ConnectionManager<DbConnection>>;

pub type DbPool = Pool<ConnectionManager<DbConnection>>;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database connection error: {0}")]
    ConnectionError(String),
    #[error("database migration error: {0}")]
    MigrationError(String),
    #[error("query failed: {0}")]
    QueryError(#[from] diesel::result::Error),
    #[error("stored row is corrupt: {0}")]
    CorruptRow(String),
    #[error("intent not found: {0}")]
    IntentNotFound(String),
    #[error("illegal status transition for intent {0}")]
    InvalidTransition(String),
    #[error("insufficient wallet balance for user {0}")]
    InsufficientBalance(String),
}

/// Result of a completion attempt. `AlreadySettled` is the idempotent no-op
/// taken when a duplicate or late delivery finds the intent terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Applied,
    AlreadySettled,
}

#[derive(Debug)]
pub struct DbManager {
    pool: DbPool,
}

impl DbManager {
    pub fn new(database_url: &str) -> DbResult<Self> {
        debug!("establishing connection to database at {}", database_url);
        let manager = ConnectionManager::<DbConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        let db = DbManager { pool };
        db.run_migrations()?;
        Ok(db)
    }

    /// Private in-memory database. The pool is pinned to a single connection
    /// because every sqlite `:memory:` connection is its own database.
    pub fn in_memory() -> DbResult<Self> {
        let manager = ConnectionManager::<DbConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        let db = DbManager { pool };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        debug!("running database migrations");
        let mut conn = self.conn()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::MigrationError(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> DbResult<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    pub fn insert_intent(&self, intent: &PaymentIntent) -> DbResult<()> {
        let mut conn = self.conn()?;
        let row = NewPaymentIntent::from_domain(intent)?;
        diesel::insert_into(payment_intents::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn find_intent(&self, transaction_id: &str) -> DbResult<Option<PaymentIntent>> {
        let mut conn = self.conn()?;
        let row = payment_intents::table
            .filter(payment_intents::transaction_id.eq(transaction_id))
            .first::<PaymentIntentModel>(&mut conn)
            .optional()?;
        row.map(PaymentIntentModel::into_domain).transpose()
    }

    /// pending -> initiated, recording the provider's token. Fails when the
    /// intent is missing or no longer pending.
    pub fn mark_initiated(&self, transaction_id: &str, external_id: &str) -> DbResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            payment_intents::table.filter(
                payment_intents::transaction_id
                    .eq(transaction_id)
                    .and(payment_intents::status.eq(IntentStatus::Pending.as_str())),
            ),
        )
        .set((
            payment_intents::status.eq(IntentStatus::Initiated.as_str()),
            payment_intents::external_id.eq(external_id),
        ))
        .execute(&mut conn)?;
        if updated == 0 {
            return Err(self.transition_failure(&mut conn, transaction_id));
        }
        Ok(())
    }

    /// Live -> failed, keeping the raw provider payload for audit. Returns
    /// false (without touching the row) when the intent is already terminal.
    pub fn mark_failed(&self, transaction_id: &str, payload: Option<&str>) -> DbResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            payment_intents::table.filter(
                payment_intents::transaction_id.eq(transaction_id).and(
                    payment_intents::status.eq_any([
                        IntentStatus::Pending.as_str(),
                        IntentStatus::Initiated.as_str(),
                    ]),
                ),
            ),
        )
        .set((
            payment_intents::status.eq(IntentStatus::Failed.as_str()),
            payment_intents::provider_payload.eq(payload),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    /// Explicit initiated -> expired edge. Returns false when the intent was
    /// not in `initiated`.
    pub fn expire_intent(&self, transaction_id: &str) -> DbResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            payment_intents::table.filter(
                payment_intents::transaction_id
                    .eq(transaction_id)
                    .and(payment_intents::status.eq(IntentStatus::Initiated.as_str())),
            ),
        )
        .set(payment_intents::status.eq(IntentStatus::Expired.as_str()))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    /// Complete an intent and, for token-pack purchases, credit the wallet.
    ///
    /// The guarded UPDATE and the credit run in one transaction: two
    /// concurrent deliveries race on the status row, exactly one sees an
    /// affected row, and only that one credits. The loser observes a terminal
    /// status and reports the idempotent no-op.
    pub fn complete_intent(
        &self,
        transaction_id: &str,
        credit: Option<(&str, i64)>,
    ) -> DbResult<CompletionOutcome> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();
        conn.transaction::<_, DbError, _>(|conn| {
            let updated = diesel::update(
                payment_intents::table.filter(
                    payment_intents::transaction_id
                        .eq(transaction_id)
                        .and(payment_intents::status.eq(IntentStatus::Initiated.as_str())),
                ),
            )
            .set((
                payment_intents::status.eq(IntentStatus::Completed.as_str()),
                payment_intents::completed_at.eq(Some(now)),
            ))
            .execute(conn)?;

            if updated == 0 {
                let status = current_status(conn, transaction_id)?
                    .ok_or_else(|| DbError::IntentNotFound(transaction_id.to_string()))?;
                if status.is_terminal() {
                    return Ok(CompletionOutcome::AlreadySettled);
                }
                return Err(DbError::InvalidTransition(transaction_id.to_string()));
            }

            if let Some((user_id, tokens)) = credit {
                credit_wallet(conn, user_id, tokens, now)?;
            }
            Ok(CompletionOutcome::Applied)
        })
    }

    /// Record a pure-wallet debit: decrement the balance and insert the
    /// already-completed intent, or do neither.
    pub fn debit_for_service(&self, intent: &PaymentIntent, tokens: i64) -> DbResult<()> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();
        let row = NewPaymentIntent::from_domain(intent)?;
        conn.transaction::<_, DbError, _>(|conn| {
            // The balance >= tokens guard keeps the counter non-negative
            // under concurrent debits; zero affected rows means the balance
            // moved underneath us.
            let debited = diesel::update(
                wallet_balances::table.filter(
                    wallet_balances::user_id
                        .eq(&intent.user_id)
                        .and(wallet_balances::balance.ge(tokens)),
                ),
            )
            .set((
                wallet_balances::balance.eq(wallet_balances::balance - tokens),
                wallet_balances::updated_at.eq(now),
            ))
            .execute(conn)?;
            if debited == 0 {
                return Err(DbError::InsufficientBalance(intent.user_id.clone()));
            }
            diesel::insert_into(payment_intents::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
    }

    pub fn wallet_balance(&self, user_id: &str) -> DbResult<i64> {
        let mut conn = self.conn()?;
        let balance = wallet_balances::table
            .filter(wallet_balances::user_id.eq(user_id))
            .select(wallet_balances::balance)
            .first::<i64>(&mut conn)
            .optional()?;
        Ok(balance.unwrap_or(0))
    }

    /// Look an intent up by whichever reference a callback carried: our
    /// transaction id or the provider-issued external id.
    pub fn find_intent_by_reference(&self, reference: &str) -> DbResult<Option<PaymentIntent>> {
        let mut conn = self.conn()?;
        let row = payment_intents::table
            .filter(
                payment_intents::transaction_id
                    .eq(reference)
                    .or(payment_intents::external_id.eq(reference)),
            )
            .first::<PaymentIntentModel>(&mut conn)
            .optional()?;
        row.map(PaymentIntentModel::into_domain).transpose()
    }

    /// A user's payment history, newest first.
    pub fn intents_for_user(&self, user_id: &str) -> DbResult<Vec<PaymentIntent>> {
        let mut conn = self.conn()?;
        let rows = payment_intents::table
            .filter(payment_intents::user_id.eq(user_id))
            .order(payment_intents::created_at.desc())
            .load::<PaymentIntentModel>(&mut conn)?;
        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    /// Administrative credit, used for promotions and test fixtures.
    pub fn grant_tokens(&self, user_id: &str, tokens: i64) -> DbResult<()> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();
        conn.transaction::<_, DbError, _>(|conn| credit_wallet(conn, user_id, tokens, now))
    }

    fn transition_failure(&self, conn: &mut PooledConnection, transaction_id: &str) -> DbError {
        match current_status(conn, transaction_id) {
            Ok(Some(_)) => DbError::InvalidTransition(transaction_id.to_string()),
            Ok(None) => DbError::IntentNotFound(transaction_id.to_string()),
            Err(e) => e,
        }
    }
}

fn current_status(
    conn: &mut DbConnection,
    transaction_id: &str,
) -> DbResult<Option<IntentStatus>> {
    let raw = payment_intents::table
        .filter(payment_intents::transaction_id.eq(transaction_id))
        .select(payment_intents::status)
        .first::<String>(conn)
        .optional()?;
    raw.map(|s| {
        s.parse::<IntentStatus>()
            .map_err(|_| DbError::CorruptRow(format!("intent {transaction_id}: bad status {s}")))
    })
    .transpose()
}

fn credit_wallet(conn: &mut DbConnection, user_id: &str, tokens: i64, now: i64) -> DbResult<()> {
    let updated = diesel::update(wallet_balances::table.filter(wallet_balances::user_id.eq(user_id)))
        .set((
            wallet_balances::balance.eq(wallet_balances::balance + tokens),
            wallet_balances::updated_at.eq(now),
        ))
        .execute(conn)?;
    if updated == 0 {
        diesel::insert_into(wallet_balances::table)
            .values(&NewWalletBalance {
                user_id,
                balance: tokens,
                updated_at: now,
            })
            .execute(conn)?;
    }
    Ok(())
}
