//! Persistent holdings ledger.
//!
//! The only durable state the bot owns: a mapping of
//! `(condition_id, token_id) -> quantity` for positions acquired by copied
//! buys. Sell sizing and redemption eligibility are both driven from here.
//!
//! Every mutation is a read-modify-write inside a SQLite transaction, so a
//! crash mid-mutation leaves the previous committed state readable. The pool
//! is capped at a single connection: the pipeline processes one trade at a
//! time and the sweeper holds the copy gate while it runs, so there is never
//! more than one logical writer.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::str::FromStr;

/// One ledger row: quantity of an outcome token held in a market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub condition_id: String,
    pub token_id: String,
    pub quantity: Decimal,
}

/// SQLite-backed holdings ledger.
pub struct HoldingsLedger {
    pool: SqlitePool,
}

impl HoldingsLedger {
    /// Open (or create) the ledger at the given database URL.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to ledger database")?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;

        Ok(ledger)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS holdings (
                condition_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                quantity TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (condition_id, token_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Quantity held for a key; zero if absent.
    pub async fn get(&self, condition_id: &str, token_id: &str) -> Result<Decimal> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT quantity FROM holdings WHERE condition_id = ? AND token_id = ?",
        )
        .bind(condition_id)
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((raw,)) => parse_quantity(&raw),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Increment the quantity for a key, creating the row on first use.
    pub async fn add(&self, condition_id: &str, token_id: &str, amount: Decimal) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT quantity FROM holdings WHERE condition_id = ? AND token_id = ?",
        )
        .bind(condition_id)
        .bind(token_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = match row {
            Some((raw,)) => parse_quantity(&raw)?,
            None => Decimal::ZERO,
        };
        let next = (current + amount).max(Decimal::ZERO);

        sqlx::query(
            r#"
            INSERT INTO holdings (condition_id, token_id, quantity, updated_at)
            VALUES (?, ?, ?, datetime('now'))
            ON CONFLICT(condition_id, token_id) DO UPDATE SET
                quantity = excluded.quantity,
                updated_at = datetime('now')
            "#,
        )
        .bind(condition_id)
        .bind(token_id)
        .bind(next.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Decrement the quantity for a key, clamping at zero.
    ///
    /// Rows that reach zero are dropped; `get` treats absent as zero.
    pub async fn remove(&self, condition_id: &str, token_id: &str, amount: Decimal) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT quantity FROM holdings WHERE condition_id = ? AND token_id = ?",
        )
        .bind(condition_id)
        .bind(token_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((raw,)) = row else {
            tx.commit().await?;
            return Ok(());
        };

        let current = parse_quantity(&raw)?;
        let next = (current - amount).max(Decimal::ZERO);

        if next.is_zero() {
            sqlx::query("DELETE FROM holdings WHERE condition_id = ? AND token_id = ?")
                .bind(condition_id)
                .bind(token_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                "UPDATE holdings SET quantity = ?, updated_at = datetime('now') WHERE condition_id = ? AND token_id = ?",
            )
            .bind(next.to_string())
            .bind(condition_id)
            .bind(token_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Drop a ledger entry entirely (used after redemption).
    pub async fn remove_entry(&self, condition_id: &str, token_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM holdings WHERE condition_id = ? AND token_id = ?")
            .bind(condition_id)
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Every current ledger entry, ordered by market.
    pub async fn entries(&self) -> Result<Vec<Holding>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT condition_id, token_id, quantity FROM holdings ORDER BY condition_id, token_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch ledger entries")?;

        rows.into_iter()
            .map(|(condition_id, token_id, raw)| {
                Ok(Holding {
                    condition_id,
                    token_id,
                    quantity: parse_quantity(&raw)?,
                })
            })
            .collect()
    }
}

fn parse_quantity(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("Corrupt ledger quantity: {raw}"))
}
