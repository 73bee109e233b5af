pub mod directory;

pub use directory::TokenListClient;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::core::{ServiceError, TokenBalance, TokenInfo, WalletRecord};

/// Fixed key of the single directory-refresh metadata row.
const DIRECTORY_META_KEY: &str = "token-directory";

/// SQLite store for tracked wallets, cached token balances and the
/// token-symbol directory.
#[derive(Clone)]
pub struct WalletStore {
    connection: Arc<Mutex<Connection>>,
}

fn configure_connection(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "temp_store", "memory")?;
    connection.busy_timeout(std::time::Duration::from_millis(30_000))?;
    Ok(())
}

impl WalletStore {
    pub fn new(path: &str) -> Result<Self, ServiceError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ServiceError::NoDataFound(format!("cannot create data directory: {}", e))
                })?;
            }
        }

        let connection = Connection::open(path)?;
        configure_connection(&connection)?;

        connection.execute(
            "CREATE TABLE IF NOT EXISTS wallets (
                address TEXT PRIMARY KEY,
                note TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        connection.execute(
            "CREATE TABLE IF NOT EXISTS token_balances (
                owner_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                amount TEXT NOT NULL,
                value TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (owner_address, symbol)
            )",
            [],
        )?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS idx_balances_owner ON token_balances(owner_address)",
            [],
        )?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS idx_balances_timestamp ON token_balances(timestamp)",
            [],
        )?;

        connection.execute(
            "CREATE TABLE IF NOT EXISTS token_directory (
                mint TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                decimals INTEGER NOT NULL
            )",
            [],
        )?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS idx_directory_symbol ON token_directory(symbol)",
            [],
        )?;

        connection.execute(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                last_updated INTEGER NOT NULL,
                version INTEGER NOT NULL
            )",
            [],
        )?;

        info!(path = %path, "Wallet store opened");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    // ---- wallets ----

    pub fn upsert_wallet(&self, wallet: &WalletRecord) -> Result<(), ServiceError> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO wallets (address, note, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(address) DO UPDATE SET note = excluded.note",
            params![
                wallet.address,
                wallet.note,
                wallet.created_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    pub fn wallet_exists(&self, address: &str) -> Result<bool, ServiceError> {
        let conn = self.connection.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM wallets WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_wallet(&self, address: &str) -> Result<Option<WalletRecord>, ServiceError> {
        let conn = self.connection.lock().unwrap();
        let wallet = conn
            .query_row(
                "SELECT address, note, created_at FROM wallets WHERE address = ?1",
                params![address],
                row_to_wallet,
            )
            .optional()?;
        Ok(wallet)
    }

    pub fn list_wallets(&self) -> Result<Vec<WalletRecord>, ServiceError> {
        let conn = self.connection.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT address, note, created_at FROM wallets ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_wallet)?;

        let mut wallets = Vec::new();
        for wallet in rows {
            wallets.push(wallet?);
        }
        Ok(wallets)
    }

    pub fn update_note(&self, address: &str, note: Option<&str>) -> Result<(), ServiceError> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "UPDATE wallets SET note = ?2 WHERE address = ?1",
            params![address, note],
        )?;
        Ok(())
    }

    /// Removes the wallet together with its cached balances.
    pub fn delete_wallet(&self, address: &str) -> Result<(), ServiceError> {
        let mut conn = self.connection.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM token_balances WHERE owner_address = ?1",
            params![address],
        )?;
        tx.execute("DELETE FROM wallets WHERE address = ?1", params![address])?;
        tx.commit()?;
        Ok(())
    }

    // ---- token balances ----

    /// Transactional replace-all for one address: existing rows are deleted
    /// before the new set is inserted, so a refresh never leaves a mix of
    /// old and new symbols behind.
    pub fn replace_balances(
        &self,
        address: &str,
        balances: &[TokenBalance],
    ) -> Result<(), ServiceError> {
        let mut conn = self.connection.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM token_balances WHERE owner_address = ?1",
            params![address],
        )?;
        for balance in balances {
            tx.execute(
                "INSERT OR REPLACE INTO token_balances
                 (owner_address, symbol, amount, value, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    address,
                    balance.symbol,
                    balance.amount,
                    balance.value,
                    balance.timestamp
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn balances_for(&self, address: &str) -> Result<Vec<TokenBalance>, ServiceError> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT owner_address, symbol, amount, value, timestamp
             FROM token_balances WHERE owner_address = ?1 ORDER BY symbol",
        )?;
        let rows = stmt.query_map(params![address], row_to_balance)?;

        let mut balances = Vec::new();
        for balance in rows {
            balances.push(balance?);
        }
        Ok(balances)
    }

    /// Balances refreshed within the TTL window, using the by-timestamp index.
    pub fn fresh_balances(
        &self,
        address: &str,
        now_millis: i64,
        ttl_secs: i64,
    ) -> Result<Vec<TokenBalance>, ServiceError> {
        let cutoff = now_millis - ttl_secs * 1_000;
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT owner_address, symbol, amount, value, timestamp
             FROM token_balances
             WHERE owner_address = ?1 AND timestamp >= ?2 ORDER BY symbol",
        )?;
        let rows = stmt.query_map(params![address, cutoff], row_to_balance)?;

        let mut balances = Vec::new();
        for balance in rows {
            balances.push(balance?);
        }
        Ok(balances)
    }

    // ---- token directory ----

    /// Wholesale directory refresh: drop everything, insert the new list,
    /// bump the metadata row, all in one transaction.
    pub fn replace_directory(
        &self,
        tokens: &[TokenInfo],
        now_millis: i64,
    ) -> Result<(), ServiceError> {
        let mut conn = self.connection.lock().unwrap();
        let tx = conn.transaction()?;
        let version: i64 = tx
            .query_row(
                "SELECT version FROM store_meta WHERE key = ?1",
                params![DIRECTORY_META_KEY],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        tx.execute("DELETE FROM token_directory", [])?;
        for token in tokens {
            tx.execute(
                "INSERT OR REPLACE INTO token_directory (mint, symbol, name, decimals)
                 VALUES (?1, ?2, ?3, ?4)",
                params![token.mint, token.symbol, token.name, token.decimals],
            )?;
        }
        tx.execute(
            "INSERT INTO store_meta (key, last_updated, version) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 last_updated = excluded.last_updated,
                 version = excluded.version",
            params![DIRECTORY_META_KEY, now_millis, version + 1],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Mint lookup is case-insensitive; providers are inconsistent about
    /// casing in balance-change payloads.
    pub fn token_by_mint(&self, mint: &str) -> Result<Option<TokenInfo>, ServiceError> {
        let conn = self.connection.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT mint, symbol, name, decimals FROM token_directory
                 WHERE mint = ?1 COLLATE NOCASE",
                params![mint],
                |row| {
                    Ok(TokenInfo {
                        mint: row.get(0)?,
                        symbol: row.get(1)?,
                        name: row.get(2)?,
                        decimals: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    pub fn directory_len(&self) -> Result<usize, ServiceError> {
        let conn = self.connection.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM token_directory", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// True when the directory has never been loaded, is empty, or its
    /// metadata row is older than the TTL.
    pub fn directory_needs_refresh(
        &self,
        now_millis: i64,
        ttl_secs: i64,
    ) -> Result<bool, ServiceError> {
        if self.directory_len()? == 0 {
            return Ok(true);
        }
        let conn = self.connection.lock().unwrap();
        let last_updated: Option<i64> = conn
            .query_row(
                "SELECT last_updated FROM store_meta WHERE key = ?1",
                params![DIRECTORY_META_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match last_updated {
            Some(at) => Ok(now_millis - at > ttl_secs * 1_000),
            None => Ok(true),
        }
    }
}

fn row_to_wallet(row: &rusqlite::Row<'_>) -> Result<WalletRecord, rusqlite::Error> {
    let millis: i64 = row.get(2)?;
    Ok(WalletRecord {
        address: row.get(0)?,
        note: row.get(1)?,
        created_at: DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now),
    })
}

fn row_to_balance(row: &rusqlite::Row<'_>) -> Result<TokenBalance, rusqlite::Error> {
    Ok(TokenBalance {
        owner_address: row.get(0)?,
        symbol: row.get(1)?,
        amount: row.get(2)?,
        value: row.get(3)?,
        timestamp: row.get(4)?,
    })
}
