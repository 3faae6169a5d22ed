// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Investment holdings and crypto balances.

use rusqlite::params;
use tally_core::TallyError;

use crate::database::{Database, map_tr_err};
use crate::models::{
    AccountTypeTotal, BitcoinWallet, CryptoBalance, CryptoWallet, DefiDetail, DefiPosition,
    HoldingGroup, HoldingRow, InvestmentAccount, NewHolding, TopHolding,
};

pub async fn upsert_investment_account(
    db: &Database,
    account: &InvestmentAccount,
) -> Result<(), TallyError> {
    let a = account.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO investment_accounts (account_id, account_name, account_type, institution, is_active)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT(account_id) DO UPDATE SET
                    account_name = excluded.account_name,
                    account_type = excluded.account_type,
                    institution = excluded.institution,
                    is_active = 1",
                params![a.account_id, a.account_name, a.account_type, a.institution],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_holding(db: &Database, holding: &NewHolding) -> Result<(), TallyError> {
    let h = holding.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO holdings
                    (account_id, symbol, name, quantity, price, current_value, cost_basis, asset_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    h.account_id,
                    h.symbol,
                    h.name,
                    h.quantity,
                    h.price,
                    h.current_value,
                    h.cost_basis,
                    h.asset_type,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Active holdings summed per (account type, institution), largest first.
pub async fn holdings_by_account_type(db: &Database) -> Result<Vec<HoldingGroup>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ia.account_type, ia.institution, SUM(h.current_value) AS total_value,
                        SUM(h.cost_basis)
                 FROM holdings h
                 JOIN investment_accounts ia ON h.account_id = ia.account_id
                 WHERE h.is_active = 1 AND ia.is_active = 1
                 GROUP BY ia.account_type, ia.institution
                 ORDER BY total_value DESC, ia.account_type",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(HoldingGroup {
                    account_type: row.get(0)?,
                    institution: row.get(1)?,
                    value: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    cost_basis: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Active holdings, largest first. `account_name` matches as a substring.
pub async fn holdings(db: &Database, account_name: Option<&str>) -> Result<Vec<HoldingRow>, TallyError> {
    let pattern = account_name.map(|name| format!("%{name}%"));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ia.account_name, h.symbol, h.name, h.quantity, h.price, h.current_value,
                        h.cost_basis, h.asset_type
                 FROM holdings h
                 JOIN investment_accounts ia ON h.account_id = ia.account_id
                 WHERE h.is_active = 1 AND ia.is_active = 1
                   AND (?1 IS NULL OR ia.account_name LIKE ?1)
                 ORDER BY h.current_value DESC, h.symbol",
            )?;
            let rows = stmt.query_map(params![pattern], |row| {
                Ok(HoldingRow {
                    account: row.get(0)?,
                    symbol: row.get(1)?,
                    name: row.get(2)?,
                    quantity: row.get(3)?,
                    price: row.get(4)?,
                    current_value: row.get(5)?,
                    cost_basis: row.get(6)?,
                    asset_type: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Value per asset type, largest first. Untyped holdings are `Unknown`.
pub async fn asset_allocation(db: &Database) -> Result<Vec<(String, f64)>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(h.asset_type, 'Unknown') AS kind, SUM(h.current_value) AS total
                 FROM holdings h
                 JOIN investment_accounts ia ON h.account_id = ia.account_id
                 WHERE h.is_active = 1 AND ia.is_active = 1
                 GROUP BY kind
                 ORDER BY total DESC, kind",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, Option<f64>>(1)?.unwrap_or(0.0)))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// The `limit` largest positions, each symbol summed across accounts.
pub async fn top_holdings(db: &Database, limit: u32) -> Result<Vec<TopHolding>, TallyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT h.symbol, MAX(h.name), SUM(h.current_value) AS total, SUM(h.quantity),
                        MAX(h.price)
                 FROM holdings h
                 JOIN investment_accounts ia ON h.account_id = ia.account_id
                 WHERE h.is_active = 1 AND ia.is_active = 1
                 GROUP BY h.symbol
                 ORDER BY total DESC, h.symbol
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(TopHolding {
                    symbol: row.get(0)?,
                    name: row.get(1)?,
                    total_value: row.get(2)?,
                    total_quantity: row.get(3)?,
                    price: row.get(4)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Account count and value per investment account type. Accounts with no
/// holdings still count, with zero value.
pub async fn account_type_totals(db: &Database) -> Result<Vec<AccountTypeTotal>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ia.account_type, COUNT(DISTINCT ia.account_id),
                        COALESCE(SUM(h.current_value), 0) AS total
                 FROM investment_accounts ia
                 LEFT JOIN holdings h ON ia.account_id = h.account_id AND h.is_active = 1
                 WHERE ia.is_active = 1
                 GROUP BY ia.account_type
                 ORDER BY total DESC, ia.account_type",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(AccountTypeTotal {
                    account_type: row.get(0)?,
                    account_count: row.get(1)?,
                    total_value: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_crypto_wallet(db: &Database, wallet: &CryptoWallet) -> Result<(), TallyError> {
    let w = wallet.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO crypto_wallets (wallet_id, address, label, chain)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(wallet_id) DO UPDATE SET
                    address = excluded.address,
                    label = excluded.label,
                    chain = excluded.chain",
                params![w.wallet_id, w.address, w.label, w.chain],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace every balance recorded for `wallet_id` in one transaction.
pub async fn replace_crypto_balances(
    db: &Database,
    wallet_id: &str,
    balances: &[CryptoBalance],
) -> Result<(), TallyError> {
    let wallet_id = wallet_id.to_string();
    let balances = balances.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM crypto_balances WHERE wallet_id = ?1", params![wallet_id])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO crypto_balances
                        (wallet_id, chain, token_symbol, token_name, balance, balance_usd, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for b in &balances {
                    stmt.execute(params![
                        wallet_id,
                        b.chain,
                        b.symbol,
                        b.name,
                        b.balance,
                        b.value_usd,
                        b.last_updated,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Token balances worth at least `min_usd`, largest first.
pub async fn crypto_balances(db: &Database, min_usd: f64) -> Result<Vec<CryptoBalance>, TallyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT cb.wallet_id, cw.label, cb.chain, cb.token_symbol, cb.token_name,
                        cb.balance, cb.balance_usd, cb.last_updated
                 FROM crypto_balances cb
                 JOIN crypto_wallets cw ON cb.wallet_id = cw.wallet_id
                 WHERE cb.balance_usd >= ?1
                 ORDER BY cb.balance_usd DESC, cb.token_symbol",
            )?;
            let rows = stmt.query_map(params![min_usd], |row| {
                Ok(CryptoBalance {
                    wallet_id: row.get(0)?,
                    wallet: row.get(1)?,
                    chain: row.get(2)?,
                    symbol: row.get(3)?,
                    name: row.get(4)?,
                    balance: row.get(5)?,
                    value_usd: row.get(6)?,
                    last_updated: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a DeFi position together with its details.
pub async fn replace_defi_position(db: &Database, position: &DefiPosition) -> Result<(), TallyError> {
    let p = position.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM defi_position_details WHERE position_id = ?1",
                params![p.position_id],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO defi_positions
                    (position_id, wallet_id, protocol, chain, position_type, balance_usd, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    p.position_id,
                    p.wallet_id,
                    p.protocol,
                    p.chain,
                    p.position_type,
                    p.balance_usd,
                    p.last_updated,
                ],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO defi_position_details
                        (position_id, detail_type, token_symbol, token_name, balance, balance_usd)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for d in &p.details {
                    stmt.execute(params![
                        p.position_id,
                        d.detail_type,
                        d.symbol,
                        d.name,
                        d.balance,
                        d.value_usd,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// DeFi positions, largest first, each with its details largest first.
/// `protocol` matches as a substring.
pub async fn defi_positions(db: &Database, protocol: Option<&str>) -> Result<Vec<DefiPosition>, TallyError> {
    let pattern = protocol.map(|p| format!("%{p}%"));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT dp.position_id, dp.wallet_id, cw.label, dp.protocol, dp.chain,
                        dp.position_type, dp.balance_usd, dp.last_updated
                 FROM defi_positions dp
                 JOIN crypto_wallets cw ON dp.wallet_id = cw.wallet_id
                 WHERE ?1 IS NULL OR dp.protocol LIKE ?1
                 ORDER BY dp.balance_usd DESC, dp.position_id",
            )?;
            let mut positions = stmt
                .query_map(params![pattern], |row| {
                    Ok(DefiPosition {
                        position_id: row.get(0)?,
                        wallet_id: row.get(1)?,
                        wallet: row.get(2)?,
                        protocol: row.get(3)?,
                        chain: row.get(4)?,
                        position_type: row.get(5)?,
                        balance_usd: row.get(6)?,
                        last_updated: row.get(7)?,
                        details: Vec::new(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT detail_type, token_symbol, token_name, balance, balance_usd
                 FROM defi_position_details
                 WHERE position_id = ?1
                 ORDER BY balance_usd DESC, id",
            )?;
            for position in &mut positions {
                position.details = stmt
                    .query_map(params![position.position_id], |row| {
                        Ok(DefiDetail {
                            detail_type: row.get(0)?,
                            symbol: row.get(1)?,
                            name: row.get(2)?,
                            balance: row.get(3)?,
                            value_usd: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Ok(positions)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_bitcoin_wallet(db: &Database, wallet: &BitcoinWallet) -> Result<(), TallyError> {
    let w = wallet.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bitcoin_wallets
                    (wallet_id, label, address, balance_btc, balance_usd, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(wallet_id) DO UPDATE SET
                    label = excluded.label,
                    address = excluded.address,
                    balance_btc = excluded.balance_btc,
                    balance_usd = excluded.balance_usd,
                    last_updated = excluded.last_updated",
                params![w.wallet_id, w.label, w.address, w.balance_btc, w.balance_usd, w.last_updated],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Bitcoin wallets, largest USD value first.
pub async fn bitcoin_wallets(db: &Database) -> Result<Vec<BitcoinWallet>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT wallet_id, label, address, balance_btc, balance_usd, last_updated
                 FROM bitcoin_wallets
                 ORDER BY balance_usd DESC, wallet_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(BitcoinWallet {
                    wallet_id: row.get(0)?,
                    label: row.get(1)?,
                    address: row.get(2)?,
                    balance_btc: row.get(3)?,
                    balance_usd: row.get(4)?,
                    last_updated: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
