// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bank accounts and raw transaction inserts.

use rusqlite::params;
use tally_core::TallyError;

use crate::database::{Database, map_tr_err, now_timestamp};
use crate::models::{Account, LinkedAccount, NewTransaction};

/// Insert or replace an account.
pub async fn upsert_account(db: &Database, account: &Account) -> Result<(), TallyError> {
    let a = account.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO accounts
                    (account_id, name, type, institution, current_balance, available_balance,
                     credit_limit, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
                 ON CONFLICT(account_id) DO UPDATE SET
                    name = excluded.name,
                    type = excluded.type,
                    institution = excluded.institution,
                    current_balance = excluded.current_balance,
                    available_balance = excluded.available_balance,
                    credit_limit = excluded.credit_limit,
                    is_active = 1,
                    updated_at = excluded.updated_at",
                params![
                    a.account_id,
                    a.name,
                    a.account_type,
                    a.institution,
                    a.current_balance,
                    a.available_balance,
                    a.credit_limit,
                    a.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Active accounts ordered by type, then largest balance first.
pub async fn list_active_accounts(db: &Database) -> Result<Vec<Account>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT account_id, name, type, institution, current_balance, available_balance,
                        credit_limit, updated_at
                 FROM accounts
                 WHERE is_active = 1
                 ORDER BY type, current_balance DESC, account_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Account {
                    account_id: row.get(0)?,
                    name: row.get(1)?,
                    account_type: row.get(2)?,
                    institution: row.get(3)?,
                    current_balance: row.get(4)?,
                    available_balance: row.get(5)?,
                    credit_limit: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Record that `account_id` is linked through aggregator item `item_id`.
pub async fn link_account(
    db: &Database,
    account_id: &str,
    item_id: &str,
    mask: Option<&str>,
) -> Result<(), TallyError> {
    let account_id = account_id.to_string();
    let item_id = item_id.to_string();
    let mask = mask.map(str::to_string);
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO linked_accounts (account_id, item_id, mask, linked_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(account_id) DO UPDATE SET
                    item_id = excluded.item_id,
                    mask = excluded.mask",
                params![account_id, item_id, mask, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Active accounts that came from the aggregator, by institution then name.
pub async fn list_linked_accounts(db: &Database) -> Result<Vec<LinkedAccount>, TallyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.account_id, a.name, a.type, a.institution, a.current_balance, la.mask
                 FROM accounts a
                 JOIN linked_accounts la ON a.account_id = la.account_id
                 WHERE a.is_active = 1
                 ORDER BY a.institution, a.name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(LinkedAccount {
                    account_id: row.get(0)?,
                    name: row.get(1)?,
                    account_type: row.get(2)?,
                    institution: row.get(3)?,
                    current_balance: row.get(4)?,
                    mask: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert transactions in one transaction; existing ids are left untouched.
///
/// Returns how many rows were actually inserted.
pub async fn insert_transactions(
    db: &Database,
    transactions: &[NewTransaction],
) -> Result<usize, TallyError> {
    let transactions = transactions.to_vec();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO transactions
                        (transaction_id, account_id, date, amount, description, merchant_name,
                         category_normalized, source, is_duplicate, is_transfer, transfer_pair_id,
                         created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )?;
                for t in &transactions {
                    inserted += stmt.execute(params![
                        t.transaction_id,
                        t.account_id,
                        t.date,
                        t.amount,
                        t.description,
                        t.merchant_name,
                        t.category,
                        t.source,
                        t.is_duplicate,
                        t.is_transfer,
                        t.transfer_pair_id,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}
