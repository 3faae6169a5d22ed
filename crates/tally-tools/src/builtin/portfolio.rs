// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Investment portfolio, crypto tokens, DeFi positions, and bitcoin wallets.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::TallyError;
use tally_storage::Database;
use tally_storage::queries::portfolio;

use crate::tool::{Tool, parse_args, round2};

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn empty_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

pub struct GetPortfolioSummary {
    db: Database,
}

impl GetPortfolioSummary {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetPortfolioSummary {
    fn name(&self) -> &str {
        "get_portfolio_summary"
    }

    fn description(&self) -> &str {
        "Get overall investment portfolio summary including total value, value by account type, and gains."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let groups = portfolio::holdings_by_account_type(&self.db).await?;

        let mut total_value = 0.0;
        let mut total_cost = 0.0;
        let accounts: Vec<Value> = groups
            .iter()
            .map(|g| {
                total_value += g.value;
                let cost = g.cost_basis.filter(|c| *c != 0.0);
                total_cost += cost.unwrap_or(0.0);
                json!({
                    "account_type": g.account_type,
                    "institution": g.institution,
                    "value": round2(g.value),
                    "cost_basis": cost.map(round2),
                    "gain": cost.map(|c| round2(g.value - c)),
                })
            })
            .collect();

        let has_cost = total_cost != 0.0;
        Ok(json!({
            "total_value": round2(total_value),
            "total_cost_basis": has_cost.then(|| round2(total_cost)),
            "total_gain": has_cost.then(|| round2(total_value - total_cost)),
            "accounts": accounts,
        }))
    }
}

/// Individual positions, optionally for one account.
pub struct GetHoldingsByAccount {
    db: Database,
}

impl GetHoldingsByAccount {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct HoldingsArgs {
    account_name: Option<String>,
}

#[async_trait]
impl Tool for GetHoldingsByAccount {
    fn name(&self) -> &str {
        "get_holdings_by_account"
    }

    fn description(&self) -> &str {
        "Get individual holdings with current values, cost basis, and gains. Optionally filter by account name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "account_name": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Part of an account name, e.g. 'IRA' or '401k'"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: HoldingsArgs = parse_args(self.name(), arguments)?;
        let rows = portfolio::holdings(&self.db, args.account_name.as_deref()).await?;
        let holdings: Vec<Value> = rows
            .iter()
            .map(|h| {
                let cost = h.cost_basis.filter(|c| *c != 0.0);
                json!({
                    "account": h.account,
                    "symbol": h.symbol,
                    "name": h.name,
                    "quantity": h.quantity,
                    "price": h.price,
                    "value": round2(h.current_value),
                    "cost_basis": cost.map(round2),
                    "gain": cost.map(|c| round2(h.current_value - c)),
                    "asset_type": h.asset_type,
                })
            })
            .collect();
        Ok(json!({
            "holdings": holdings,
            "count": holdings.len(),
            "filter": args.account_name,
        }))
    }
}

pub struct GetAssetAllocation {
    db: Database,
}

impl GetAssetAllocation {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetAssetAllocation {
    fn name(&self) -> &str {
        "get_asset_allocation"
    }

    fn description(&self) -> &str {
        "Get investment value and percentage by asset type (stocks, bonds, ETFs, cash, ...)."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let rows = portfolio::asset_allocation(&self.db).await?;
        let total: f64 = rows.iter().map(|(_, value)| value).sum();
        let allocation: Vec<Value> = rows
            .iter()
            .map(|(asset_type, value)| {
                let pct = if total > 0.0 { value / total * 100.0 } else { 0.0 };
                json!({
                    "asset_type": asset_type,
                    "value": round2(*value),
                    "percentage": round1(pct),
                })
            })
            .collect();
        Ok(json!({
            "total_value": round2(total),
            "allocation": allocation,
        }))
    }
}

pub struct GetTopHoldings {
    db: Database,
}

impl GetTopHoldings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct TopArgs {
    #[serde(default = "default_top_limit")]
    limit: u32,
}

fn default_top_limit() -> u32 {
    10
}

#[async_trait]
impl Tool for GetTopHoldings {
    fn name(&self) -> &str {
        "get_top_holdings"
    }

    fn description(&self) -> &str {
        "Get the largest holdings by value, combining the same symbol across accounts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "default": 10,
                    "description": "Number of holdings to return"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: TopArgs = parse_args(self.name(), arguments)?;
        let rows = portfolio::top_holdings(&self.db, args.limit).await?;
        let top: Vec<Value> = rows
            .iter()
            .map(|h| {
                json!({
                    "symbol": h.symbol,
                    "name": h.name,
                    "total_value": round2(h.total_value),
                    "total_quantity": h.total_quantity,
                    "price": h.price,
                })
            })
            .collect();
        Ok(json!({ "top_holdings": top }))
    }
}

/// Totals per investment account type (401k, IRA, brokerage, ...).
pub struct GetAccountSummary {
    db: Database,
}

impl GetAccountSummary {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetAccountSummary {
    fn name(&self) -> &str {
        "get_account_summary"
    }

    fn description(&self) -> &str {
        "Get the number of investment accounts and their total value per account type (401k, IRA, brokerage, ...)."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let rows = portfolio::account_type_totals(&self.db).await?;
        let total: f64 = rows.iter().map(|r| r.total_value).sum();
        let by_type: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "account_type": r.account_type,
                    "account_count": r.account_count,
                    "total_value": round2(r.total_value),
                })
            })
            .collect();
        Ok(json!({
            "total_portfolio": round2(total),
            "by_account_type": by_type,
        }))
    }
}

pub struct GetCryptoHoldings {
    db: Database,
}

impl GetCryptoHoldings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct CryptoArgs {
    #[serde(default = "default_min_value")]
    min_value_usd: f64,
}

fn default_min_value() -> f64 {
    1.0
}

#[async_trait]
impl Tool for GetCryptoHoldings {
    fn name(&self) -> &str {
        "get_crypto_holdings"
    }

    fn description(&self) -> &str {
        "Get cryptocurrency token balances across tracked wallets, largest first, with total USD value."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "min_value_usd": {
                    "type": "number",
                    "minimum": 0,
                    "default": 1,
                    "description": "Hide balances worth less than this many dollars"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: CryptoArgs = parse_args(self.name(), arguments)?;
        let balances = portfolio::crypto_balances(&self.db, args.min_value_usd).await?;
        let total: f64 = balances.iter().map(|b| b.value_usd).sum();
        let tokens: Vec<Value> = balances
            .iter()
            .map(|b| {
                json!({
                    "wallet": b.wallet.as_deref().unwrap_or(&b.wallet_id),
                    "chain": b.chain,
                    "symbol": b.symbol,
                    "name": b.name,
                    "balance": b.balance,
                    "value_usd": round2(b.value_usd),
                    "last_updated": b.last_updated,
                })
            })
            .collect();

        Ok(json!({
            "tokens": tokens,
            "count": tokens.len(),
            "total_value": round2(total),
        }))
    }
}

/// Lending, liquidity, and staking positions with their token breakdown.
pub struct GetDefiPositions {
    db: Database,
}

impl GetDefiPositions {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct DefiArgs {
    protocol: Option<String>,
}

#[async_trait]
impl Tool for GetDefiPositions {
    fn name(&self) -> &str {
        "get_defi_positions"
    }

    fn description(&self) -> &str {
        "Get DeFi positions (supplied, borrowed, claimable rewards) per wallet. Optionally filter by protocol."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "protocol": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Filter by protocol name (e.g., 'Aave', 'Uniswap')"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: DefiArgs = parse_args(self.name(), arguments)?;
        let rows = portfolio::defi_positions(&self.db, args.protocol.as_deref()).await?;
        let total: f64 = rows.iter().map(|p| p.balance_usd).sum();
        let positions: Vec<Value> = rows
            .iter()
            .map(|p| {
                let details: Vec<Value> = p
                    .details
                    .iter()
                    .map(|d| {
                        json!({
                            "type": d.detail_type,
                            "symbol": d.symbol,
                            "name": d.name,
                            "balance": d.balance,
                            "value_usd": round2(d.value_usd),
                        })
                    })
                    .collect();
                json!({
                    "position_id": p.position_id,
                    "wallet": p.wallet.as_deref().unwrap_or(&p.wallet_id),
                    "protocol": p.protocol,
                    "chain": p.chain,
                    "position_type": p.position_type,
                    "balance_usd": round2(p.balance_usd),
                    "details": details,
                })
            })
            .collect();
        Ok(json!({
            "positions": positions,
            "total_value": round2(total),
            "filter": args.protocol,
        }))
    }
}

pub struct GetBitcoinHoldings {
    db: Database,
}

impl GetBitcoinHoldings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetBitcoinHoldings {
    fn name(&self) -> &str {
        "get_bitcoin_holdings"
    }

    fn description(&self) -> &str {
        "Get Bitcoin wallet balances and the total in BTC and USD."
    }

    fn parameters_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let rows = portfolio::bitcoin_wallets(&self.db).await?;
        let total_btc: f64 = rows.iter().map(|w| w.balance_btc).sum();
        let total_usd: f64 = rows.iter().map(|w| w.balance_usd).sum();
        let wallets: Vec<Value> = rows
            .iter()
            .map(|w| {
                json!({
                    "label": w.label.as_deref().unwrap_or(&w.wallet_id),
                    "balance_btc": w.balance_btc,
                    "value_usd": round2(w.balance_usd),
                    "last_updated": w.last_updated,
                })
            })
            .collect();
        Ok(json!({
            "wallets": wallets,
            "total_btc": (total_btc * 1e8).round() / 1e8,
            "total_usd": round2(total_usd),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_storage::{
        BitcoinWallet, CryptoBalance, CryptoWallet, DefiDetail, DefiPosition, InvestmentAccount,
        NewHolding,
    };

    fn holding(account: &str, symbol: &str, value: f64, cost: Option<f64>) -> NewHolding {
        NewHolding {
            account_id: account.into(),
            symbol: symbol.into(),
            name: None,
            quantity: 1.0,
            price: Some(value),
            current_value: value,
            cost_basis: cost,
            asset_type: Some("equity".into()),
        }
    }

    #[tokio::test]
    async fn portfolio_totals_and_gains() {
        let db = Database::open_in_memory().await.unwrap();
        for (id, kind) in [("ira", "ira"), ("brk", "brokerage")] {
            portfolio::upsert_investment_account(
                &db,
                &InvestmentAccount {
                    account_id: id.into(),
                    account_name: id.to_uppercase(),
                    account_type: kind.into(),
                    institution: Some("Broker".into()),
                },
            )
            .await
            .unwrap();
        }
        portfolio::insert_holding(&db, &holding("ira", "VTI", 10_000.0, Some(8_000.0))).await.unwrap();
        portfolio::insert_holding(&db, &holding("brk", "AAPL", 2_500.0, Some(3_000.0))).await.unwrap();

        let out = GetPortfolioSummary::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["total_value"], 12_500.0);
        assert_eq!(out["total_cost_basis"], 11_000.0);
        assert_eq!(out["total_gain"], 1_500.0);
        assert_eq!(out["accounts"][0]["account_type"], "ira");
        assert_eq!(out["accounts"][1]["gain"], -500.0);
    }

    #[tokio::test]
    async fn empty_portfolio_has_no_gain() {
        let db = Database::open_in_memory().await.unwrap();
        let out = GetPortfolioSummary::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["total_value"], 0.0);
        assert_eq!(out["total_gain"], Value::Null);
    }

    #[tokio::test]
    async fn crypto_filters_dust() {
        let db = Database::open_in_memory().await.unwrap();
        portfolio::upsert_crypto_wallet(
            &db,
            &CryptoWallet {
                wallet_id: "w1".into(),
                address: "0xabc".into(),
                label: Some("Main".into()),
                chain: Some("ethereum".into()),
            },
        )
        .await
        .unwrap();
        let balance = |symbol: &str, usd: f64| CryptoBalance {
            wallet_id: "w1".into(),
            wallet: None,
            chain: "ethereum".into(),
            symbol: symbol.into(),
            name: None,
            balance: 1.0,
            value_usd: usd,
            last_updated: None,
        };
        portfolio::replace_crypto_balances(&db, "w1", &[balance("ETH", 3200.0), balance("DUST", 0.2)])
            .await
            .unwrap();

        let out = GetCryptoHoldings::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["tokens"][0]["wallet"], "Main");
        assert_eq!(out["total_value"], 3200.0);
    }

    async fn two_accounts() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        for (id, name, kind) in [("ira", "Rollover IRA", "ira"), ("k401", "Acme 401k", "401k")] {
            portfolio::upsert_investment_account(
                &db,
                &InvestmentAccount {
                    account_id: id.into(),
                    account_name: name.into(),
                    account_type: kind.into(),
                    institution: None,
                },
            )
            .await
            .unwrap();
        }
        let mut bond = holding("k401", "BND", 1_000.0, None);
        bond.asset_type = Some("bond".into());
        for h in [
            holding("ira", "VTI", 3_000.0, Some(2_000.0)),
            holding("k401", "VTI", 1_000.0, Some(1_200.0)),
            bond,
        ] {
            portfolio::insert_holding(&db, &h).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn holdings_show_gain_per_position() {
        let tool = GetHoldingsByAccount::new(two_accounts().await);
        let out = tool.invoke(json!({"account_name": "401k"})).await.unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["filter"], "401k");
        let vti = out["holdings"]
            .as_array()
            .unwrap()
            .iter()
            .find(|h| h["symbol"] == "VTI")
            .unwrap();
        assert_eq!(vti["gain"], -200.0);

        let all = tool.invoke(json!({})).await.unwrap();
        assert_eq!(all["count"], 3);
        assert_eq!(all["holdings"][0]["account"], "Rollover IRA");
    }

    #[tokio::test]
    async fn allocation_percentages() {
        let out = GetAssetAllocation::new(two_accounts().await)
            .invoke(json!({}))
            .await
            .unwrap();
        assert_eq!(out["total_value"], 5_000.0);
        assert_eq!(out["allocation"][0]["asset_type"], "equity");
        assert_eq!(out["allocation"][0]["percentage"], 80.0);
        assert_eq!(out["allocation"][1]["percentage"], 20.0);
    }

    #[tokio::test]
    async fn top_holdings_merge_symbols_across_accounts() {
        let out = GetTopHoldings::new(two_accounts().await)
            .invoke(json!({"limit": 1}))
            .await
            .unwrap();
        let top = out["top_holdings"].as_array().unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0]["symbol"], "VTI");
        assert_eq!(top[0]["total_value"], 4_000.0);
    }

    #[tokio::test]
    async fn account_summary_totals() {
        let out = GetAccountSummary::new(two_accounts().await)
            .invoke(json!({}))
            .await
            .unwrap();
        assert_eq!(out["total_portfolio"], 5_000.0);
        assert_eq!(out["by_account_type"][0]["account_type"], "ira");
        assert_eq!(out["by_account_type"][1]["account_count"], 1);
    }

    #[tokio::test]
    async fn defi_positions_filter_by_protocol() {
        let db = Database::open_in_memory().await.unwrap();
        portfolio::upsert_crypto_wallet(
            &db,
            &CryptoWallet {
                wallet_id: "w1".into(),
                address: "0xabc".into(),
                label: Some("Main".into()),
                chain: Some("ethereum".into()),
            },
        )
        .await
        .unwrap();
        for (id, protocol, usd) in [("p1", "Aave V3", 800.0), ("p2", "Uniswap V3", 300.0)] {
            portfolio::replace_defi_position(
                &db,
                &DefiPosition {
                    position_id: id.into(),
                    wallet_id: "w1".into(),
                    wallet: None,
                    protocol: protocol.into(),
                    chain: "ethereum".into(),
                    position_type: None,
                    balance_usd: usd,
                    last_updated: None,
                    details: vec![DefiDetail {
                        detail_type: "supplied".into(),
                        symbol: "USDC".into(),
                        name: None,
                        balance: usd,
                        value_usd: usd,
                    }],
                },
            )
            .await
            .unwrap();
        }
        let tool = GetDefiPositions::new(db);
        let all = tool.invoke(json!({})).await.unwrap();
        assert_eq!(all["total_value"], 1_100.0);
        let aave = tool.invoke(json!({"protocol": "aave"})).await.unwrap();
        assert_eq!(aave["positions"].as_array().unwrap().len(), 1);
        assert_eq!(aave["positions"][0]["wallet"], "Main");
        assert_eq!(aave["positions"][0]["details"][0]["type"], "supplied");
    }

    #[tokio::test]
    async fn bitcoin_totals() {
        let db = Database::open_in_memory().await.unwrap();
        for (id, btc) in [("cold", 0.5), ("hot", 0.01)] {
            portfolio::upsert_bitcoin_wallet(
                &db,
                &BitcoinWallet {
                    wallet_id: id.into(),
                    label: None,
                    address: format!("bc1{id}"),
                    balance_btc: btc,
                    balance_usd: btc * 60_000.0,
                    last_updated: None,
                },
            )
            .await
            .unwrap();
        }
        let out = GetBitcoinHoldings::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["total_btc"], 0.51);
        assert_eq!(out["total_usd"], 30_600.0);
        assert_eq!(out["wallets"][0]["label"], "cold");
    }
}
