//! Trade history records and account balance payloads

use crate::timefmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    #[serde(alias = "Buy", alias = "买入")]
    Buy,
    #[serde(alias = "Sell", alias = "卖出")]
    Sell,
    /// Account top-up, recorded in the same history as trades
    #[serde(alias = "Deposit", alias = "充值")]
    Deposit,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "buy",
            TradeType::Sell => "sell",
            TradeType::Deposit => "deposit",
        }
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[serde(alias = "Success", alias = "成功")]
    Success,
    #[serde(alias = "Failed", alias = "失败")]
    Failed,
    #[serde(alias = "Pending", alias = "处理中")]
    Pending,
}

/// One row of trade history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub amount: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(deserialize_with = "timefmt::deserialize")]
    pub time: DateTime<Utc>,
    pub status: TradeStatus,
}

/// `GET /trade/history` body
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    /// `null` when the account has no records
    #[serde(default)]
    pub records: Option<Vec<TradeRecord>>,
}

impl HistoryResponse {
    pub fn into_records(self) -> Vec<TradeRecord> {
        self.records.unwrap_or_default()
    }
}

/// `GET /account/balance` body
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BalanceResponse {
    pub balance: f64,
}
