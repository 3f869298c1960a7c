//! Account and trading actions
//!
//! Thin pass-through calls; their results are not reconciled with the
//! consensus view.

use crate::client::ApiClient;
use crate::error::ApiError;
use pbft_trade_types::{Block, BlockWire};
use serde::{Deserialize, Serialize};

// ============ Request/Response Types ============

#[derive(Debug, Serialize)]
pub struct CredentialsRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepositRequest {
    pub amount: u64,
}

/// Side of an order submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Serialize)]
pub struct TradeRequest {
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub amount: u64,
}

/// Acknowledgement body; the server only sends a message
#[derive(Debug, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub msg: Option<String>,
}

// ============ Actions ============

impl ApiClient {
    /// Log in and store the returned token in the session
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = CredentialsRequest { username, password };
        let response: LoginResponse = self.post_json("login", &request, false).await?;

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingField("token"))?;
        self.session().set_identity(token, username);
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Ack, ApiError> {
        let request = CredentialsRequest { username, password };
        self.post_json("register", &request, false).await
    }

    /// Drop the local identity; the server keeps no session state
    pub fn logout(&self) {
        self.session().clear_identity();
    }

    pub async fn deposit(&self, amount: u64) -> Result<Ack, ApiError> {
        self.post_json("account/deposit", &DepositRequest { amount }, true)
            .await
    }

    pub async fn trade(&self, side: OrderSide, amount: u64) -> Result<Ack, ApiError> {
        self.post_json("trade", &TradeRequest { side, amount }, true)
            .await
    }

    /// Look up a block by height or transaction id
    pub async fn block_by_id(&self, id: &str) -> Result<Option<Block>, ApiError> {
        let wire: BlockWire = self.get_json("pbft/block", &[("id", id)]).await?;
        Ok(wire.into_block())
    }
}
