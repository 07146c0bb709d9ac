//! Skeleton REST/WS broker session against a generic retail-broker shape.
//!
//! This is deliberately not wired to any specific vendor's SDK: the wire
//! format here (`/v1/account`, `/v1/orders`, a JSON order-update stream) is
//! representative rather than literal. A concrete deployment swaps in the
//! real endpoint paths and auth scheme without touching [`BrokerSession`]'s
//! contract or any caller above it.

use async_trait::async_trait;
use serde::Deserialize;
use vigil_schemas::{AccountSnapshot, Bar, OrderOutcome, OrderRequest, PositionRecord};

use crate::{BrokerFault, BrokerSession};

pub struct LiveBrokerSession {
    http: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
}

impl LiveBrokerSession {
    pub fn new(base_url: impl Into<String>, login: String, password: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            login,
            password,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("X-Account-Login", &self.login)
            .header("X-Account-Password", &self.password)
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> BrokerFault {
        if status.as_u16() == 429 || status.is_server_error() {
            BrokerFault::Transient(format!("http {status}: {body}"))
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            BrokerFault::Fatal(format!("http {status}: {body}"))
        } else {
            BrokerFault::Rejected(format!("http {status}: {body}"))
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, BrokerFault> {
        let resp = self
            .authed(self.http.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .map_err(|e| BrokerFault::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        resp.json::<T>()
            .await
            .map_err(|e| BrokerFault::Fatal(format!("malformed response from {path}: {e}")))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, BrokerFault> {
        let resp = self
            .authed(self.http.post(format!("{}{}", self.base_url, path)).json(body))
            .send()
            .await
            .map_err(|e| BrokerFault::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, text));
        }
        resp.json::<T>()
            .await
            .map_err(|e| BrokerFault::Fatal(format!("malformed response from {path}: {e}")))
    }
}

#[derive(Deserialize)]
struct AccountResponseDto {
    server_time: chrono::DateTime<chrono::Utc>,
    equity_micros: i64,
    balance_micros: i64,
    margin_used_micros: i64,
    margin_free_micros: i64,
    realized_today_micros: i64,
    trading_enabled: bool,
    open_positions: Vec<PositionRecord>,
}

#[async_trait]
impl BrokerSession for LiveBrokerSession {
    async fn health_probe(&self) -> Result<(), BrokerFault> {
        let resp = self
            .authed(self.http.get(format!("{}/v1/ping", self.base_url)))
            .send()
            .await
            .map_err(|e| BrokerFault::Transient(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_status(resp.status(), String::new()))
        }
    }

    async fn reconnect(&self) -> Result<(), BrokerFault> {
        self.health_probe().await
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Bar>, BrokerFault> {
        self.get_json(&format!(
            "/v1/bars?symbol={symbol}&timeframe_secs={timeframe_secs}&count={count}"
        ))
        .await
    }

    async fn account_snapshot(&self, magic_tag: u64) -> Result<AccountSnapshot, BrokerFault> {
        let dto: AccountResponseDto = self
            .get_json(&format!("/v1/account?magic_tag={magic_tag}"))
            .await?;
        Ok(AccountSnapshot {
            server_time: dto.server_time,
            equity_micros: dto.equity_micros,
            balance_micros: dto.balance_micros,
            margin_used_micros: dto.margin_used_micros,
            margin_free_micros: dto.margin_free_micros,
            realized_today_micros: dto.realized_today_micros,
            trading_enabled: dto.trading_enabled,
            open_positions: dto.open_positions,
        })
    }

    async fn open_positions(&self, magic_tag: u64) -> Result<Vec<PositionRecord>, BrokerFault> {
        self.get_json(&format!("/v1/positions?magic_tag={magic_tag}")).await
    }

    async fn submit_order(&self, req: OrderRequest) -> Result<OrderOutcome, BrokerFault> {
        self.post_json("/v1/orders", &req).await
    }

    async fn close_position(
        &self,
        ticket: u64,
        volume_micros: i64,
    ) -> Result<OrderOutcome, BrokerFault> {
        self.post_json(
            &format!("/v1/positions/{ticket}/close"),
            &serde_json::json!({ "volume_micros": volume_micros }),
        )
        .await
    }

    async fn poll_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault> {
        self.get_json(&format!("/v1/orders/{ticket}")).await
    }

    async fn cancel_order(&self, ticket: u64) -> Result<OrderOutcome, BrokerFault> {
        self.post_json(&format!("/v1/orders/{ticket}/cancel"), &serde_json::json!({}))
            .await
    }
}

/// Opens the broker's order-update WebSocket stream. Used by `vigil-runtime`
/// to receive push notifications between poll cycles; falling back to pure
/// polling if the connection drops is the caller's responsibility.
pub async fn connect_order_stream(
    ws_url: &str,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    BrokerFault,
> {
    let (stream, _resp) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| BrokerFault::Transient(e.to_string()))?;
    Ok(stream)
}
