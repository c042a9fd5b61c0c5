//! Invoice gateway backed by the Crypto Pay HTTP API.
//!
//! Every call is a single request. Transport failures, non-success HTTP
//! statuses, `ok: false` envelopes and unparsable bodies all surface as
//! [`GatewayError`]; only a well-formed invoice yields an [`InvoiceStatus`].

use crate::config::CryptoPayConfig;
use crate::domain::invoice::{Invoice, InvoiceId, InvoiceRequest, InvoiceStatus};
use crate::domain::ports::InvoiceGateway;
use crate::error::{GatewayError, Result as ShopResult, ShopError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const TOKEN_HEADER: &str = "crypto-pay-api-token";
const SETTLEMENT_ASSET: &str = "USDT";
const DESCRIPTION_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct CryptoPayClient {
    http: reqwest::Client,
    base_url: String,
    paid_button_url: Option<String>,
}

#[derive(Serialize)]
struct CreateInvoiceBody<'a> {
    asset: &'a str,
    amount: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    paid_btn_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paid_btn_url: Option<&'a str>,
    payload: String,
    allow_anonymous: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    name: String,
}

#[derive(Deserialize)]
struct InvoiceBody {
    invoice_id: u64,
    bot_invoice_url: Option<String>,
    /// Older responses only carry this one.
    pay_url: Option<String>,
}

#[derive(Deserialize)]
struct InvoiceList {
    items: Vec<InvoiceItem>,
}

#[derive(Deserialize)]
struct InvoiceItem {
    status: String,
}

impl CryptoPayClient {
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        paid_button_url: Option<String>,
    ) -> ShopResult<Self> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(token)
            .map_err(|_| ShopError::ConfigError("crypto pay token is not a valid header".into()))?;
        headers.insert(TOKEN_HEADER, token);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ShopError::ConfigError(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            paid_button_url,
        })
    }

    /// Builds a client when a token is configured; `None` disables the crypto rail.
    pub fn from_config(config: &CryptoPayConfig) -> ShopResult<Option<Self>> {
        let Some(token) = config.crypto_pay_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        Self::new(
            &config.crypto_pay_url,
            token,
            Duration::from_secs(config.crypto_pay_timeout_secs),
            config.crypto_pay_paid_url.clone(),
        )
        .map(Some)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(method, %status, "Crypto pay response");

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(GatewayError::Api {
                    name: format!("HTTP {}", status.as_u16()),
                });
            }
            Err(e) => return Err(GatewayError::Malformed(format!("{method}: {e}"))),
        };

        if !envelope.ok || !status.is_success() {
            let name = envelope
                .error
                .map(|e| e.name)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(GatewayError::Api { name });
        }
        envelope
            .result
            .ok_or_else(|| GatewayError::Malformed(format!("{method}: missing result")))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[async_trait]
impl InvoiceGateway for CryptoPayClient {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError> {
        let body = CreateInvoiceBody {
            asset: SETTLEMENT_ASSET,
            amount: format!("{:.2}", request.amount),
            description: truncate(&request.description, DESCRIPTION_LIMIT),
            paid_btn_name: self.paid_button_url.as_ref().map(|_| "openBot"),
            paid_btn_url: self.paid_button_url.as_deref(),
            payload: format!("order_{}", request.order_id),
            allow_anonymous: false,
        };
        let invoice: InvoiceBody = self
            .call(
                "createInvoice",
                self.http
                    .post(format!("{}/createInvoice", self.base_url))
                    .json(&body),
            )
            .await?;

        let pay_url = invoice
            .bot_invoice_url
            .or(invoice.pay_url)
            .ok_or_else(|| GatewayError::Malformed("createInvoice: missing pay url".into()))?;
        Ok(Invoice {
            id: InvoiceId(invoice.invoice_id.to_string()),
            pay_url,
        })
    }

    async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatus, GatewayError> {
        let list: InvoiceList = self
            .call(
                "getInvoices",
                self.http
                    .get(format!("{}/getInvoices", self.base_url))
                    .query(&[("invoice_ids", id.0.as_str())]),
            )
            .await?;

        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Malformed(format!("invoice {id} not returned")))?;
        match item.status.as_str() {
            "active" => Ok(InvoiceStatus::Active),
            "paid" => Ok(InvoiceStatus::Paid),
            "expired" => Ok(InvoiceStatus::Expired),
            other => Err(GatewayError::Malformed(format!(
                "unknown invoice status {other:?}"
            ))),
        }
    }
}
