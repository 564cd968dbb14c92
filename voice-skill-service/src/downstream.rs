//! Time-boxed calls to the shipment-list and conversational-assistant services.
//!
//! Every awaited call goes through [`within_budget`]. On timeout the in-flight
//! request future is dropped together with its timer; there are no retries.

use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DownstreamConfig;
use crate::models::{CredentialBundle, ShipmentSummary};

pub const SHIPMENTS_PATH: &str = "/api/shipments";
pub const ASSISTANT_PATH: &str = "/api/assistant";
pub const LOOKBACK_MONTHS: u32 = 6;
pub const ASSISTANT_CHANNEL: &str = "voice";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamKind {
    Shipments,
    Assistant,
}

impl fmt::Display for DownstreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownstreamKind::Shipments => f.write_str("shipments"),
            DownstreamKind::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("{kind} call exceeded its {budget_ms} ms budget")]
    Timeout { kind: DownstreamKind, budget_ms: u128 },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{kind} service answered with status {status}")]
    Status { kind: DownstreamKind, status: u16 },
    #[error("could not decode {kind} response: {message}")]
    Decode { kind: DownstreamKind, message: String },
}

/// Await `call` for at most `budget`
pub async fn within_budget<F, T>(
    kind: DownstreamKind,
    budget: Duration,
    call: F,
) -> Result<T, DownstreamError>
where
    F: Future<Output = Result<T, DownstreamError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(budget, call).await {
        Ok(result) => {
            debug!(
                downstream = %kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "Downstream call settled"
            );
            result
        }
        Err(_) => {
            warn!(
                downstream = %kind,
                budget_ms = budget.as_millis() as u64,
                "Downstream call abandoned after budget"
            );
            Err(DownstreamError::Timeout {
                kind,
                budget_ms: budget.as_millis(),
            })
        }
    }
}

/// Body of a shipment-list request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentQuery {
    pub login: String,
    pub password: String,
    pub date_from: String,
    pub date_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
}

impl ShipmentQuery {
    /// Query covering the last six months up to `today`
    pub fn lookback(bundle: &CredentialBundle, today: NaiveDate) -> Self {
        let from = today
            .checked_sub_months(Months::new(LOOKBACK_MONTHS))
            .unwrap_or(today);
        Self {
            login: bundle.login.clone(),
            password: bundle.password.clone(),
            date_from: from.format("%Y-%m-%d").to_string(),
            date_to: today.format("%Y-%m-%d").to_string(),
            inn: bundle.inn().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantAuth {
    pub login: String,
    pub password: String,
}

/// Body of a conversational-assistant request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    pub session_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    pub auth: AssistantAuth,
    pub channel: &'static str,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct AssistantReply {
    #[serde(default)]
    reply: Option<String>,
}

#[async_trait]
pub trait ShipmentService: Send + Sync {
    /// Raw shipment records for the query window
    async fn list_shipments(&self, query: &ShipmentQuery) -> Result<Vec<Value>, DownstreamError>;
}

#[async_trait]
pub trait AssistantService: Send + Sync {
    /// The assistant's reply, `None` when it had nothing to say
    async fn reply(&self, request: &AssistantRequest) -> Result<Option<String>, DownstreamError>;
}

/// Accepts either a bare array or `{ "items": [...] }`
pub fn parse_shipment_list(body: Value) -> Result<Vec<Value>, DownstreamError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(DownstreamError::Decode {
                kind: DownstreamKind::Shipments,
                message: "object without an `items` array".to_string(),
            }),
        },
        other => Err(DownstreamError::Decode {
            kind: DownstreamKind::Shipments,
            message: format!("unexpected body type: {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    kind: DownstreamKind,
    url: &str,
    body: &B,
) -> Result<Value, DownstreamError> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownstreamError::Status {
            kind,
            status: status.as_u16(),
        });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| DownstreamError::Decode {
            kind,
            message: e.to_string(),
        })
}

pub struct HttpShipmentService {
    client: reqwest::Client,
    url: String,
}

impl HttpShipmentService {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), SHIPMENTS_PATH),
        }
    }
}

#[async_trait]
impl ShipmentService for HttpShipmentService {
    async fn list_shipments(&self, query: &ShipmentQuery) -> Result<Vec<Value>, DownstreamError> {
        let body = post_json(&self.client, DownstreamKind::Shipments, &self.url, query).await?;
        parse_shipment_list(body)
    }
}

pub struct HttpAssistantService {
    client: reqwest::Client,
    url: String,
}

impl HttpAssistantService {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), ASSISTANT_PATH),
        }
    }
}

#[async_trait]
impl AssistantService for HttpAssistantService {
    async fn reply(&self, request: &AssistantRequest) -> Result<Option<String>, DownstreamError> {
        let body = post_json(&self.client, DownstreamKind::Assistant, &self.url, request).await?;
        let parsed: AssistantReply =
            serde_json::from_value(body).map_err(|e| DownstreamError::Decode {
                kind: DownstreamKind::Assistant,
                message: e.to_string(),
            })?;
        Ok(parsed.reply.filter(|reply| !reply.trim().is_empty()))
    }
}

/// Runs the downstream calls of a turn under their configured budgets
#[derive(Clone)]
pub struct Orchestrator {
    shipments: Arc<dyn ShipmentService>,
    assistant: Arc<dyn AssistantService>,
    config: DownstreamConfig,
}

impl Orchestrator {
    pub fn new(
        shipments: Arc<dyn ShipmentService>,
        assistant: Arc<dyn AssistantService>,
        config: DownstreamConfig,
    ) -> Self {
        Self {
            shipments,
            assistant,
            config,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Shipment summaries for the lookback window
    pub async fn fetch_summaries(
        &self,
        bundle: &CredentialBundle,
    ) -> Result<Vec<ShipmentSummary>, DownstreamError> {
        let query = ShipmentQuery::lookback(bundle, Self::today());
        let records = within_budget(
            DownstreamKind::Shipments,
            self.config.shipments_budget,
            self.shipments.list_shipments(&query),
        )
        .await?;

        let summaries: Vec<ShipmentSummary> = records
            .iter()
            .filter_map(ShipmentSummary::from_record)
            .collect();
        info!(
            records = records.len(),
            summaries = summaries.len(),
            "Fetched shipment list"
        );
        Ok(summaries)
    }

    /// Fire-and-forget shipment-list call that keeps downstream caches warm.
    /// Its outcome never reaches the turn; the spawned task lives no longer
    /// than the shipment budget.
    pub fn refresh_in_background(&self, bundle: &CredentialBundle) -> JoinHandle<()> {
        let query = ShipmentQuery::lookback(bundle, Self::today());
        let shipments = Arc::clone(&self.shipments);
        let budget = self.config.shipments_budget;
        tokio::spawn(async move {
            let refresh = within_budget(
                DownstreamKind::Shipments,
                budget,
                shipments.list_shipments(&query),
            );
            if let Err(e) = refresh.await {
                debug!(error = %e, "Background shipment refresh failed");
            }
        })
    }

    pub fn assistant_request(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        bundle: &CredentialBundle,
    ) -> AssistantRequest {
        AssistantRequest {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            customer: bundle.customer.clone().filter(|c| !c.trim().is_empty()),
            auth: AssistantAuth {
                login: bundle.login.clone(),
                password: bundle.password.clone(),
            },
            channel: ASSISTANT_CHANNEL,
            model: self.config.assistant_model.clone(),
        }
    }

    pub async fn ask_assistant(
        &self,
        request: &AssistantRequest,
    ) -> Result<Option<String>, DownstreamError> {
        within_budget(
            DownstreamKind::Assistant,
            self.config.assistant_budget,
            self.assistant.reply(request),
        )
        .await
    }
}
