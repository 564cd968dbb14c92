use async_trait::async_trait;
use dialog_flow::{Context, GraphError, Result, Task, TaskResult};
use tracing::{info, warn};

use crate::downstream::Orchestrator;
use crate::format::{BRIEF_LIMIT, brief_list, empty_list_message, matches_intent};
use crate::intent::Intent;
use crate::models::{CredentialBundle, ListIntent, SessionState, ShipmentSummary};
use crate::replies;
use crate::tasks::session_keys;

/// Fetches shipments, replies with a brief list and offers details next turn
pub struct ShipmentListTask {
    orchestrator: Orchestrator,
}

impl ShipmentListTask {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Task for ShipmentListTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let list = match context.get::<Intent>(session_keys::INTENT).await {
            Some(Intent::TransitStatus) => ListIntent::InTransit,
            Some(Intent::UnpaidBills) => ListIntent::UnpaidBills,
            other => {
                return Err(GraphError::ContextError(format!(
                    "shipment list task reached with intent {other:?}"
                )));
            }
        };
        let bundle: CredentialBundle = context
            .get(session_keys::CREDENTIALS)
            .await
            .ok_or_else(|| GraphError::ContextError("credentials not found".to_string()))?;

        let summaries = match self.orchestrator.fetch_summaries(&bundle).await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(task_id = %self.id(), error = %e, "Shipment list unavailable, using fallback");
                return Ok(TaskResult::reply(replies::STILL_PROCESSING));
            }
        };

        let matching: Vec<ShipmentSummary> = summaries
            .into_iter()
            .filter(|summary| matches_intent(list, summary))
            .collect();

        info!(task_id = %self.id(), list = ?list, matching = matching.len(), "Shipment list filtered");

        if matching.is_empty() {
            return Ok(TaskResult::reply(empty_list_message(list)));
        }

        let text = brief_list(list, &matching, BRIEF_LIMIT);
        context
            .set(session_keys::OUTBOUND_STATE, SessionState::awaiting(list, matching))
            .await;
        Ok(TaskResult::reply(text))
    }
}
