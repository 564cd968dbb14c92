use async_trait::async_trait;
use dialog_flow::{Context, GraphError, Result, Task, TaskResult};
use tracing::info;

use crate::format::{DETAILED_LIMIT, detailed_list};
use crate::intent::is_affirmation;
use crate::models::SessionState;
use crate::tasks::session_keys;

/// Whether this turn is a "yes" to the details offered last turn
pub fn wants_details(context: &Context) -> bool {
    let pending = context
        .get_sync::<SessionState>(session_keys::INBOUND_STATE)
        .is_some_and(|state| state.pending_details().is_some());
    pending
        && context
            .get_sync::<String>(session_keys::UTTERANCE)
            .is_some_and(|utterance| is_affirmation(&utterance))
}

/// Answers the follow-up with the detailed list and clears the pending state
pub struct ContinuationTask;

#[async_trait]
impl Task for ContinuationTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let state: SessionState = context
            .get(session_keys::INBOUND_STATE)
            .await
            .ok_or_else(|| GraphError::ContextError("inbound state not found".to_string()))?;
        let (intent, items) = state
            .pending_details()
            .ok_or_else(|| GraphError::ContextError("no pending follow-up".to_string()))?;

        info!(task_id = %self.id(), items = items.len(), "Answering follow-up with details");

        let text = detailed_list(intent, items, DETAILED_LIMIT);
        context
            .set(session_keys::OUTBOUND_STATE, SessionState::cleared())
            .await;
        Ok(TaskResult::reply(text))
    }
}
