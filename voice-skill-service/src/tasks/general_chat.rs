use async_trait::async_trait;
use dialog_flow::{Context, GraphError, Result, Task, TaskResult};
use tracing::{info, warn};

use crate::downstream::Orchestrator;
use crate::models::CredentialBundle;
use crate::replies;
use crate::tasks::session_keys;

/// Delegates free-form questions to the conversational assistant
pub struct GeneralChatTask {
    orchestrator: Orchestrator,
}

impl GeneralChatTask {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Task for GeneralChatTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let bundle: CredentialBundle = context
            .get(session_keys::CREDENTIALS)
            .await
            .ok_or_else(|| GraphError::ContextError("credentials not found".to_string()))?;
        let user_id: String = context
            .get(session_keys::USER_ID)
            .await
            .ok_or_else(|| GraphError::ContextError("user_id not found".to_string()))?;
        let session_id: String = context
            .get(session_keys::SESSION_ID)
            .await
            .unwrap_or_else(|| user_id.clone());
        let message: String = match context.get(session_keys::RAW_UTTERANCE).await {
            Some(raw) => raw,
            None => context
                .get(session_keys::UTTERANCE)
                .await
                .unwrap_or_default(),
        };

        let _ = self.orchestrator.refresh_in_background(&bundle);

        let request = self
            .orchestrator
            .assistant_request(&session_id, &user_id, &message, &bundle);
        match self.orchestrator.ask_assistant(&request).await {
            Ok(Some(reply)) => {
                info!(task_id = %self.id(), reply_length = reply.chars().count(), "Assistant replied");
                Ok(TaskResult::reply(reply))
            }
            Ok(None) => {
                warn!(task_id = %self.id(), "Assistant returned an empty reply, using fallback");
                Ok(TaskResult::reply(replies::STILL_PROCESSING))
            }
            Err(e) => {
                warn!(task_id = %self.id(), error = %e, "Assistant unavailable, using fallback");
                Ok(TaskResult::reply(replies::STILL_PROCESSING))
            }
        }
    }
}
