use async_trait::async_trait;
use dialog_flow::{Context, Result, Task, TaskResult};
use tracing::info;

use crate::intent::classify;
use crate::tasks::session_keys;

/// Classifies the utterance and records the intent for edge routing
pub struct ClassifyIntentTask;

#[async_trait]
impl Task for ClassifyIntentTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let utterance: String = context
            .get(session_keys::UTTERANCE)
            .await
            .unwrap_or_default();

        let intent = classify(&utterance);
        info!(
            task_id = %self.id(),
            intent = intent.name(),
            utterance_length = utterance.chars().count(),
            "Utterance classified"
        );

        context.set(session_keys::INTENT, intent).await;
        Ok(TaskResult::proceed())
    }
}
