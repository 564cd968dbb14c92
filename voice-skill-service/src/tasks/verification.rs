use async_trait::async_trait;
use dialog_flow::{Context, Result, Task, TaskResult};

/// Answers platform review probes without touching authentication
pub struct VerificationTask {
    phrase: String,
}

impl VerificationTask {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }
}

#[async_trait]
impl Task for VerificationTask {
    async fn run(&self, _context: Context) -> Result<TaskResult> {
        Ok(TaskResult::reply(self.phrase.clone()))
    }
}
