use async_trait::async_trait;
use dialog_flow::{Context, Result, Task, TaskResult};
use tracing::info;

use crate::bindings::{BindingLookup, BindingStore};
use crate::replies;
use crate::tasks::session_keys;

/// Loads the user's binding; unbound users get the pairing prompt
pub struct AuthenticateTask {
    bindings: BindingStore,
}

impl AuthenticateTask {
    pub fn new(bindings: BindingStore) -> Self {
        Self { bindings }
    }
}

#[async_trait]
impl Task for AuthenticateTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(user_id) = context.get::<String>(session_keys::USER_ID).await else {
            return Ok(TaskResult::reply(replies::AUTH_REQUIRED));
        };

        match self.bindings.lookup_binding(&user_id).await {
            BindingLookup::Bound(bundle) => {
                context.set(session_keys::CREDENTIALS, bundle).await;
                Ok(TaskResult::proceed())
            }
            BindingLookup::Unbound => {
                info!(user_id = %user_id, "No binding for user, asking to pair");
                Ok(TaskResult::reply(replies::AUTH_REQUIRED))
            }
            BindingLookup::Corrupted => Ok(TaskResult::reply(replies::BINDING_CORRUPTED)),
        }
    }
}
