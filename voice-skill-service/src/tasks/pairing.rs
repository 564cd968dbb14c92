use async_trait::async_trait;
use dialog_flow::{Context, GraphError, Result, Task, TaskResult};
use tracing::{info, warn};

use crate::bindings::{BindingStore, Redemption};
use crate::intent::Intent;
use crate::replies;
use crate::tasks::session_keys;

/// Redeems a spoken pairing code and binds the user to its credentials.
///
/// The turn always ends here, whether or not the code was valid.
pub struct PairingTask {
    bindings: BindingStore,
}

impl PairingTask {
    pub fn new(bindings: BindingStore) -> Self {
        Self { bindings }
    }
}

#[async_trait]
impl Task for PairingTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let code = match context.get::<Intent>(session_keys::INTENT).await {
            Some(Intent::PairingCode(code)) => code,
            _ => {
                return Err(GraphError::ContextError(
                    "pairing task reached without a pairing code".to_string(),
                ));
            }
        };

        let Some(user_id) = context.get::<String>(session_keys::USER_ID).await else {
            warn!(task_id = %self.id(), "Pairing attempt without a user id");
            return Ok(TaskResult::reply(replies::AUTH_REQUIRED));
        };

        let bundle = match self.bindings.redeem_pairing_code(&code).await {
            Redemption::Redeemed(bundle) => bundle,
            Redemption::NotFound => {
                info!(user_id = %user_id, "Pairing code not found or expired");
                return Ok(TaskResult::reply(replies::CODE_NOT_FOUND));
            }
        };

        let outcome = self.bindings.bind_user(&user_id, &bundle).await;
        if !outcome.binding_stored {
            return Ok(TaskResult::reply(replies::BINDING_NOT_SAVED));
        }

        Ok(TaskResult::reply(replies::paired(bundle.display_name())))
    }
}
