use dialog_flow::{Context, Graph, GraphBuilder, Task};
use std::sync::Arc;

use crate::bindings::BindingStore;
use crate::downstream::Orchestrator;
use crate::intent::Intent;
use crate::tasks::continuation::wants_details;
use crate::tasks::*;

fn intent_of(context: &Context) -> Option<Intent> {
    context.get_sync::<Intent>(session_keys::INTENT)
}

/// One graph run answers one turn:
///
/// ```text
/// classify ─┬─ verification
///           ├─ pairing
///           └─ authenticate ─┬─ continuation
///                            ├─ shipment_list
///                            └─ general_chat
/// ```
pub fn build_turn_graph(
    bindings: BindingStore,
    orchestrator: Orchestrator,
    verification_phrase: &str,
) -> Graph {
    let classify = Arc::new(ClassifyIntentTask);
    let verification = Arc::new(VerificationTask::new(verification_phrase));
    let pairing = Arc::new(PairingTask::new(bindings.clone()));
    let authenticate = Arc::new(AuthenticateTask::new(bindings));
    let continuation = Arc::new(ContinuationTask);
    let shipment_list = Arc::new(ShipmentListTask::new(orchestrator.clone()));
    let general_chat = Arc::new(GeneralChatTask::new(orchestrator));

    let classify_id = classify.id().to_string();
    let verification_id = verification.id().to_string();
    let pairing_id = pairing.id().to_string();
    let authenticate_id = authenticate.id().to_string();
    let continuation_id = continuation.id().to_string();
    let shipment_list_id = shipment_list.id().to_string();
    let general_chat_id = general_chat.id().to_string();

    GraphBuilder::new("voice_turn")
        .add_task(classify)
        .add_task(verification)
        .add_task(pairing)
        .add_task(authenticate)
        .add_task(continuation)
        .add_task(shipment_list)
        .add_task(general_chat)
        // preamble
        .add_conditional_edge(&classify_id, verification_id, |ctx| {
            matches!(intent_of(ctx), Some(Intent::Verification))
        })
        .add_conditional_edge(&classify_id, pairing_id, |ctx| {
            matches!(intent_of(ctx), Some(Intent::PairingCode(_)))
        })
        .add_edge(&classify_id, &authenticate_id)
        // authenticated dispatch
        .add_conditional_edge(&authenticate_id, continuation_id, wants_details)
        .add_conditional_edge(&authenticate_id, shipment_list_id, |ctx| {
            matches!(
                intent_of(ctx),
                Some(Intent::TransitStatus | Intent::UnpaidBills)
            )
        })
        .add_edge(&authenticate_id, general_chat_id)
        .build()
}
