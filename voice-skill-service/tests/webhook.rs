use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower::ServiceExt;

use voice_skill_service::bindings::BindingStore;
use voice_skill_service::config::DownstreamConfig;
use voice_skill_service::downstream::{
    AssistantRequest, AssistantService, DownstreamError, Orchestrator, ShipmentQuery,
    ShipmentService,
};
use voice_skill_service::envelope::OutboundEnvelope;
use voice_skill_service::kv::{InMemoryKvStore, KvStore};
use voice_skill_service::models::{ListIntent, SessionState, ShipmentSummary};
use voice_skill_service::replies;
use voice_skill_service::{AppState, TurnEngine, build_router};

const VERIFICATION: &str = "Навык на связи";
const SHIPMENTS_BUDGET: Duration = Duration::from_millis(150);
const ASSISTANT_BUDGET: Duration = Duration::from_millis(400);

#[derive(Default)]
enum ShipmentBehavior {
    #[default]
    Records,
    Hang,
    Fail,
    Panic,
}

#[derive(Default)]
struct FakeShipments {
    records: Vec<Value>,
    behavior: ShipmentBehavior,
    calls: AtomicUsize,
}

#[async_trait]
impl ShipmentService for FakeShipments {
    async fn list_shipments(&self, _query: &ShipmentQuery) -> Result<Vec<Value>, DownstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ShipmentBehavior::Records => Ok(self.records.clone()),
            ShipmentBehavior::Hang => std::future::pending().await,
            ShipmentBehavior::Fail => Err(DownstreamError::Status {
                kind: voice_skill_service::downstream::DownstreamKind::Shipments,
                status: 500,
            }),
            ShipmentBehavior::Panic => panic!("shipment backend exploded"),
        }
    }
}

#[derive(Default)]
enum AssistantBehavior {
    #[default]
    Reply,
    Hang,
    Fail,
}

#[derive(Default)]
struct FakeAssistant {
    reply: Option<String>,
    behavior: AssistantBehavior,
    calls: AtomicUsize,
    last_request: Mutex<Option<AssistantRequest>>,
}

#[async_trait]
impl AssistantService for FakeAssistant {
    async fn reply(&self, request: &AssistantRequest) -> Result<Option<String>, DownstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        match self.behavior {
            AssistantBehavior::Reply => Ok(self.reply.clone()),
            AssistantBehavior::Hang => std::future::pending().await,
            AssistantBehavior::Fail => Err(DownstreamError::Status {
                kind: voice_skill_service::downstream::DownstreamKind::Assistant,
                status: 503,
            }),
        }
    }
}

struct Harness {
    kv: InMemoryKvStore,
    shipments: Arc<FakeShipments>,
    assistant: Arc<FakeAssistant>,
    router: Router,
}

impl Harness {
    fn new(shipments: FakeShipments, assistant: FakeAssistant) -> Self {
        let kv = InMemoryKvStore::new();
        let shipments = Arc::new(shipments);
        let assistant = Arc::new(assistant);

        let orchestrator = Orchestrator::new(
            shipments.clone(),
            assistant.clone(),
            DownstreamConfig {
                base_url: "http://unused".to_string(),
                shipments_budget: SHIPMENTS_BUDGET,
                assistant_budget: ASSISTANT_BUDGET,
                assistant_model: "test-model".to_string(),
            },
        );
        let engine = TurnEngine::from_parts(
            BindingStore::new(Arc::new(kv.clone())),
            orchestrator,
            VERIFICATION,
        );
        let router = build_router(AppState {
            engine: Arc::new(engine),
        });

        Self {
            kv,
            shipments,
            assistant,
            router,
        }
    }

    fn default() -> Self {
        Self::new(FakeShipments::default(), FakeAssistant::default())
    }

    async fn bind(&self, user_id: &str) {
        let bundle = json!({
            "login": "acme",
            "password": "pw",
            "customer": "ООО Ромашка",
            "inn": "7701234567"
        });
        self.kv
            .set(&format!("binding:{user_id}"), &bundle.to_string(), None)
            .await;
    }

    async fn send_raw(&self, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn turn(&self, envelope: Value) -> OutboundEnvelope {
        let (status, body) = self
            .send_raw("POST", "/webhook", Body::from(envelope.to_string()))
            .await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    async fn say(&self, user_id: &str, utterance: &str) -> OutboundEnvelope {
        self.turn(envelope(user_id, utterance, None)).await
    }
}

fn envelope(user_id: &str, utterance: &str, state: Option<&SessionState>) -> Value {
    json!({
        "session": { "session_id": "sess-1", "user": { "user_id": user_id } },
        "request": { "command": utterance, "original_utterance": utterance },
        "state": { "session": state }
    })
}

fn record(number: &str, state: &str, bill: &str) -> Value {
    json!({
        "Number": number,
        "State": state,
        "Sum": 1000,
        "CitySender": "Москва",
        "CityReceiver": "Казань",
        "StateBill": bill
    })
}

#[tokio::test]
async fn verification_phrase_needs_no_binding() {
    let harness = Harness::default();
    let reply = harness.say("stranger", "проверка навыка").await;

    assert_eq!(reply.response.text, VERIFICATION);
    assert!(!reply.response.end_session);
    assert_eq!(reply.version, "1.0");
    assert!(reply.session_state.is_none());
}

#[tokio::test]
async fn unknown_pairing_code_reports_expired() {
    let harness = Harness::default();
    let reply = harness.say("U1", "245781").await;

    assert_eq!(
        reply.response.text,
        "Код не найден или истек. Получите новый код в мини‑приложении."
    );
    assert!(reply.session_state.is_none());
    assert!(harness.kv.is_empty());
}

#[tokio::test]
async fn pairing_code_binds_user_and_indexes_login() {
    let harness = Harness::default();
    let pairing = json!({ "login": "ACME", "password": "pw", "customer": "ООО Ромашка" });
    harness
        .kv
        .set("pairing:4821", &pairing.to_string(), Some(Duration::from_secs(600)))
        .await;

    let reply = harness.say("U1", "мой код 4821, запомни").await;
    assert_eq!(reply.response.text, replies::paired("ООО Ромашка"));

    let binding: Value = serde_json::from_str(&harness.kv.get("binding:U1").await.unwrap()).unwrap();
    assert_eq!(binding["login"], "ACME");
    assert_eq!(harness.kv.get("loginIndex:acme").await.as_deref(), Some("U1"));
    assert!(harness.kv.expires_in("loginIndex:acme").is_some());
    assert!(harness.kv.expires_in("binding:U1").is_none());
}

#[tokio::test]
async fn unbound_user_is_asked_to_pair_without_downstream_calls() {
    let harness = Harness::default();

    for utterance in ["какие счета не оплачены", "покажи в пути", "привет"] {
        let reply = harness.say("U1", utterance).await;
        assert_eq!(reply.response.text, replies::AUTH_REQUIRED);
    }
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.assistant.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn corrupted_binding_asks_for_a_new_code() {
    let harness = Harness::default();
    harness.kv.set("binding:U1", "{\"login\":\"acme\"}", None).await;

    let reply = harness.say("U1", "какие счета").await;
    assert_eq!(reply.response.text, replies::BINDING_CORRUPTED);
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn in_transit_list_offers_details() {
    let harness = Harness::new(
        FakeShipments {
            records: vec![
                record("A-1", "Груз в пути", "Оплачен"),
                record("A-2", "В пути", "Не оплачен"),
                record("A-3", "В пути", "Оплачен"),
                record("A-4", "Доставлен", "Не оплачен"),
            ],
            ..Default::default()
        },
        FakeAssistant::default(),
    );
    harness.bind("U1").await;

    let reply = harness.say("U1", "покажи в пути").await;
    assert_eq!(
        reply.response.text,
        "Перевозки в пути: A-1, A-2, A-3. Рассказать подробнее?"
    );

    let state = reply.session_state.unwrap();
    assert!(state.awaiting_details);
    assert_eq!(state.last_intent, Some(ListIntent::InTransit));
    assert_eq!(state.last_data.len(), 3);
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn brief_list_caps_numbers_but_keeps_ten_for_follow_up() {
    let records = (1..=12)
        .map(|i| record(&format!("N{i}"), "Доставлен", "Не оплачен"))
        .collect();
    let harness = Harness::new(
        FakeShipments {
            records,
            ..Default::default()
        },
        FakeAssistant::default(),
    );
    harness.bind("U1").await;

    let reply = harness.say("U1", "что с оплатой").await;
    assert!(reply.response.text.starts_with("Неоплаченные счета: N1, N2, N3, N4, N5, N6, N7 и ещё 5"));
    let state = reply.session_state.unwrap();
    assert_eq!(state.last_intent, Some(ListIntent::UnpaidBills));
    assert_eq!(state.last_data.len(), 10);
}

#[tokio::test]
async fn empty_list_sets_no_follow_up() {
    let harness = Harness::new(
        FakeShipments {
            records: vec![record("A-1", "Доставлен", "Оплачен")],
            ..Default::default()
        },
        FakeAssistant::default(),
    );
    harness.bind("U1").await;

    let reply = harness.say("U1", "перевозки в пути").await;
    assert_eq!(reply.response.text, "Сейчас нет перевозок в пути.");
    assert!(reply.session_state.is_none());
}

#[tokio::test]
async fn affirmation_returns_details_and_clears_state() {
    let harness = Harness::default();
    harness.bind("U1").await;

    let data = vec![ShipmentSummary {
        number: Some("B-7".to_string()),
        state: Some("Доставлен".to_string()),
        sum: Some(12500.5),
        city_sender: Some("Москва".to_string()),
        city_receiver: None,
        state_bill: Some("Не оплачен".to_string()),
    }];
    let pending = SessionState::awaiting(ListIntent::UnpaidBills, data);

    let reply = harness.turn(envelope("U1", "да", Some(&pending))).await;
    assert_eq!(
        reply.response.text,
        "Неоплаченные счета:\n1. №B-7: Доставлен, 12 500,50 ₽, Москва — ?, не оплачен"
    );
    assert_eq!(reply.session_state, Some(SessionState::cleared()));
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.assistant.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn other_utterance_abandons_pending_follow_up() {
    let harness = Harness::new(
        FakeShipments::default(),
        FakeAssistant {
            reply: Some("Чем помочь?".to_string()),
            ..Default::default()
        },
    );
    harness.bind("U1").await;
    let pending = SessionState::awaiting(ListIntent::InTransit, vec![ShipmentSummary::default()]);

    let reply = harness.turn(envelope("U1", "нет, спасибо", Some(&pending))).await;
    assert_eq!(reply.response.text, "Чем помочь?");
    assert!(reply.session_state.is_none());
}

#[tokio::test]
async fn hanging_shipment_list_still_answers_within_budget() {
    let harness = Harness::new(
        FakeShipments {
            behavior: ShipmentBehavior::Hang,
            ..Default::default()
        },
        FakeAssistant::default(),
    );
    harness.bind("U1").await;

    let started = Instant::now();
    let reply = harness.say("U1", "покажи в пути").await;
    let elapsed = started.elapsed();

    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
    assert!(elapsed >= SHIPMENTS_BUDGET);
    assert!(elapsed < SHIPMENTS_BUDGET + Duration::from_millis(500), "{elapsed:?}");
}

#[tokio::test]
async fn failing_shipment_list_falls_back_without_retry() {
    let harness = Harness::new(
        FakeShipments {
            behavior: ShipmentBehavior::Fail,
            ..Default::default()
        },
        FakeAssistant::default(),
    );
    harness.bind("U1").await;

    let reply = harness.say("U1", "какие счета").await;
    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn general_chat_returns_assistant_reply_and_warms_cache() {
    let harness = Harness::new(
        FakeShipments::default(),
        FakeAssistant {
            reply: Some("Доставка занимает два дня.".to_string()),
            ..Default::default()
        },
    );
    harness.bind("U1").await;

    let reply = harness
        .say("U1", "  Сколько идет доставка до Казани для ООО Ромашка ")
        .await;
    assert_eq!(reply.response.text, "Доставка занимает два дня.");
    assert!(reply.session_state.is_none());

    let request = harness.assistant.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.session_id, "sess-1");
    assert_eq!(request.user_id, "U1");
    assert_eq!(
        request.message,
        "Сколько идет доставка до Казани для ООО Ромашка"
    );
    assert_eq!(request.customer.as_deref(), Some("ООО Ромашка"));
    assert_eq!(request.auth.login, "acme");
    assert_eq!(request.channel, "voice");
    assert_eq!(request.model, "test-model");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_refresh_does_not_delay_chat() {
    let harness = Harness::new(
        FakeShipments {
            behavior: ShipmentBehavior::Hang,
            ..Default::default()
        },
        FakeAssistant {
            reply: Some("Ответ".to_string()),
            ..Default::default()
        },
    );
    harness.bind("U1").await;

    let started = Instant::now();
    let reply = harness.say("U1", "расскажи о компании").await;
    assert_eq!(reply.response.text, "Ответ");
    assert!(started.elapsed() < SHIPMENTS_BUDGET);
}

#[tokio::test]
async fn background_refreshes_end_after_shipment_budget() {
    let harness = Harness::new(
        FakeShipments {
            behavior: ShipmentBehavior::Hang,
            ..Default::default()
        },
        FakeAssistant {
            reply: Some("Ответ".to_string()),
            ..Default::default()
        },
    );
    harness.bind("U1").await;
    let holders_before = Arc::strong_count(&harness.shipments);

    for _ in 0..20 {
        let reply = harness.say("U1", "расскажи о компании").await;
        assert_eq!(reply.response.text, "Ответ");
    }
    assert_eq!(harness.shipments.calls.load(Ordering::SeqCst), 20);

    tokio::time::sleep(SHIPMENTS_BUDGET + Duration::from_millis(300)).await;
    assert_eq!(Arc::strong_count(&harness.shipments), holders_before);
}

#[tokio::test]
async fn hanging_assistant_falls_back_within_budget() {
    let harness = Harness::new(
        FakeShipments::default(),
        FakeAssistant {
            behavior: AssistantBehavior::Hang,
            ..Default::default()
        },
    );
    harness.bind("U1").await;

    let started = Instant::now();
    let reply = harness.say("U1", "расскажи о компании").await;
    let elapsed = started.elapsed();

    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
    assert!(elapsed >= ASSISTANT_BUDGET);
    assert!(elapsed < ASSISTANT_BUDGET + Duration::from_millis(500), "{elapsed:?}");
}

#[tokio::test]
async fn failing_assistant_falls_back() {
    let harness = Harness::new(
        FakeShipments::default(),
        FakeAssistant {
            behavior: AssistantBehavior::Fail,
            ..Default::default()
        },
    );
    harness.bind("U1").await;

    let reply = harness.say("U1", "расскажи о компании").await;
    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
    assert_eq!(harness.assistant.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_assistant_reply_uses_fallback() {
    let harness = Harness::default();
    harness.bind("U1").await;

    let reply = harness.say("U1", "расскажи анекдот").await;
    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
}

#[tokio::test]
async fn panicking_downstream_is_contained() {
    let harness = Harness::new(
        FakeShipments {
            behavior: ShipmentBehavior::Panic,
            ..Default::default()
        },
        FakeAssistant::default(),
    );
    harness.bind("U1").await;

    let reply = harness.say("U1", "покажи в пути").await;
    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
}

#[tokio::test]
async fn unparsable_body_still_gets_an_envelope() {
    let harness = Harness::default();
    let (status, body) = harness
        .send_raw("POST", "/webhook", Body::from("{not json"))
        .await;

    assert_eq!(status, StatusCode::OK);
    let reply: OutboundEnvelope = serde_json::from_slice(&body).unwrap();
    assert_eq!(reply.response.text, replies::STILL_PROCESSING);
}

#[tokio::test]
async fn missing_user_id_cannot_pair() {
    let harness = Harness::default();
    let reply = harness
        .turn(json!({ "session": {}, "request": { "command": "1234" } }))
        .await;
    assert_eq!(reply.response.text, replies::AUTH_REQUIRED);
}

#[tokio::test]
async fn only_post_is_accepted() {
    let harness = Harness::default();
    let (status, _) = harness.send_raw("GET", "/webhook", Body::empty()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_reports_healthy() {
    let harness = Harness::default();
    let (status, body) = harness.send_raw("GET", "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["status"], "healthy");
}
