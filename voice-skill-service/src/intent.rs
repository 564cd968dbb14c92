//! Keyword intent classification.
//!
//! Rules run in a fixed order over the normalized utterance and the first
//! match wins. A standalone 4-6 digit number is always a pairing attempt,
//! even inside an otherwise chatty sentence.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const VERIFICATION_PHRASES: &[&str] = &["проверка навыка", "проверка связи", "тест навыка"];
const SHIPMENT_WORDS: &[&str] = &["перевоз", "груз", "отправ", "посылк", "доставк"];
const EN_ROUTE_PHRASES: &[&str] = &["в пути", "в дороге"];
/// Whole words only: "едет" must not match "приедет"
const EN_ROUTE_WORDS: &[&str] = &["едет", "едут"];
const INVOICE_WORDS: &[&str] = &["счет", "счёт"];
const PAYMENT_WORDS: &[&str] = &["оплат", "неоплач", "задолж"];
/// Whole words only: "долг" must not match "долго"
const DEBT_WORDS: &[&str] = &["долг", "долги", "долга", "долгу", "долгов", "долгом"];
const AFFIRMATION_WORDS: &[&str] = &["да", "давай", "ага", "угу", "конечно", "подробнее", "хочу"];

static PAIRING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{4,6})(?:\D|$)").expect("pairing code regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Intent {
    Verification,
    PairingCode(String),
    TransitStatus,
    UnpaidBills,
    GeneralChat,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Verification => "verification",
            Intent::PairingCode(_) => "pairing_code",
            Intent::TransitStatus => "transit_status",
            Intent::UnpaidBills => "unpaid_bills",
            Intent::GeneralChat => "general_chat",
        }
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn contains_word(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| words.contains(&word))
}

/// First standalone run of 4-6 digits
pub fn extract_pairing_code(text: &str) -> Option<String> {
    PAIRING_CODE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn classify(utterance: &str) -> Intent {
    let text = utterance.trim().to_lowercase();

    if contains_any(&text, VERIFICATION_PHRASES) {
        return Intent::Verification;
    }
    if let Some(code) = extract_pairing_code(&text) {
        return Intent::PairingCode(code);
    }

    let en_route = contains_any(&text, EN_ROUTE_PHRASES) || contains_word(&text, EN_ROUTE_WORDS);
    let about_money = contains_any(&text, INVOICE_WORDS)
        || contains_any(&text, PAYMENT_WORDS)
        || contains_word(&text, DEBT_WORDS);
    if en_route && (contains_any(&text, SHIPMENT_WORDS) || !about_money) {
        return Intent::TransitStatus;
    }
    if about_money {
        return Intent::UnpaidBills;
    }
    Intent::GeneralChat
}

/// Whether the utterance says "yes" as a whole word
pub fn is_affirmation(utterance: &str) -> bool {
    contains_word(&utterance.to_lowercase(), AFFIRMATION_WORDS)
}
