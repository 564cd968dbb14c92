use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of summaries carried into a follow-up turn
pub const MAX_FOLLOW_UP_ITEMS: usize = 10;

/// Credentials issued with a pairing code and kept in a user binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub login: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
}

impl CredentialBundle {
    /// Both login and password are present
    pub fn is_trusted(&self) -> bool {
        !self.login.trim().is_empty() && !self.password.trim().is_empty()
    }

    /// Parse a stored record, rejecting payloads that cannot authenticate
    pub fn parse_trusted(raw: &str) -> Option<Self> {
        serde_json::from_str::<Self>(raw)
            .ok()
            .filter(Self::is_trusted)
    }

    /// Login as used in index keys
    pub fn normalized_login(&self) -> String {
        self.login.trim().to_lowercase()
    }

    /// Name to address the user by after pairing
    pub fn display_name(&self) -> &str {
        self.customer
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.login.trim())
    }

    pub fn inn(&self) -> Option<&str> {
        self.inn.as_deref().map(str::trim).filter(|inn| !inn.is_empty())
    }
}

/// Which list a follow-up turn refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListIntent {
    InTransit,
    UnpaidBills,
}

/// Trimmed projection of a downstream shipment record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShipmentSummary {
    pub number: Option<String>,
    pub state: Option<String>,
    pub sum: Option<f64>,
    pub city_sender: Option<String>,
    pub city_receiver: Option<String>,
    pub state_bill: Option<String>,
}

impl ShipmentSummary {
    /// Project a raw record; numbers and sums may arrive as strings or numbers
    pub fn from_record(record: &Value) -> Option<Self> {
        let object = record.as_object()?;
        let text = |key: &str| match object.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let sum = match object.get("Sum") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => parse_amount(s),
            _ => None,
        };

        Some(Self {
            number: text("Number"),
            state: text("State"),
            sum,
            city_sender: text("CitySender"),
            city_receiver: text("CityReceiver"),
            state_bill: text("StateBill"),
        })
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse().ok()
}

/// Dialog memory round-tripped by the voice platform between turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub awaiting_details: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<ListIntent>,
    #[serde(default)]
    pub last_data: Vec<ShipmentSummary>,
}

impl SessionState {
    /// State offering details for `data` on the next turn
    pub fn awaiting(intent: ListIntent, mut data: Vec<ShipmentSummary>) -> Self {
        data.truncate(MAX_FOLLOW_UP_ITEMS);
        Self {
            awaiting_details: true,
            last_intent: Some(intent),
            last_data: data,
        }
    }

    /// State after a follow-up has been answered
    pub fn cleared() -> Self {
        Self::default()
    }

    /// The pending follow-up, if the state is a valid one
    pub fn pending_details(&self) -> Option<(ListIntent, &[ShipmentSummary])> {
        if !self.awaiting_details {
            return None;
        }
        let intent = self.last_intent?;
        let end = self.last_data.len().min(MAX_FOLLOW_UP_ITEMS);
        Some((intent, &self.last_data[..end]))
    }
}
