//! Spoken renderings of shipment lists.

use crate::models::{ListIntent, MAX_FOLLOW_UP_ITEMS, ShipmentSummary};

pub const BRIEF_LIMIT: usize = 7;
pub const DETAILED_LIMIT: usize = MAX_FOLLOW_UP_ITEMS;

const CANONICAL_STATUSES: &[(&str, &str)] = &[("груз в пути", "В пути")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKey {
    Unpaid,
    Paid,
    Partial,
    Unknown,
}

impl PaymentKey {
    pub fn label(self) -> &'static str {
        match self {
            PaymentKey::Unpaid => "не оплачен",
            PaymentKey::Paid => "оплачен",
            PaymentKey::Partial => "оплачен частично",
            PaymentKey::Unknown => "статус оплаты неизвестен",
        }
    }
}

pub fn normalize_status(status: &str) -> String {
    let trimmed = status.trim();
    let lowered = trimmed.to_lowercase();
    CANONICAL_STATUSES
        .iter()
        .find(|(variant, _)| lowered == *variant)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn payment_key(state_bill: &str) -> PaymentKey {
    let text = state_bill.to_lowercase();
    if text.contains("не оплач") || text.contains("неоплач") {
        PaymentKey::Unpaid
    } else if text.contains("частич") {
        PaymentKey::Partial
    } else if text.contains("оплач") {
        PaymentKey::Paid
    } else {
        PaymentKey::Unknown
    }
}

pub fn is_in_transit(summary: &ShipmentSummary) -> bool {
    summary
        .state
        .as_deref()
        .map(|state| normalize_status(state).to_lowercase().contains("в пути"))
        .unwrap_or(false)
}

/// Outstanding money: unpaid or only partially paid
pub fn is_unpaid(summary: &ShipmentSummary) -> bool {
    matches!(
        summary.state_bill.as_deref().map(payment_key),
        Some(PaymentKey::Unpaid | PaymentKey::Partial)
    )
}

pub fn matches_intent(intent: ListIntent, summary: &ShipmentSummary) -> bool {
    match intent {
        ListIntent::InTransit => is_in_transit(summary),
        ListIntent::UnpaidBills => is_unpaid(summary),
    }
}

/// `12 345 ₽` or `12 345,50 ₽`
pub fn format_sum(sum: f64) -> String {
    let kopecks = (sum.abs() * 100.0).round() as u64;
    let (rubles, fraction) = (kopecks / 100, kopecks % 100);

    let digits = rubles.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if sum < 0.0 && kopecks > 0 { "-" } else { "" };
    if fraction == 0 {
        format!("{sign}{grouped} ₽")
    } else {
        format!("{sign}{grouped},{fraction:02} ₽")
    }
}

fn number_of(summary: &ShipmentSummary) -> &str {
    summary.number.as_deref().unwrap_or("без номера")
}

fn heading(intent: ListIntent) -> &'static str {
    match intent {
        ListIntent::InTransit => "Перевозки в пути",
        ListIntent::UnpaidBills => "Неоплаченные счета",
    }
}

pub fn empty_list_message(intent: ListIntent) -> &'static str {
    match intent {
        ListIntent::InTransit => "Сейчас нет перевозок в пути.",
        ListIntent::UnpaidBills => "Неоплаченных счетов нет.",
    }
}

/// Numbers only, for the immediate reply
pub fn brief_list(intent: ListIntent, items: &[ShipmentSummary], limit: usize) -> String {
    let shown: Vec<&str> = items.iter().take(limit).map(number_of).collect();
    let mut text = format!("{}: {}", heading(intent), shown.join(", "));
    if items.len() > shown.len() {
        text.push_str(&format!(" и ещё {}", items.len() - shown.len()));
    }
    text.push_str(". Рассказать подробнее?");
    text
}

pub fn detailed_line(index: usize, summary: &ShipmentSummary) -> String {
    let status = summary
        .state
        .as_deref()
        .map(normalize_status)
        .unwrap_or_else(|| "статус неизвестен".to_string());
    let sum = summary
        .sum
        .map(format_sum)
        .unwrap_or_else(|| "сумма не указана".to_string());
    let route = format!(
        "{} — {}",
        summary.city_sender.as_deref().unwrap_or("?"),
        summary.city_receiver.as_deref().unwrap_or("?")
    );
    let payment = summary
        .state_bill
        .as_deref()
        .map(payment_key)
        .unwrap_or(PaymentKey::Unknown)
        .label();

    format!(
        "{}. №{}: {}, {}, {}, {}",
        index + 1,
        number_of(summary),
        status,
        sum,
        route,
        payment
    )
}

/// Number, status, sum, route and payment for each item
pub fn detailed_list(intent: ListIntent, items: &[ShipmentSummary], limit: usize) -> String {
    if items.is_empty() {
        return empty_list_message(intent).to_string();
    }
    let lines: Vec<String> = items
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, summary)| detailed_line(i, summary))
        .collect();
    format!("{}:\n{}", heading(intent), lines.join("\n"))
}
