//! Formatting helpers for renderers of the producer view.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::session::SessionView;

/// Shown for any card field the producer has not filled in.
pub const PLACEHOLDER: &str = "—";

/// Normalize a card rank for display: trimmed and uppercased, with the
/// placeholder for missing or blank values.
pub fn normalize_value(value: Option<&str>) -> String {
    match value.map(str::trim) {
        None | Some("") => PLACEHOLDER.to_string(),
        Some(v) => v.to_uppercase(),
    }
}

/// Same as [`normalize_value`], reading straight from a JSON field.
pub fn normalize_json_value(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => normalize_value(Some(s)),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Map a suit letter to its symbol.
pub fn normalize_suit(suit: Option<&str>) -> &'static str {
    match suit.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("h") | Some("hearts") => "♥",
        Some("d") | Some("diamonds") => "♦",
        Some("c") | Some("clubs") => "♣",
        Some("s") | Some("spades") => "♠",
        _ => PLACEHOLDER,
    }
}

/// Coarse "time since" label, recomputed on every view tick.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=4 => "just now".to_string(),
        5..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}

/// Render the two hole cards of a stored `hand` message, e.g. `"A♥ K♦"`.
/// Accepts either the whole message or just its `data` object.
pub fn format_hand(message: &Value) -> String {
    let data = message.get("data").unwrap_or(message);
    (1..=2)
        .map(|i| {
            let value = normalize_json_value(data.get(format!("value{i}")));
            let suit = normalize_suit(data.get(format!("suit{i}")).and_then(Value::as_str));
            format!("{value}{suit}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-line status for terminal renderers.
pub fn summary_line(view: &SessionView, now: DateTime<Utc>) -> String {
    let room = view.room_id.as_deref().unwrap_or(PLACEHOLDER);
    let mut line = format!("[{}] room={room} producers={}", view.state, view.producers.len());
    if view.reconnect_attempt > 0 {
        line.push_str(&format!(" attempt={}", view.reconnect_attempt));
    }
    if let Some(producer) = view.effective_producer() {
        let hand = producer
            .latest("hand")
            .map(format_hand)
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        line.push_str(&format!(
            " | {} {hand} ({})",
            producer.label(),
            relative_time(producer.last_seen, now)
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_value_handles_ranks_and_blanks() {
        assert_eq!(normalize_value(Some("10")), "10");
        assert_eq!(normalize_value(Some("k")), "K");
        assert_eq!(normalize_value(Some(" a ")), "A");
        assert_eq!(normalize_value(Some("")), PLACEHOLDER);
        assert_eq!(normalize_value(None), PLACEHOLDER);
    }

    #[test]
    fn normalize_json_value_reads_strings_numbers_and_null() {
        assert_eq!(normalize_json_value(Some(&json!("q"))), "Q");
        assert_eq!(normalize_json_value(Some(&json!(10))), "10");
        assert_eq!(normalize_json_value(Some(&json!(null))), PLACEHOLDER);
        assert_eq!(normalize_json_value(None), PLACEHOLDER);
    }

    #[test]
    fn suits_map_to_symbols() {
        assert_eq!(normalize_suit(Some("h")), "♥");
        assert_eq!(normalize_suit(Some("D")), "♦");
        assert_eq!(normalize_suit(Some("spades")), "♠");
        assert_eq!(normalize_suit(Some("x")), PLACEHOLDER);
        assert_eq!(normalize_suit(None), PLACEHOLDER);
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(relative_time(now, now), "just now");
        assert_eq!(relative_time(now - Duration::seconds(12), now), "12s ago");
        assert_eq!(relative_time(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(relative_time(now - Duration::hours(2), now), "2h ago");
        assert_eq!(relative_time(now + Duration::seconds(30), now), "just now");
    }

    #[test]
    fn format_hand_reads_message_or_data() {
        let message = json!({
            "type": "hand",
            "publisherId": "pub2",
            "data": {"value1": "a", "suit1": "h", "value2": "K", "suit2": "d"}
        });
        assert_eq!(format_hand(&message), "A♥ K♦");
        assert_eq!(format_hand(&json!({"value1": 10, "suit1": "s"})), "10♠ ——");
    }
}
