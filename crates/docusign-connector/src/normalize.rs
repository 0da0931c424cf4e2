use base64::Engine;
use chrono::DateTime;
use serde_json::Value;

use crate::row::{Row, coerce_to_string};

fn field(raw: &Value, key: &str) -> String {
    coerce_to_string(raw.get(key))
}

/// Like `field`, but falls back to `default` when the value is missing or
/// empty, matching the original's `get(key, default)` emission for numeric
/// and boolean fields (SPEC_FULL.md §4.5; connector.py:441,494,533).
fn field_or(raw: &Value, key: &str, default: &str) -> String {
    let value = field(raw, key);
    if value.is_empty() { default.to_string() } else { value }
}

/// Normalizes one raw envelope object. Returns `None` if `envelopeId` is
/// missing or empty, per the primary-key guard in SPEC_FULL.md §4.5.
pub fn normalize_envelope(raw: &Value) -> Option<Row> {
    let status = field(raw, "status");
    let sent = field(raw, "sentDateTime");
    let completed = field(raw, "completedDateTime");

    let mut row = Row::new();
    row.insert("envelope_id", field(raw, "envelopeId"))
        .insert("status", &status)
        .insert("conversion_status", &status)
        .insert("subject", field(raw, "emailSubject"))
        .insert("sent_date_time", &sent)
        .insert("completed_date_time", &completed)
        .insert("created_date_time", field(raw, "createdDateTime"))
        .insert(
            "last_modified_date_time",
            field(raw, "statusChangedDateTime"),
        )
        .insert(
            "contract_cycle_time_hours",
            cycle_time_hours(&status, &sent, &completed),
        );

    row.has_nonempty(&["envelope_id"]).then_some(row)
}

/// Derives `contract_cycle_time_hours`: hours between `sentDateTime` and
/// `completedDateTime` when status is `completed` and both timestamps parse
/// as RFC 3339, otherwise the empty string (SPEC_FULL.md §4.5).
fn cycle_time_hours(status: &str, sent: &str, completed: &str) -> String {
    if status != "completed" {
        return String::new();
    }
    let (Ok(sent), Ok(completed)) = (
        DateTime::parse_from_rfc3339(sent),
        DateTime::parse_from_rfc3339(completed),
    ) else {
        tracing::warn!(
            sent,
            completed,
            "failed to parse envelope timestamps for cycle-time derivation"
        );
        return String::new();
    };
    let hours = (completed - sent).num_seconds() as f64 / 3600.0;
    format_hours(hours)
}

/// Formats the derived hour count the way the source's `str(float)` would:
/// always a decimal point, trailing zeros trimmed to a single digit.
fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{hours:.1}")
    } else {
        let formatted = format!("{hours}");
        if formatted.contains('.') {
            formatted
        } else {
            format!("{formatted}.0")
        }
    }
}

/// Normalizes one recipient record into the `recipient` table shape.
pub fn normalize_recipient(raw: &Value, envelope_id: &str) -> Option<Row> {
    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("recipient_id", field(raw, "recipientId"))
        .insert("type", field(raw, "recipient_type"))
        .insert("name", field(raw, "name"))
        .insert("email", field(raw, "email"))
        .insert("status", field(raw, "status"))
        .insert("routing_order", field_or(raw, "routingOrder", "0"));

    row.has_nonempty(&["envelope_id", "recipient_id"])
        .then_some(row)
}

/// Normalizes one recipient record into the superset `enhanced_recipient`
/// table shape: adds decline reason and sign/send timestamps.
pub fn normalize_enhanced_recipient(raw: &Value, envelope_id: &str) -> Option<Row> {
    let mut row = normalize_recipient(raw, envelope_id)?;
    row.insert("declined_reason", field(raw, "declinedReason"))
        .insert("sent_timestamp", field(raw, "sentDateTime"))
        .insert("signed_timestamp", field(raw, "signedDateTime"));
    Some(row)
}

/// Normalizes one audit event, flattening its `eventFields` array of
/// `{name, value}` pairs into one column per lowercased `name`
/// (SPEC_FULL.md §4.5).
pub fn normalize_audit_event(raw: &Value, envelope_id: &str) -> Option<Row> {
    let logtime = raw
        .get("eventFields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|entry| {
            entry
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case("logtime"))
        })
        .map(|entry| field(entry, "value"))
        .unwrap_or_default();

    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("event_id", format!("{envelope_id}_{logtime}"))
        .insert("logtime", &logtime);

    if let Some(entries) = raw.get("eventFields").and_then(Value::as_array) {
        for entry in entries {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            row.insert(name.to_ascii_lowercase(), field(entry, "value"));
        }
    }

    // Stricter than the source, which upserts unconditionally: an empty
    // logtime still yields a non-empty event_id ("{envelope_id}_"), but we
    // skip it anyway since the PK would then collide across every event
    // missing a logtime for the same envelope.
    row.has_nonempty(&["envelope_id", "logtime"]).then_some(row)
}

pub fn normalize_notification(raw: &Value, envelope_id: &str) -> Option<Row> {
    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("notification_id", field(raw, "notificationId"))
        .insert("type", field(raw, "notificationType"))
        .insert("scheduled_date", field(raw, "scheduledDate"))
        .insert("sent_date", field(raw, "sentDate"));

    row.has_nonempty(&["envelope_id", "notification_id"])
        .then_some(row)
}

pub fn normalize_document(raw: &Value, envelope_id: &str) -> Option<Row> {
    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("document_id", field(raw, "documentId"))
        .insert("name", field(raw, "name"))
        .insert("type", field(raw, "type"))
        .insert("pages", field_or(raw, "pages", "0"));

    row.has_nonempty(&["envelope_id", "document_id"])
        .then_some(row)
}

/// Normalizes a downloaded document's raw bytes into the `document_content`
/// table shape, base64-encoding the payload verbatim (SPEC_FULL.md §4.5).
pub fn normalize_document_content(
    envelope_id: &str,
    document_id: &str,
    content: &[u8],
) -> Option<Row> {
    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("document_id", document_id)
        .insert(
            "content_base64",
            base64::engine::general_purpose::STANDARD.encode(content),
        );

    row.has_nonempty(&["envelope_id", "document_id"])
        .then_some(row)
}

/// Normalizes one document tab record, flattening its type-specific fields
/// alongside the `tab_type` discriminant (SPEC_FULL.md §4.5, §9).
pub fn normalize_document_tab(raw: &Value, envelope_id: &str, document_id: &str) -> Option<Row> {
    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("document_id", document_id)
        .insert("tab_id", field(raw, "tabId"))
        .insert("tab_type", field(raw, "tab_type"));

    if let Value::Object(map) = raw {
        for (key, value) in map {
            if matches!(key.as_str(), "tabId" | "tab_type") {
                continue;
            }
            row.insert(key.clone(), coerce_to_string(Some(value)));
        }
    }

    row.has_nonempty(&["envelope_id", "document_id", "tab_id"])
        .then_some(row)
}

pub fn normalize_custom_field(raw: &Value, envelope_id: &str) -> Option<Row> {
    let mut row = Row::new();
    row.insert("envelope_id", envelope_id)
        .insert("field_name", field(raw, "name"))
        .insert("value", field(raw, "value"))
        .insert("type", field(raw, "fieldType"));

    row.has_nonempty(&["envelope_id", "field_name"])
        .then_some(row)
}

pub fn normalize_template(raw: &Value) -> Option<Row> {
    let shared = field_or(raw, "shared", "false").to_ascii_lowercase();

    let mut row = Row::new();
    row.insert("template_id", field(raw, "templateId"))
        .insert("name", field(raw, "name"))
        .insert("description", field(raw, "description"))
        .insert("created_date_time", field(raw, "created"))
        .insert("last_modified_date_time", field(raw, "lastModified"))
        .insert("shared", shared);

    row.has_nonempty(&["template_id"]).then_some(row)
}
