use serde_json::Value;

use crate::error::ConnectorError;
use crate::http_client::HttpClient;

const PAGE_SIZE: u32 = 100;

/// Propagates authentication failures (fatal everywhere per SPEC_FULL.md §4.6)
/// while degrading every other error to an empty list with a logged warning,
/// the "child-fetcher exception" policy from §7.
fn degrade_to_empty(
    result: Result<Vec<Value>, ConnectorError>,
    what: &str,
) -> Result<Vec<Value>, ConnectorError> {
    match result {
        Ok(records) => Ok(records),
        Err(ConnectorError::AuthFailed(reason)) => Err(ConnectorError::AuthFailed(reason)),
        Err(err) => {
            tracing::warn!(error = %err, what, "fetch failed, continuing with empty list");
            Ok(Vec::new())
        }
    }
}

#[derive(serde::Deserialize)]
struct EnvelopesPage {
    #[serde(default)]
    envelopes: Vec<Value>,
}

/// Fetches all envelopes modified since `from_date`, paginated by
/// `start_position` (SPEC_FULL.md §4.4). A non-auth error stops pagination
/// and returns whatever pages were already collected, matching the
/// "envelope-list failure aborts the envelope phase but still allows
/// templates and checkpoint" semantics of §4.6.
pub async fn fetch_envelopes(
    http: &HttpClient,
    api_base: &str,
    from_date: &str,
) -> Result<Vec<Value>, ConnectorError> {
    let url = format!("{api_base}/envelopes");
    let mut all = Vec::new();
    let mut start_position: u32 = 0;

    loop {
        let query = [
            ("from_date", from_date.to_string()),
            ("count", PAGE_SIZE.to_string()),
            ("start_position", start_position.to_string()),
        ];

        let page = match http.get_json::<EnvelopesPage>(&url, &query).await {
            Ok(page) => page,
            Err(ConnectorError::AuthFailed(reason)) => {
                return Err(ConnectorError::AuthFailed(reason));
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch envelopes, stopping pagination");
                break;
            }
        };

        let count = page.envelopes.len() as u32;
        if count == 0 {
            break;
        }
        all.extend(page.envelopes);
        start_position += count;
        if count < PAGE_SIZE {
            break;
        }
    }

    tracing::info!(count = all.len(), "fetched envelopes");
    Ok(all)
}

const RECIPIENT_ARRAYS: [&str; 4] = [
    "signers",
    "carbon_copies",
    "certified_deliveries",
    "in_person_signers",
];

/// Fetches the recipients for one envelope, unioning the four role arrays
/// and tagging each record with `recipient_type`. Used to derive both the
/// `recipient` and `enhanced_recipient` tables (SPEC_FULL.md §4.4).
pub async fn fetch_recipients(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
) -> Result<Vec<Value>, ConnectorError> {
    let url = format!("{api_base}/envelopes/{envelope_id}/recipients");
    let result = http.get_json::<Value>(&url, &[]).await.map(|body| {
        RECIPIENT_ARRAYS
            .iter()
            .flat_map(|recipient_type| {
                body.get(*recipient_type)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |mut record| {
                        tag(&mut record, "recipient_type", recipient_type);
                        record
                    })
            })
            .collect::<Vec<_>>()
    });
    degrade_to_empty(result, "recipients")
}

/// Fetches audit events for one envelope (SPEC_FULL.md §4.4).
pub async fn fetch_audit_events(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
) -> Result<Vec<Value>, ConnectorError> {
    #[derive(serde::Deserialize)]
    struct AuditEvents {
        #[serde(default, rename = "auditEvents")]
        audit_events: Vec<Value>,
    }
    let url = format!("{api_base}/envelopes/{envelope_id}/audit_events");
    let result = http
        .get_json::<AuditEvents>(&url, &[])
        .await
        .map(|body| body.audit_events);
    degrade_to_empty(result, "audit_events")
}

/// Fetches envelope notifications (SPEC_FULL.md §4.4).
pub async fn fetch_notifications(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
) -> Result<Vec<Value>, ConnectorError> {
    #[derive(serde::Deserialize)]
    struct Notifications {
        #[serde(default)]
        notifications: Vec<Value>,
    }
    let url = format!("{api_base}/envelopes/{envelope_id}/notification");
    let result = http
        .get_json::<Notifications>(&url, &[])
        .await
        .map(|body| body.notifications);
    degrade_to_empty(result, "notifications")
}

/// Fetches the document list for one envelope (SPEC_FULL.md §4.4).
pub async fn fetch_documents(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
) -> Result<Vec<Value>, ConnectorError> {
    #[derive(serde::Deserialize)]
    struct Documents {
        #[serde(default, rename = "envelopeDocuments")]
        envelope_documents: Vec<Value>,
    }
    let url = format!("{api_base}/envelopes/{envelope_id}/documents");
    let result = http
        .get_json::<Documents>(&url, &[])
        .await
        .map(|body| body.envelope_documents);
    degrade_to_empty(result, "documents")
}

/// Downloads the binary content of one document using the non-retrying
/// binary variant (SPEC_FULL.md §4.3, §4.4).
pub async fn fetch_document_content(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
    document_id: &str,
) -> Option<Vec<u8>> {
    let url = format!("{api_base}/envelopes/{envelope_id}/documents/{document_id}");
    http.get_binary(&url).await
}

/// Fetches document tabs for one envelope, unioning every tab-type array
/// in the response and tagging each record with `tab_type` (SPEC_FULL.md §4.4).
pub async fn fetch_document_tabs(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
) -> Result<Vec<Value>, ConnectorError> {
    let url = format!("{api_base}/envelopes/{envelope_id}/tabs");
    let result = http.get_json::<Value>(&url, &[]).await.map(|body| {
        let Value::Object(map) = body else {
            return Vec::new();
        };
        map.into_iter()
            .filter_map(|(tab_type, value)| value.as_array().cloned().map(|arr| (tab_type, arr)))
            .flat_map(|(tab_type, records)| {
                records.into_iter().map(move |mut record| {
                    tag(&mut record, "tab_type", &tab_type);
                    record
                })
            })
            .collect::<Vec<_>>()
    });
    degrade_to_empty(result, "document_tabs")
}

/// Fetches custom fields for one envelope, concatenating the text and list
/// variants (SPEC_FULL.md §4.4).
pub async fn fetch_custom_fields(
    http: &HttpClient,
    api_base: &str,
    envelope_id: &str,
) -> Result<Vec<Value>, ConnectorError> {
    #[derive(serde::Deserialize)]
    struct CustomFields {
        #[serde(default, rename = "textCustomFields")]
        text_custom_fields: Vec<Value>,
        #[serde(default, rename = "listCustomFields")]
        list_custom_fields: Vec<Value>,
    }
    let url = format!("{api_base}/envelopes/{envelope_id}/custom_fields");
    let result = http
        .get_json::<CustomFields>(&url, &[])
        .await
        .map(|mut body| {
            body.text_custom_fields.append(&mut body.list_custom_fields);
            body.text_custom_fields
        });
    degrade_to_empty(result, "custom_fields")
}

/// Fetches all templates, paginated identically to the envelope list
/// (SPEC_FULL.md §4.4). Ignores `last_template_sync` for filtering — see the
/// Open Questions decision in SPEC_FULL.md §9.
pub async fn fetch_templates(
    http: &HttpClient,
    api_base: &str,
) -> Result<Vec<Value>, ConnectorError> {
    #[derive(serde::Deserialize)]
    struct TemplatesPage {
        #[serde(default, rename = "envelopeTemplates")]
        envelope_templates: Vec<Value>,
    }
    let url = format!("{api_base}/templates");
    let mut all = Vec::new();
    let mut start_position: u32 = 0;

    loop {
        let query = [
            ("count", PAGE_SIZE.to_string()),
            ("start_position", start_position.to_string()),
        ];

        let page = match http.get_json::<TemplatesPage>(&url, &query).await {
            Ok(page) => page,
            Err(ConnectorError::AuthFailed(reason)) => {
                return Err(ConnectorError::AuthFailed(reason));
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch templates, stopping pagination");
                break;
            }
        };

        let count = page.envelope_templates.len() as u32;
        if count == 0 {
            break;
        }
        all.extend(page.envelope_templates);
        start_position += count;
        if count < PAGE_SIZE {
            break;
        }
    }

    Ok(all)
}

fn tag(record: &mut Value, key: &str, value: &str) {
    if let Value::Object(map) = record {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_adds_discriminant_field_to_object() {
        let mut record = json!({"recipientId": "R1"});
        tag(&mut record, "recipient_type", "signers");
        assert_eq!(record["recipient_type"], "signers");
    }
}
