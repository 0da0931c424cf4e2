use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::auth::AuthContext;
use crate::error::ConnectorError;
use crate::fetch;
use crate::host::{HostLogger, HostSink};
use crate::http_client::HttpClient;
use crate::normalize;
use crate::row::coerce_to_string;
use crate::state::SyncState;

/// Default fan-out width for [`Orchestrator::run`]: one envelope at a time,
/// matching the sequential baseline in SPEC_FULL.md §5.
const SEQUENTIAL: usize = 1;

/// Drives one complete incremental traversal (C6): lists envelopes since the
/// prior watermark, fans out to the eight child fetchers per envelope,
/// pushes normalized rows to the host sink, fetches templates, and checkpoints
/// (SPEC_FULL.md §4.6).
pub struct Orchestrator {
    http: HttpClient,
    auth: Arc<AuthContext>,
}

impl Orchestrator {
    pub fn new(http: HttpClient, auth: Arc<AuthContext>) -> Self {
        Self { http, auth }
    }

    /// Runs one sync. `sink` receives upserts and the final checkpoint;
    /// `logger` receives the host's three-level structured log stream. Returns
    /// `Err` without calling `checkpoint` on any fatal failure (auth failure
    /// anywhere, per SPEC_FULL.md §4.6/§7).
    ///
    /// Processes envelopes one at a time. See [`Orchestrator::run_with_concurrency`]
    /// for the bounded-worker-pool upgrade path (SPEC_FULL.md §5).
    pub async fn run(
        &self,
        state: &SyncState,
        sink: &dyn HostSink,
        logger: &dyn HostLogger,
    ) -> Result<(), ConnectorError> {
        self.run_with_concurrency(state, sink, logger, SEQUENTIAL)
            .await
    }

    /// Runs one sync fanning out across up to `concurrency` envelopes at a
    /// time via `futures::stream::StreamExt::for_each_concurrent`
    /// (SPEC_FULL.md §5, §9). `concurrency = 1` is the sequential baseline
    /// used by [`Orchestrator::run`].
    ///
    /// The parent envelope row is always emitted before its children within
    /// that envelope's own work unit, and the host sink is driven through
    /// `&dyn HostSink`/`&dyn HostLogger`, so callers must hand in sink/logger
    /// implementations that are safe to call concurrently from multiple
    /// in-flight envelopes (SPEC_FULL.md §5's serialized-sink requirement).
    /// The first fatal error encountered (auth failure) aborts the sync and
    /// is returned without calling `checkpoint`.
    pub async fn run_with_concurrency(
        &self,
        state: &SyncState,
        sink: &dyn HostSink,
        logger: &dyn HostLogger,
        concurrency: usize,
    ) -> Result<(), ConnectorError> {
        self.auth.ensure_token().await?;
        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let api_base = self.auth.config().api_base();

        let envelopes =
            fetch::fetch_envelopes(&self.http, &api_base, &state.last_envelope_sync).await?;
        logger.info(&format!(
            "fetched {} envelopes since {}",
            envelopes.len(),
            state.last_envelope_sync
        ));

        let first_error: Mutex<Option<ConnectorError>> = Mutex::new(None);
        let concurrency = concurrency.max(1);

        stream::iter(envelopes.iter())
            .for_each_concurrent(Some(concurrency), |raw_envelope| {
                let first_error = &first_error;
                let api_base = &api_base;
                async move {
                    if first_error.lock().unwrap().is_some() {
                        return;
                    }
                    if let Err(err) = self
                        .sync_envelope(raw_envelope, api_base, sink, logger)
                        .await
                    {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                }
            })
            .await;

        if let Some(err) = first_error.into_inner().unwrap() {
            return Err(err);
        }

        let templates = fetch::fetch_templates(&self.http, &api_base).await?;
        for raw_template in &templates {
            match normalize::normalize_template(raw_template) {
                Some(row) => sink.upsert("template", row),
                None => logger.warning("skipping template with missing template_id"),
            }
        }

        sink.checkpoint(&SyncState::advanced_to(&now));
        Ok(())
    }

    async fn sync_envelope(
        &self,
        raw_envelope: &serde_json::Value,
        api_base: &str,
        sink: &dyn HostSink,
        logger: &dyn HostLogger,
    ) -> Result<(), ConnectorError> {
        let Some(envelope_row) = normalize::normalize_envelope(raw_envelope) else {
            logger.warning("skipping envelope with missing envelope_id");
            return Ok(());
        };
        let envelope_id = envelope_row
            .get("envelope_id")
            .unwrap_or_default()
            .to_string();
        sink.upsert("envelope", envelope_row);

        let recipients = fetch::fetch_recipients(&self.http, api_base, &envelope_id).await?;
        for raw in &recipients {
            if let Some(row) = normalize::normalize_recipient(raw, &envelope_id) {
                sink.upsert("recipient", row);
            } else {
                logger.warning("skipping recipient with missing recipient_id");
            }
            if let Some(row) = normalize::normalize_enhanced_recipient(raw, &envelope_id) {
                sink.upsert("enhanced_recipient", row);
            }
        }

        let audit_events = fetch::fetch_audit_events(&self.http, api_base, &envelope_id).await?;
        for raw in &audit_events {
            match normalize::normalize_audit_event(raw, &envelope_id) {
                Some(row) => sink.upsert("audit_event", row),
                None => logger.warning("skipping audit event without a logtime field"),
            }
        }

        let notifications = fetch::fetch_notifications(&self.http, api_base, &envelope_id).await?;
        for raw in &notifications {
            match normalize::normalize_notification(raw, &envelope_id) {
                Some(row) => sink.upsert("envelope_notification", row),
                None => logger.warning("skipping notification with missing notification_id"),
            }
        }

        let documents = fetch::fetch_documents(&self.http, api_base, &envelope_id).await?;
        for raw in &documents {
            let Some(document_row) = normalize::normalize_document(raw, &envelope_id) else {
                logger.warning("skipping document with missing document_id");
                continue;
            };
            let document_id = document_row
                .get("document_id")
                .unwrap_or_default()
                .to_string();
            sink.upsert("document", document_row);

            match fetch::fetch_document_content(&self.http, api_base, &envelope_id, &document_id)
                .await
            {
                Some(content) => {
                    if let Some(row) =
                        normalize::normalize_document_content(&envelope_id, &document_id, &content)
                    {
                        sink.upsert("document_content", row);
                    }
                }
                None => logger.warning(&format!(
                    "document content download failed for {envelope_id}/{document_id}"
                )),
            }
        }

        let tabs = fetch::fetch_document_tabs(&self.http, api_base, &envelope_id).await?;
        for raw_tab in &tabs {
            let document_id = coerce_to_string(raw_tab.get("documentId"));
            match normalize::normalize_document_tab(raw_tab, &envelope_id, &document_id) {
                Some(row) => sink.upsert("document_tab", row),
                None => logger.warning("skipping document tab with missing document_id or tab_id"),
            }
        }

        let custom_fields = fetch::fetch_custom_fields(&self.http, api_base, &envelope_id).await?;
        for raw in &custom_fields {
            match normalize::normalize_custom_field(raw, &envelope_id) {
                Some(row) => sink.upsert("custom_field", row),
                None => logger.warning("skipping custom field with missing field_name"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::row::Row;

    struct RecordingSink {
        upserts: Mutex<Vec<(String, Row)>>,
        checkpoints: Mutex<Vec<SyncState>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                upserts: Mutex::new(Vec::new()),
                checkpoints: Mutex::new(Vec::new()),
            }
        }
    }

    impl HostSink for RecordingSink {
        fn upsert(&self, table: &str, row: Row) {
            self.upserts.lock().unwrap().push((table.to_string(), row));
        }

        fn checkpoint(&self, state: &SyncState) {
            self.checkpoints.lock().unwrap().push(state.clone());
        }
    }

    struct SilentLogger;
    impl HostLogger for SilentLogger {
        fn info(&self, _message: &str) {}
        fn warning(&self, _message: &str) {}
        fn severe(&self, _message: &str) {}
    }

    #[test]
    fn recording_sink_tracks_upserts_and_checkpoints() {
        let sink = RecordingSink::new();
        let mut row = Row::new();
        row.insert("envelope_id", "E1");
        sink.upsert("envelope", row);
        sink.checkpoint(&SyncState::advanced_to("2024-01-01T00:00:00Z"));

        assert_eq!(sink.upserts.lock().unwrap().len(), 1);
        assert_eq!(sink.checkpoints.lock().unwrap().len(), 1);
    }

    #[test]
    fn silent_logger_does_not_panic() {
        let logger = SilentLogger;
        logger.info("x");
        logger.warning("y");
        logger.severe("z");
    }
}
