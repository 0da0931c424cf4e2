/// One output table and its primary-key column names, as returned by the
/// host's `schema(config)` call (SPEC_FULL.md §4.7, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub primary_key: &'static [&'static str],
}

/// The ten output tables and their primary keys (SPEC_FULL.md §3).
pub fn schema() -> Vec<TableSchema> {
    vec![
        TableSchema {
            table: "envelope",
            primary_key: &["envelope_id"],
        },
        TableSchema {
            table: "recipient",
            primary_key: &["envelope_id", "recipient_id"],
        },
        TableSchema {
            table: "enhanced_recipient",
            primary_key: &["envelope_id", "recipient_id"],
        },
        TableSchema {
            table: "audit_event",
            primary_key: &["envelope_id", "event_id"],
        },
        TableSchema {
            table: "envelope_notification",
            primary_key: &["envelope_id", "notification_id"],
        },
        TableSchema {
            table: "document",
            primary_key: &["envelope_id", "document_id"],
        },
        TableSchema {
            table: "document_content",
            primary_key: &["envelope_id", "document_id"],
        },
        TableSchema {
            table: "document_tab",
            primary_key: &["envelope_id", "document_id", "tab_id"],
        },
        TableSchema {
            table: "custom_field",
            primary_key: &["envelope_id", "field_name"],
        },
        TableSchema {
            table: "template",
            primary_key: &["template_id"],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_all_ten_tables() {
        assert_eq!(schema().len(), 10);
    }

    #[test]
    fn every_table_has_a_nonempty_primary_key() {
        for table in schema() {
            assert!(!table.primary_key.is_empty(), "{} has no PK", table.table);
        }
    }
}
