use serde_json::{json, Value};

use super::{kinds, opt_i64, row_id, tables, Record, RecordKind, Row, TableRow, EPOCH};
use crate::classify::{classify, Operation};
use crate::value::Lookup;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub author_id: i64,
    pub author: String,
    pub entity_id: i64,
    pub entity_type: String,
    pub time: String,
    pub operation: Operation,
    pub event: String,
    pub target_id: Value,
    pub target_type: String,
    pub target_name: String,
    pub pre_post: String,
    pub last_role: String,
    pub add_info: String,
    pub ip: String,
}

impl AuditRecord {
    pub fn from_event(event: &Value) -> Self {
        Self {
            author_id: event.i64_or("author_id", -1),
            author: event.path_str_or(&["details", "author_name"], ""),
            entity_id: event.i64_or("entity_id", -1),
            entity_type: event.str_or("entity_type", ""),
            time: event.str_or("created_at", EPOCH),
            operation: classify(event, &["event_name"], &["details"]),
            event: event.str_or("event_name", ""),
            target_id: event
                .path(&["details", "target_id"])
                .cloned()
                .unwrap_or_else(|| json!(-1)),
            target_type: event
                .path(&["details", "target_type"])
                .or_else(|| event.field("target_type"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            target_name: event.path_str_or(&["details", "target_details"], ""),
            pre_post: pre_post(event),
            last_role: event.path_str_or(&["details", "as"], ""),
            add_info: event.path_str_or(&["details", "custom_message"], ""),
            ip: event.path_str_or(&["details", "ip_address"], ""),
        }
    }

    // Events about users and about projects or groups land in different
    // warehouse tables. Everything else is file-only.
    fn table_row(&self, id: String) -> Option<TableRow> {
        match self.entity_type.as_str() {
            "User" => {
                let related = |kind: &str| {
                    opt_i64((self.target_type == kind && self.entity_id != -1).then_some(self.entity_id))
                };
                Some(TableRow {
                    table: &tables::USER_OPERATIONS_RECORDS,
                    values: vec![
                        json!(id),
                        json!(self.author_id),
                        match self.operation {
                            Operation::Others => Value::Null,
                            op => json!(op.as_str()),
                        },
                        json!(self.time),
                        related("Project"),
                        related("Group"),
                        json!({
                            "target_type": self.target_type,
                            "target_id": self.target_id,
                            "pre_post": self.pre_post,
                        }),
                        json!({
                            "last_role": self.last_role,
                            "event": self.event,
                            "add_info_": self.add_info,
                            "ip": self.ip,
                        }),
                    ],
                })
            }
            "Project" | "Group" => Some(TableRow {
                table: &tables::PROJECT_GROUP_CHANGES_RECORDS,
                values: vec![
                    json!(id),
                    json!(self.entity_type),
                    json!(self.entity_id),
                    json!(self.operation.as_str()),
                    json!(self.time),
                    json!(self.author_id),
                    json!({
                        "target_type": self.target_type,
                        "target_id": self.target_id,
                        "pre_post": self.pre_post,
                        "last_role": self.last_role,
                    }),
                    json!({
                        "event": self.event,
                        "add_info_": self.add_info,
                        "ip": self.ip,
                    }),
                ],
            }),
            _ => None,
        }
    }
}

/// `"from:to"` for events describing a change, empty otherwise.
fn pre_post(event: &Value) -> String {
    if event.path(&["details", "change"]).is_none() {
        return String::new();
    }
    format!(
        "{}:{}",
        event.path_str_or(&["details", "from"], ""),
        event.path_str_or(&["details", "to"], "")
    )
}

impl Record for AuditRecord {
    const KIND: &'static RecordKind = &kinds::AUDIT_RECORDS;

    fn into_row(self) -> Row {
        let fields = vec![
            json!(self.author_id),
            json!(self.author),
            json!(self.entity_id),
            json!(self.entity_type),
            json!(self.time),
            json!(self.operation.as_str()),
            json!(self.event),
            self.target_id.clone(),
            json!(self.target_type),
            json!(self.target_name),
            json!(self.pre_post),
            json!(self.last_role),
            json!(self.add_info),
            json!(self.ip),
        ];
        let table_row = self.table_row(row_id("audit_event", &fields));

        Row { fields, table_row }
    }
}
