use serde_json::{json, Value};

use super::{kinds, row_id, tables, Record, RecordKind, Row, TableRow};
use crate::diff::{ChangeType, DiffResult};
use crate::value::Lookup;

/// A change to the tracked CI configuration file within one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub change_type: ChangeType,
    pub change_content: String,
    pub time: String,
    pub author: String,
    pub project_id: i64,
    pub message: String,
    pub commit_sha: String,
}

impl ConfigChange {
    /// `None` when the file content didn't actually change.
    pub fn from_commit(project_id: i64, commit: &Value, diff: DiffResult) -> Option<Self> {
        if diff.change_type == ChangeType::Unchanged {
            return None;
        }
        Some(Self {
            change_type: diff.change_type,
            change_content: diff.diff_text,
            time: commit.str_or("committed_date", ""),
            author: commit.str_or("author_name", ""),
            project_id,
            message: commit.str_or("message", ""),
            commit_sha: commit.str_or("id", ""),
        })
    }
}

impl Record for ConfigChange {
    const KIND: &'static RecordKind = &kinds::CICD_CHANGES;

    fn into_row(self) -> Row {
        let fields = vec![
            json!(self.change_type.as_str()),
            json!(self.change_content),
            json!(self.time),
            json!(self.author),
            json!(self.project_id),
            json!(self.message),
            json!(self.commit_sha),
        ];

        let table_row = TableRow {
            table: &tables::CONFIG_CHANGES_RECORDS,
            values: vec![
                json!(row_id("config_change", &fields)),
                json!(self.change_type.as_str()),
                json!(self.change_content),
                json!(self.time),
                json!(self.project_id),
                json!({
                    "author_name": self.author,
                    "message": self.message,
                    "commit_sha": self.commit_sha,
                }),
            ],
        };

        Row {
            fields,
            table_row: Some(table_row),
        }
    }
}
