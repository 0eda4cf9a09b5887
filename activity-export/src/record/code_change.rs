use serde_json::{json, Value};

use super::{kinds, opt_i64, row_id, tables, Record, RecordKind, Row, TableRow};
use crate::value::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOperation {
    Commit,
    MergeRequest,
    Push,
}

impl CodeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeOperation::Commit => "commit",
            CodeOperation::MergeRequest => "merge_request",
            CodeOperation::Push => "push",
        }
    }
}

/// A commit, merge request or push, flattened into one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChange {
    pub operation: CodeOperation,
    pub time: String,
    pub author_id: Option<i64>,
    pub author: String,
    pub email: String,
    pub message: String,
    pub sha: String,
    pub project_id: i64,
    pub mr_state: String,
}

impl CodeChange {
    pub fn from_commit(project_id: i64, commit: &Value) -> Self {
        Self {
            operation: CodeOperation::Commit,
            time: commit.str_or("committed_date", ""),
            author_id: None,
            author: commit.str_or("author_name", ""),
            email: commit.str_or("author_email", ""),
            message: commit.str_or("message", ""),
            sha: commit.str_or("id", ""),
            project_id,
            mr_state: String::new(),
        }
    }

    pub fn from_merge_request(project_id: i64, mr: &Value) -> Self {
        Self {
            operation: CodeOperation::MergeRequest,
            time: mr.str_or("updated_at", ""),
            author_id: Some(mr.path_i64_or(&["author", "id"], -1)),
            author: mr.path_str_or(&["author", "username"], ""),
            email: String::new(),
            message: mr.str_or("title", ""),
            sha: String::new(),
            project_id,
            mr_state: mr.str_or("state", ""),
        }
    }

    pub fn from_push_event(project_id: i64, event: &Value) -> Self {
        let from = event.path_str_or(&["push_data", "commit_from"], "");
        Self {
            operation: CodeOperation::Push,
            time: event.str_or("created_at", ""),
            author_id: event.opt_i64("author_id"),
            author: event.path_str_or(&["author", "username"], ""),
            email: String::new(),
            message: format!("commit from:{from}"),
            sha: event.path_str_or(&["push_data", "commit_to"], ""),
            project_id,
            mr_state: String::new(),
        }
    }
}

impl Record for CodeChange {
    const KIND: &'static RecordKind = &kinds::CODE_CHANGES;

    fn into_row(self) -> Row {
        let fields = vec![
            json!(self.operation.as_str()),
            json!(self.time),
            opt_i64(self.author_id),
            json!(self.author),
            json!(self.email),
            json!(self.message),
            json!(self.sha),
            json!(self.project_id),
            json!(self.mr_state),
        ];

        let table_row = TableRow {
            table: &tables::CODE_CHANGES_RECORDS,
            values: vec![
                json!(row_id("code_change", &fields)),
                json!(self.operation.as_str()),
                opt_i64(self.author_id),
                json!(self.time),
                json!(self.message),
                json!(self.project_id),
                json!(self.sha),
                json!({
                    "author": self.author,
                    "email": self.email,
                    "mr_state": self.mr_state,
                }),
            ],
        };

        Row {
            fields,
            table_row: Some(table_row),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_commit_fields() {
        let commit = json!({
            "id": "abc123",
            "committed_date": "2024-01-02T03:04:05Z",
            "author_name": "Ana",
            "author_email": "ana@example.com",
            "message": "Fix build\n",
        });
        let row = CodeChange::from_commit(5, &commit).into_row();

        assert_eq!(
            row.fields,
            vec![
                json!("commit"),
                json!("2024-01-02T03:04:05Z"),
                Value::Null,
                json!("Ana"),
                json!("ana@example.com"),
                json!("Fix build\n"),
                json!("abc123"),
                json!(5),
                json!(""),
            ]
        );
        let table_row = row.table_row.unwrap();
        assert_eq!(table_row.table.name, "fact_code_changes_records");
        assert_eq!(table_row.values[7], json!({"author": "Ana", "email": "ana@example.com", "mr_state": ""}));
    }

    #[test]
    fn test_merge_request_defaults() {
        let row = CodeChange::from_merge_request(9, &json!({"title": "WIP"})).into_row();
        assert_eq!(row.fields[0], json!("merge_request"));
        assert_eq!(row.fields[1], json!(""));
        assert_eq!(row.fields[2], json!(-1));
        assert_eq!(row.fields[5], json!("WIP"));
    }

    #[test]
    fn test_push_event() {
        let event = json!({
            "author_id": 3,
            "created_at": "2024-05-01T00:00:00Z",
            "author": {"username": "bo"},
            "push_data": {"commit_from": "aaa", "commit_to": "bbb"},
        });
        let change = CodeChange::from_push_event(1, &event);
        assert_eq!(change.message, "commit from:aaa");
        assert_eq!(change.sha, "bbb");
        assert_eq!(change.author_id, Some(3));
    }

    #[test]
    fn test_normalizing_twice_is_identical() {
        let commit = json!({"id": "abc", "committed_date": "2024-01-01T00:00:00Z", "message": "m"});
        assert_eq!(
            CodeChange::from_commit(1, &commit).into_row(),
            CodeChange::from_commit(1, &commit).into_row()
        );
    }
}
