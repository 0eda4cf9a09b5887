use serde::Serialize;
use serde_json::{json, Value};

use super::{entity_id, kinds, tables, Record, RecordKind, Row, TableRow};
use crate::value::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Opened,
    Approved,
    Merged,
    Closed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Opened => "opened",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Merged => "merged",
            ReviewStatus::Closed => "closed",
        }
    }
}

// Timestamp field of a merge request that marks each status, in emit order.
const STATUS_FIELDS: [(&str, ReviewStatus); 4] = [
    ("created_at", ReviewStatus::Opened),
    ("updated_at", ReviewStatus::Approved),
    ("merged_at", ReviewStatus::Merged),
    ("closed_at", ReviewStatus::Closed),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub commenter: String,
    pub content: String,
    pub time: String,
}

impl Comment {
    pub fn from_note(note: &Value) -> Self {
        Self {
            commenter: note.path_str_or(&["author", "username"], ""),
            content: note.str_or("body", ""),
            time: note.str_or("created_at", ""),
        }
    }
}

/// One status transition of a merge request.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequestReview {
    pub audit_id: String,
    pub author_id: i64,
    pub author: String,
    pub mr_title: String,
    pub mr_description: String,
    pub assignee_id: i64,
    pub assignee: String,
    pub reviewers_ids: Vec<i64>,
    pub reviewers: String,
    pub time: String,
    pub project_id: i64,
    pub source_branch: String,
    pub target_branch: String,
    pub mr_id: i64,
    pub approval_status: ReviewStatus,
    pub comments: Vec<Comment>,
}

impl MergeRequestReview {
    /// One record per populated status timestamp, in the order opened,
    /// approved, merged, closed. All of them share one audit id.
    pub fn fan_out(project_id: i64, mr: &Value) -> Vec<Self> {
        let mr_id = mr.i64_or("iid", -1);
        let reviewers: Vec<&Value> = mr
            .field("reviewers")
            .and_then(Value::as_array)
            .map(|r| r.iter().collect())
            .unwrap_or_default();

        let base = Self {
            audit_id: entity_id("merge_request", &format!("{project_id}:{mr_id}")),
            author_id: mr.path_i64_or(&["author", "id"], -1),
            author: mr.path_str_or(&["author", "username"], ""),
            mr_title: mr.str_or("title", ""),
            mr_description: mr.str_or("description", ""),
            assignee_id: mr.path_i64_or(&["assignee", "id"], -1),
            assignee: mr.path_str_or(&["assignee", "username"], ""),
            reviewers_ids: reviewers.iter().filter_map(|r| r.opt_i64("id")).collect(),
            reviewers: reviewers
                .iter()
                .filter_map(|r| r.opt_str("username"))
                .collect::<Vec<_>>()
                .join(", "),
            time: String::new(),
            project_id,
            source_branch: mr.str_or("source_branch", ""),
            target_branch: mr.str_or("target_branch", ""),
            mr_id,
            approval_status: ReviewStatus::Opened,
            comments: Vec::new(),
        };

        STATUS_FIELDS
            .iter()
            .filter_map(|(field, status)| {
                let time = mr.opt_str(field)?;
                Some(Self {
                    time,
                    approval_status: *status,
                    ..base.clone()
                })
            })
            .collect()
    }
}

/// Attach a merge request's comments to the last record emitted for it.
/// With no records for the merge request the comments are dropped.
pub fn attach_comments(records: &mut [MergeRequestReview], comments: Vec<Comment>) {
    if let Some(last) = records.last_mut() {
        last.comments.extend(comments);
    }
}

impl Record for MergeRequestReview {
    const KIND: &'static RecordKind = &kinds::MR_REVIEWS;

    fn into_row(self) -> Row {
        let comments = json!(self.comments);
        let fields = vec![
            json!(self.author_id),
            json!(self.author),
            json!(self.mr_title),
            json!(self.mr_description),
            json!(self.assignee_id),
            json!(self.assignee),
            json!(self.reviewers_ids),
            json!(self.reviewers),
            json!(self.time),
            json!(self.project_id),
            json!(self.source_branch),
            json!(self.target_branch),
            json!(self.mr_id),
            json!(self.approval_status.as_str()),
            comments.clone(),
        ];

        let table_row = TableRow {
            table: &tables::AUDIT_RECORDS_INFO,
            values: vec![
                json!(self.audit_id),
                json!(self.mr_id),
                json!("Merge Request"),
                json!(self.reviewers_ids),
                json!(self.time),
                json!(self.approval_status.as_str()),
                comments,
                json!(self.project_id),
                json!({
                    "author_id": self.author_id,
                    "assignee_id": self.assignee_id,
                    "mr_title": self.mr_title,
                    "mr_description": self.mr_description,
                    "source_branch": self.source_branch,
                    "target_branch": self.target_branch,
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

    fn merge_request() -> Value {
        json!({
            "iid": 12,
            "title": "Add pipeline cache",
            "author": {"id": 4, "username": "ana"},
            "reviewers": [{"id": 7, "username": "bo"}, {"id": 8, "username": "cy"}],
            "source_branch": "cache",
            "target_branch": "main",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "merged_at": "2024-01-03T00:00:00Z",
            "closed_at": "2024-01-04T00:00:00Z",
        })
    }

    #[test]
    fn test_all_timestamps_fan_out_to_four_records() {
        let records = MergeRequestReview::fan_out(3, &merge_request());
        let statuses: Vec<_> = records.iter().map(|r| r.approval_status).collect();
        assert_eq!(
            statuses,
            vec![
                ReviewStatus::Opened,
                ReviewStatus::Approved,
                ReviewStatus::Merged,
                ReviewStatus::Closed
            ]
        );
        assert_eq!(records[2].time, "2024-01-03T00:00:00Z");
        assert!(records.iter().all(|r| r.audit_id == records[0].audit_id));
        assert_eq!(records[0].reviewers, "bo, cy");
        assert_eq!(records[0].reviewers_ids, vec![7, 8]);
        assert_eq!(records[0].assignee_id, -1);
    }

    #[test]
    fn test_only_created_yields_one_record() {
        let mr = json!({"iid": 1, "created_at": "2024-01-01T00:00:00Z", "merged_at": null, "closed_at": ""});
        let records = MergeRequestReview::fan_out(3, &mr);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].approval_status, ReviewStatus::Opened);
    }

    #[test]
    fn test_comments_go_to_last_record() {
        let mut records = MergeRequestReview::fan_out(3, &merge_request());
        let note = json!({"author": {"username": "bo"}, "body": "LGTM", "created_at": "2024-01-02T10:00:00Z"});
        attach_comments(&mut records, vec![Comment::from_note(&note)]);

        assert!(records[..3].iter().all(|r| r.comments.is_empty()));
        assert_eq!(records[3].comments.len(), 1);
        assert_eq!(records[3].comments[0].content, "LGTM");

        let mut none: Vec<MergeRequestReview> = Vec::new();
        attach_comments(&mut none, vec![Comment::from_note(&note)]);
        assert!(none.is_empty());
    }

    #[test]
    fn test_rows_are_idempotent() {
        let rows = |mr: &Value| -> Vec<Row> {
            MergeRequestReview::fan_out(3, mr)
                .into_iter()
                .map(Record::into_row)
                .collect()
        };
        assert_eq!(rows(&merge_request()), rows(&merge_request()));
    }

    #[test]
    fn test_warehouse_row() {
        let row = MergeRequestReview::fan_out(3, &merge_request())
            .remove(0)
            .into_row();
        let table_row = row.table_row.unwrap();
        assert_eq!(table_row.table.name, "fact_audit_records_info");
        assert_eq!(table_row.values[1], json!(12));
        assert_eq!(table_row.values[2], json!("Merge Request"));
        assert_eq!(table_row.values[5], json!("opened"));
        assert_eq!(table_row.values[8]["mr_title"], json!("Add pipeline cache"));
    }
}
