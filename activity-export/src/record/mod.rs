//! Flat records normalized from raw API payloads.
//!
//! Every entity produces a [`Row`]: the file fields in the column order of
//! its [`RecordKind`], plus at most one warehouse row for the [`Table`] it
//! maps to. Normalizers are pure functions of their input, including the
//! generated row ids.

use serde_json::Value;
use uuid::Uuid;

pub mod audit;
pub mod code_change;
pub mod config_change;
pub mod dimension;
pub mod job;
pub mod review;
pub mod system;

pub use audit::AuditRecord;
pub use code_change::CodeChange;
pub use config_change::ConfigChange;
pub use dimension::{GroupDim, ProjectDim, UserDim};
pub use job::PipelineJob;
pub use review::{Comment, MergeRequestReview};
pub use system::{SystemChange, SystemEntity};

/// Timestamp used when an event carries none.
pub const EPOCH: &str = "1970-01-01T00:00:00Z";

// Namespace for row ids, so the same record always gets the same id.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_0c3e_52d4_4b8e_9a7f_21c5_d0e3_b4a9);

/// A file output: name, column order and the column rows are sorted by.
#[derive(Debug, PartialEq, Eq)]
pub struct RecordKind {
    pub file_name: &'static str,
    pub columns: &'static [&'static str],
    pub sort_key: &'static str,
}

impl RecordKind {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }
}

/// A warehouse destination table and its fixed column order.
#[derive(Debug, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub table: &'static Table,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub fields: Vec<Value>,
    pub table_row: Option<TableRow>,
}

pub trait Record {
    const KIND: &'static RecordKind;

    fn into_row(self) -> Row;
}

/// Deterministic id for a row, derived from its content.
pub fn row_id(scope: &str, fields: &[Value]) -> String {
    let content = format!("{scope}:{}", Value::Array(fields.to_vec()));
    Uuid::new_v5(&ID_NAMESPACE, content.as_bytes()).to_string()
}

/// Deterministic id shared by every row derived from the same entity.
pub fn entity_id(scope: &str, key: &str) -> String {
    Uuid::new_v5(&ID_NAMESPACE, format!("{scope}:{key}").as_bytes()).to_string()
}

pub fn opt_i64(value: Option<i64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

pub mod kinds {
    use super::RecordKind;

    pub const CODE_CHANGES: RecordKind = RecordKind {
        file_name: "code_changes.csv",
        columns: &[
            "operation",
            "time",
            "author_id",
            "author",
            "email",
            "message",
            "sha",
            "project_id",
            "mr_state",
        ],
        sort_key: "time",
    };

    pub const MR_REVIEWS: RecordKind = RecordKind {
        file_name: "mr_reviews.csv",
        columns: &[
            "author_id",
            "author",
            "mr_title",
            "mr_description",
            "assignee_id",
            "assignee",
            "reviewers_ids",
            "reviewers",
            "time",
            "project_id",
            "source_branch",
            "target_branch",
            "mr_id",
            "approval_status",
            "comments",
        ],
        sort_key: "time",
    };

    pub const CICD_PIPELINES: RecordKind = RecordKind {
        file_name: "cicd_pipelines.csv",
        columns: &[
            "project_id",
            "branch",
            "pipeline_id",
            "stage",
            "job_name",
            "job_status",
            "time",
            "end_time",
            "duration",
            "triggered_by",
            "environment",
            "commit_sha",
        ],
        sort_key: "time",
    };

    pub const CICD_CHANGES: RecordKind = RecordKind {
        file_name: "cicd_changes.csv",
        columns: &[
            "change_type",
            "change_content",
            "time",
            "author",
            "project_id",
            "message",
            "commit_sha",
        ],
        sort_key: "time",
    };

    pub const AUDIT_RECORDS: RecordKind = RecordKind {
        file_name: "audit_records.csv",
        columns: &[
            "author_id",
            "author",
            "entity_id",
            "entity_type",
            "time",
            "operation",
            "event",
            "target_id",
            "target_type",
            "target_name",
            "pre_post",
            "last_role",
            "add_info_",
            "ip",
        ],
        sort_key: "time",
    };

    pub const SYSTEM_CHANGES: RecordKind = RecordKind {
        file_name: "all_system_changes.csv",
        columns: &[
            "event_id",
            "event",
            "entity_type",
            "time",
            "entity_name",
            "entity_description",
            "entity_details",
            "hook_events",
            "flag_state",
        ],
        sort_key: "time",
    };

    pub const DIM_USERS: RecordKind = RecordKind {
        file_name: "dim_users.csv",
        columns: &[
            "id",
            "username",
            "nickname",
            "email",
            "state",
            "is_admin",
            "created_at",
            "last_sign_in_at",
            "last_activity_on",
        ],
        sort_key: "id",
    };

    pub const DIM_PROJECTS: RecordKind = RecordKind {
        file_name: "dim_projects.csv",
        columns: &["id", "name", "description", "tag_list", "metadata"],
        sort_key: "id",
    };

    pub const DIM_GROUPS: RecordKind = RecordKind {
        file_name: "dim_groups.csv",
        columns: &[
            "id",
            "name",
            "description",
            "members",
            "visibility",
            "created_at",
            "path",
        ],
        sort_key: "id",
    };
}

pub mod tables {
    use super::Table;

    pub const DIM_USERS_INFO: Table = Table {
        name: "dim_users_info",
        columns: &[
            "user_id",
            "user_name",
            "nickname",
            "email",
            "user_status",
            "user_tags",
            "user_attributes",
        ],
    };

    pub const DIM_PROJECTS_INFO: Table = Table {
        name: "dim_projects_info",
        columns: &[
            "project_id",
            "project_name",
            "project_desc",
            "project_tags",
            "project_metadata",
        ],
    };

    pub const DIM_GROUPS_INFO: Table = Table {
        name: "dim_groups_info",
        columns: &[
            "group_id",
            "group_name",
            "group_desc",
            "group_members",
            "group_attributes",
        ],
    };

    pub const CODE_CHANGES_RECORDS: Table = Table {
        name: "fact_code_changes_records",
        columns: &[
            "code_change_id",
            "operation_type",
            "author_id",
            "time_stamp",
            "content",
            "project_id",
            "hash_value",
            "code_change_metadata",
        ],
    };

    pub const AUDIT_RECORDS_INFO: Table = Table {
        name: "fact_audit_records_info",
        columns: &[
            "audit_id",
            "related_object_id",
            "object_type",
            "reviewers_ids",
            "audit_time",
            "audit_result",
            "comment",
            "project_id",
            "audit_metadata",
        ],
    };

    pub const PIPELINE_ACTIVITIES_RECORDS: Table = Table {
        name: "fact_cicd_pipeline_activities_records",
        columns: &[
            "activity_id",
            "pipeline_id",
            "stage_name",
            "job_name",
            "start_time",
            "end_time",
            "job_status",
            "project_id",
            "job_metadata",
        ],
    };

    pub const CONFIG_CHANGES_RECORDS: Table = Table {
        name: "fact_cicd_config_changes_records",
        columns: &[
            "config_change_id",
            "change_type",
            "change_detail",
            "change_time",
            "project_id",
            "config_metadata",
        ],
    };

    pub const USER_OPERATIONS_RECORDS: Table = Table {
        name: "fact_user_operations_records",
        columns: &[
            "operation_id",
            "user_id",
            "operation_type",
            "operation_time",
            "related_project_id",
            "related_group_id",
            "operation_details",
            "operation_metadata",
        ],
    };

    pub const PROJECT_GROUP_CHANGES_RECORDS: Table = Table {
        name: "fact_project_group_changes_records",
        columns: &[
            "change_id",
            "object_type",
            "object_id",
            "change_type",
            "change_time",
            "operator_id",
            "change_details",
            "change_metadata",
        ],
    };

    pub const SYSTEM_CONFIG_CHANGES_RECORDS: Table = Table {
        name: "fact_system_config_changes_records",
        columns: &[
            "config_change_id",
            "change_object",
            "change_type",
            "change_detail",
            "change_time",
        ],
    };
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_row_id_is_stable_and_content_sensitive() {
        let a = row_id("code_change", &[json!("push"), json!(1)]);
        assert_eq!(a, row_id("code_change", &[json!("push"), json!(1)]));
        assert_ne!(a, row_id("code_change", &[json!("push"), json!(2)]));
        assert_ne!(a, row_id("pipeline_job", &[json!("push"), json!(1)]));
    }

    #[test]
    fn test_column_index() {
        assert_eq!(kinds::CODE_CHANGES.column_index("time"), Some(1));
        assert_eq!(kinds::DIM_USERS.column_index("id"), Some(0));
        assert_eq!(kinds::DIM_USERS.column_index("missing"), None);
    }
}
