use serde_json::{json, Map, Value};

use super::{kinds, tables, Record, RecordKind, Row, TableRow};
use crate::value::{parse_embedded_json, Lookup};

#[derive(Debug, Clone, PartialEq)]
pub struct UserDim {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub email: String,
    pub state: String,
    pub is_admin: bool,
    pub created_at: String,
    pub last_sign_in_at: String,
    pub last_activity_on: String,
}

impl UserDim {
    pub fn new(user: &Value) -> Self {
        Self {
            id: user.i64_or("id", -1),
            username: user.str_or("username", ""),
            nickname: user.str_or("name", ""),
            email: user.str_or("email", ""),
            state: user.str_or("state", ""),
            is_admin: user.flag("is_admin"),
            created_at: user.str_or("created_at", ""),
            last_sign_in_at: user
                .opt_str("last_sign_in_at")
                .unwrap_or_else(|| user.str_or("current_sign_in_at", "")),
            last_activity_on: user.str_or("last_activity_on", ""),
        }
    }
}

impl Record for UserDim {
    const KIND: &'static RecordKind = &kinds::DIM_USERS;

    fn into_row(self) -> Row {
        let tag = if self.is_admin { "Admin" } else { "User" };
        let table_row = TableRow {
            table: &tables::DIM_USERS_INFO,
            values: vec![
                json!(self.id),
                json!(self.username),
                json!(self.nickname),
                json!(self.email),
                json!(self.state),
                json!([tag]),
                json!({
                    "create_time": self.created_at,
                    "latest_login_time": self.last_sign_in_at,
                    "last_activity_date": self.last_activity_on,
                }),
            ],
        };

        Row {
            fields: vec![
                json!(self.id),
                json!(self.username),
                json!(self.nickname),
                json!(self.email),
                json!(self.state),
                json!(self.is_admin),
                json!(self.created_at),
                json!(self.last_sign_in_at),
                json!(self.last_activity_on),
            ],
            table_row: Some(table_row),
        }
    }
}

const PROMOTED_PROJECT_FIELDS: [&str; 4] = ["id", "name", "description", "tag_list"];

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDim {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tag_list: Value,
    pub metadata: Map<String, Value>,
}

impl ProjectDim {
    /// Projects carrying an embedded `metadata` string keep what it parses
    /// to. Otherwise the metadata is every field not promoted to a column.
    pub fn new(project: &Value) -> Self {
        let metadata = match project.field("metadata") {
            Some(Value::String(raw)) => parse_embedded_json(raw),
            Some(Value::Object(map)) => map.clone(),
            _ => project
                .as_object()
                .map(|map| {
                    map.iter()
                        .filter(|(key, _)| !PROMOTED_PROJECT_FIELDS.contains(&key.as_str()))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        };

        Self {
            id: project.i64_or("id", -1),
            name: project.str_or("name", ""),
            description: project.str_or("description", ""),
            tag_list: project
                .field("tag_list")
                .or_else(|| project.field("topics"))
                .cloned()
                .unwrap_or_else(|| json!([])),
            metadata,
        }
    }
}

impl Record for ProjectDim {
    const KIND: &'static RecordKind = &kinds::DIM_PROJECTS;

    fn into_row(self) -> Row {
        let fields = vec![
            json!(self.id),
            json!(self.name),
            json!(self.description),
            self.tag_list,
            Value::Object(self.metadata),
        ];
        let table_row = TableRow {
            table: &tables::DIM_PROJECTS_INFO,
            values: fields.clone(),
        };

        Row {
            fields,
            table_row: Some(table_row),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDim {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub members: Vec<i64>,
    pub visibility: String,
    pub created_at: String,
    pub path: String,
}

impl GroupDim {
    pub fn new(group: &Value, members: &[Value]) -> Self {
        Self {
            id: group.i64_or("id", -1),
            name: group.str_or("name", ""),
            description: group.str_or("description", ""),
            members: members
                .iter()
                .filter_map(|m| m.opt_i64("id"))
                .filter(|id| *id != 0)
                .collect(),
            visibility: group.str_or("visibility", ""),
            created_at: group.str_or("created_at", ""),
            path: group.str_or("path", ""),
        }
    }
}

impl Record for GroupDim {
    const KIND: &'static RecordKind = &kinds::DIM_GROUPS;

    fn into_row(self) -> Row {
        let table_row = TableRow {
            table: &tables::DIM_GROUPS_INFO,
            values: vec![
                json!(self.id),
                json!(self.name),
                json!(self.description),
                json!(self.members),
                json!({
                    "visibility": self.visibility,
                    "create_time": self.created_at,
                    "path": self.path,
                }),
            ],
        };

        Row {
            fields: vec![
                json!(self.id),
                json!(self.name),
                json!(self.description),
                json!(self.members),
                json!(self.visibility),
                json!(self.created_at),
                json!(self.path),
            ],
            table_row: Some(table_row),
        }
    }
}
