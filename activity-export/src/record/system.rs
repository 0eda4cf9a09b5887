use serde_json::{json, Value};

use super::{kinds, row_id, tables, Record, RecordKind, Row, TableRow, EPOCH};
use crate::value::{truthy, Lookup};

/// Instance-level configuration objects tracked as system changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEntity {
    ApplicationSetting,
    SystemHook,
    FeatureFlag,
}

impl SystemEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEntity::ApplicationSetting => "ApplicationSetting",
            SystemEntity::SystemHook => "SystemHook",
            SystemEntity::FeatureFlag => "FeatureFlag",
        }
    }

    /// The change recorded for this kind of object. The API only exposes
    /// current state, so hooks are taken as created and the rest as updated.
    pub fn event(&self) -> &'static str {
        match self {
            SystemEntity::SystemHook => "create",
            SystemEntity::ApplicationSetting | SystemEntity::FeatureFlag => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemChange {
    pub event_id: i64,
    pub entity: SystemEntity,
    pub time: String,
    pub entity_name: String,
    pub entity_description: String,
    pub entity_details: String,
    pub hook_events: String,
    pub flag_state: String,
}

impl SystemChange {
    pub fn new(entity: SystemEntity, record: &Value) -> Self {
        let event_id = record
            .opt_i64("id")
            .filter(|id| *id != 0)
            .or_else(|| {
                record
                    .field("strategies")
                    .and_then(|s| s.get(0))
                    .and_then(|s| s.opt_i64("id"))
            })
            .unwrap_or(-1);

        let hook_events = record
            .as_object()
            .map(|map| {
                let mut enabled: Vec<&str> = map
                    .iter()
                    .filter(|(key, value)| key.ends_with("_events") && truthy(value))
                    .map(|(key, _)| key.as_str())
                    .collect();
                enabled.sort_unstable();
                enabled.join(", ")
            })
            .unwrap_or_default();

        let flag_state = match record.field("active") {
            Some(active) if truthy(active) => "active",
            Some(_) => "inactive",
            None => "",
        };

        Self {
            event_id,
            entity,
            time: record
                .opt_str("updated_at")
                .unwrap_or_else(|| record.str_or("created_at", EPOCH)),
            entity_name: record.str_or("name", ""),
            entity_description: record.str_or("description", ""),
            entity_details: record
                .opt_str("url")
                .unwrap_or_else(|| record.str_or("version", "")),
            hook_events,
            flag_state: flag_state.to_owned(),
        }
    }
}

impl Record for SystemChange {
    const KIND: &'static RecordKind = &kinds::SYSTEM_CHANGES;

    fn into_row(self) -> Row {
        let fields = vec![
            json!(self.event_id),
            json!(self.entity.event()),
            json!(self.entity.as_str()),
            json!(self.time),
            json!(self.entity_name),
            json!(self.entity_description),
            json!(self.entity_details),
            json!(self.hook_events),
            json!(self.flag_state),
        ];

        let table_row = TableRow {
            table: &tables::SYSTEM_CONFIG_CHANGES_RECORDS,
            values: vec![
                json!(row_id("system_change", &fields)),
                json!(self.entity.as_str()),
                json!(self.entity.event()),
                json!({
                    "name": self.entity_name,
                    "description": self.entity_description,
                    "details": self.entity_details,
                    "hook_events": self.hook_events,
                    "flag_state": self.flag_state,
                }),
                json!(self.time),
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
    fn test_system_hook() {
        let hook = json!({
            "id": 4,
            "url": "https://hooks.example.com/in",
            "created_at": "2024-01-05T00:00:00Z",
            "push_events": true,
            "tag_push_events": false,
            "merge_requests_events": true,
        });
        let change = SystemChange::new(SystemEntity::SystemHook, &hook);

        assert_eq!(change.event_id, 4);
        assert_eq!(change.time, "2024-01-05T00:00:00Z");
        assert_eq!(change.entity_details, "https://hooks.example.com/in");
        assert_eq!(change.hook_events, "merge_requests_events, push_events");
        assert_eq!(change.flag_state, "");

        let row = change.into_row();
        assert_eq!(row.fields[1], json!("create"));
        assert_eq!(row.fields[2], json!("SystemHook"));
    }

    #[test]
    fn test_feature_flag_without_id_uses_strategy() {
        let flag = json!({
            "name": "new_checkout",
            "active": false,
            "version": "new_version_flag",
            "updated_at": "2024-02-01T00:00:00Z",
            "strategies": [{"id": 31, "name": "default"}],
        });
        let change = SystemChange::new(SystemEntity::FeatureFlag, &flag);

        assert_eq!(change.event_id, 31);
        assert_eq!(change.flag_state, "inactive");
        assert_eq!(change.entity_details, "new_version_flag");
        assert_eq!(change.entity.event(), "update");
    }

    #[test]
    fn test_settings_defaults() {
        let change = SystemChange::new(SystemEntity::ApplicationSetting, &json!({"signup_enabled": true}));
        assert_eq!(change.event_id, -1);
        assert_eq!(change.time, EPOCH);
        assert_eq!(change.entity_details, "");
    }

    #[test]
    fn test_active_flag() {
        let change = SystemChange::new(SystemEntity::FeatureFlag, &json!({"id": 2, "active": true}));
        assert_eq!(change.flag_state, "active");
    }
}
