use anyhow::Error;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::info;

use super::{drain, per_project};
use crate::context::AppContext;
use crate::paginate::{collect_all, fetch_all};
use crate::record::{AuditRecord, SystemChange, SystemEntity};

/// Instance audit events created inside the window.
pub async fn audit_records(ctx: &AppContext) -> Result<usize, Error> {
    info!("Fetching audit events...");
    let url = ctx.window.render_query(
        &ctx.client.url("/audit_events"),
        "created_after",
        "created_before",
    );
    let batches = fetch_all(&ctx.client, url)
        .chunks(ctx.client.per_page().max(1) as usize)
        .map(|events| events.iter().map(AuditRecord::from_event).collect::<Vec<_>>());
    drain(ctx, batches).await
}

/// Application settings, system hooks and per-project feature flags. None
/// of these endpoints filter by time, so the window is applied locally.
pub async fn system_changes(ctx: &AppContext, project_ids: &[i64]) -> Result<usize, Error> {
    info!("Fetching system changes...");
    let instance = stream::once(instance_changes(ctx));
    let flags = per_project(ctx, project_ids, |id| project_feature_flags(ctx, id));
    drain(ctx, instance.chain(flags)).await
}

async fn instance_changes(ctx: &AppContext) -> Vec<SystemChange> {
    let client = &ctx.client;
    let settings = client
        .get(&client.url("/application/settings"))
        .await
        .into_items();
    let hooks = collect_all(client, client.url("/hooks")).await;

    let mut changes = in_window(ctx, SystemEntity::ApplicationSetting, &settings);
    changes.extend(in_window(ctx, SystemEntity::SystemHook, &hooks));
    changes
}

async fn project_feature_flags(ctx: &AppContext, project_id: i64) -> Vec<SystemChange> {
    let client = &ctx.client;
    let url = client.url(&format!("/projects/{project_id}/feature_flags"));
    let flags = collect_all(client, url).await;
    in_window(ctx, SystemEntity::FeatureFlag, &flags)
}

fn in_window(ctx: &AppContext, entity: SystemEntity, records: &[Value]) -> Vec<SystemChange> {
    records
        .iter()
        .filter(|record| ctx.window.contains(record))
        .map(|record| SystemChange::new(entity, record))
        .collect()
}
