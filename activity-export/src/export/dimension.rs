use std::collections::HashSet;

use anyhow::Error;
use futures::StreamExt;
use serde_json::Value;
use tracing::info;

use super::drain;
use crate::context::AppContext;
use crate::paginate::{collect_all, fetch_all};
use crate::record::{GroupDim, ProjectDim, UserDim};
use crate::value::Lookup;

pub async fn users(ctx: &AppContext) -> Result<usize, Error> {
    info!("Fetching users...");
    let url = ctx.client.url("/users?order_by=updated_at");
    let batches = fetch_all(&ctx.client, url)
        .chunks(ctx.client.per_page().max(1) as usize)
        .map(|users| users.iter().map(UserDim::new).collect::<Vec<_>>());
    drain(ctx, batches).await
}

/// Projects, restricted to the ones updated inside the window.
pub async fn projects(ctx: &AppContext, project_ids: &[i64]) -> Result<usize, Error> {
    info!("Fetching projects...");
    let wanted: HashSet<i64> = project_ids.iter().copied().collect();
    let url = ctx.client.url("/projects?simple=true");
    let batches = fetch_all(&ctx.client, url)
        .chunks(ctx.client.per_page().max(1) as usize)
        .map(move |projects| {
            projects
                .iter()
                .filter(|p| p.opt_i64("id").is_some_and(|id| wanted.contains(&id)))
                .map(ProjectDim::new)
                .collect::<Vec<_>>()
        });
    drain(ctx, batches).await
}

/// Groups with the ids of their direct members.
pub async fn groups(ctx: &AppContext) -> Result<usize, Error> {
    info!("Fetching groups...");
    let batches = fetch_all(&ctx.client, ctx.client.url("/groups"))
        .map(|group| group_with_members(ctx, group))
        .buffer_unordered(ctx.config.max_concurrent_requests.max(1))
        .chunks(ctx.client.per_page().max(1) as usize);
    drain(ctx, batches).await
}

async fn group_with_members(ctx: &AppContext, group: Value) -> GroupDim {
    let members = match group.opt_i64("id").filter(|id| *id != -1) {
        Some(id) => {
            let url = ctx.client.url(&format!("/groups/{id}/members"));
            collect_all(&ctx.client, url).await
        }
        None => Vec::new(),
    };
    GroupDim::new(&group, &members)
}
