use anyhow::Error;
use futures::StreamExt;
use tracing::info;

use super::{drain, per_project};
use crate::context::AppContext;
use crate::paginate::{collect_all, fetch_all};
use crate::record::review::attach_comments;
use crate::record::{CodeChange, Comment, MergeRequestReview};
use crate::value::Lookup;

/// Commits, merge requests and pushes for every project.
pub async fn code_changes(ctx: &AppContext, project_ids: &[i64]) -> Result<usize, Error> {
    info!("Fetching code changes...");
    drain(ctx, per_project(ctx, project_ids, |id| project_code_changes(ctx, id))).await
}

pub async fn project_code_changes(ctx: &AppContext, project_id: i64) -> Vec<CodeChange> {
    let client = &ctx.client;
    let window = &ctx.window;

    let commits_url = window.render_query(
        &client.url(&format!("/projects/{project_id}/repository/commits")),
        "since",
        "until",
    );
    let merge_requests_url = window.render_query(
        &client.url(&format!("/projects/{project_id}/merge_requests")),
        "updated_after",
        "updated_before",
    );
    let pushes_url = window.render_query(
        &client.url(&format!("/projects/{project_id}/events?action=pushed")),
        "after",
        "before",
    );

    let (commits, merge_requests, pushes) = futures::join!(
        collect_all(client, commits_url),
        collect_all(client, merge_requests_url),
        collect_all(client, pushes_url),
    );

    let mut changes = Vec::with_capacity(commits.len() + merge_requests.len() + pushes.len());
    changes.extend(commits.iter().map(|c| CodeChange::from_commit(project_id, c)));
    changes.extend(
        merge_requests
            .iter()
            .map(|mr| CodeChange::from_merge_request(project_id, mr)),
    );
    changes.extend(pushes.iter().map(|e| CodeChange::from_push_event(project_id, e)));
    changes
}

/// Merge request status history and review comments for every project.
pub async fn merge_request_reviews(ctx: &AppContext, project_ids: &[i64]) -> Result<usize, Error> {
    info!("Fetching merge request reviews...");
    drain(
        ctx,
        per_project(ctx, project_ids, |id| project_merge_request_reviews(ctx, id)),
    )
    .await
}

pub async fn project_merge_request_reviews(
    ctx: &AppContext,
    project_id: i64,
) -> Vec<MergeRequestReview> {
    let client = &ctx.client;
    let url = ctx.window.render_query(
        &client.url(&format!("/projects/{project_id}/merge_requests")),
        "updated_after",
        "updated_before",
    );

    let mut records = Vec::new();
    let mut merge_requests = std::pin::pin!(fetch_all(client, url));
    while let Some(mr) = merge_requests.next().await {
        let mut statuses = MergeRequestReview::fan_out(project_id, &mr);
        if statuses.is_empty() {
            continue;
        }

        let iid = mr.i64_or("iid", -1);
        let notes_url = client.url(&format!(
            "/projects/{project_id}/merge_requests/{iid}/notes"
        ));
        let comments = collect_all(client, notes_url)
            .await
            .iter()
            .map(Comment::from_note)
            .collect();
        attach_comments(&mut statuses, comments);

        records.extend(statuses);
    }
    records
}
