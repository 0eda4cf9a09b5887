use anyhow::Error;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info};

use super::{drain, per_project};
use crate::context::AppContext;
use crate::diff::diff;
use crate::paginate::collect_all;
use crate::record::{ConfigChange, PipelineJob};
use crate::value::Lookup;

/// Every job of every pipeline updated inside the window.
pub async fn pipeline_jobs(ctx: &AppContext, project_ids: &[i64]) -> Result<usize, Error> {
    info!("Fetching CI/CD pipelines...");
    drain(ctx, per_project(ctx, project_ids, |id| project_pipeline_jobs(ctx, id))).await
}

pub async fn project_pipeline_jobs(ctx: &AppContext, project_id: i64) -> Vec<PipelineJob> {
    let client = &ctx.client;
    let url = ctx.window.render_query(
        &client.url(&format!("/projects/{project_id}/pipelines")),
        "updated_after",
        "updated_before",
    );
    let pipelines = collect_all(client, url).await;

    let mut jobs = Vec::new();
    for pipeline in &pipelines {
        let Some(pipeline_id) = pipeline.opt_i64("id") else {
            debug!("Skipping pipeline without id in project {project_id}");
            continue;
        };
        let jobs_url = client.url(&format!(
            "/projects/{project_id}/pipelines/{pipeline_id}/jobs"
        ));
        jobs.extend(
            collect_all(client, jobs_url)
                .await
                .iter()
                .map(|job| PipelineJob::new(project_id, pipeline, job)),
        );
    }
    jobs
}

/// Changes to the tracked CI configuration file, one record per commit that
/// actually altered it.
pub async fn config_changes(ctx: &AppContext, project_ids: &[i64]) -> Result<usize, Error> {
    info!("Fetching CI/CD config changes...");
    drain(ctx, per_project(ctx, project_ids, |id| project_config_changes(ctx, id))).await
}

pub async fn project_config_changes(ctx: &AppContext, project_id: i64) -> Vec<ConfigChange> {
    let client = &ctx.client;
    let url = ctx.window.render_query(
        &client.url(&format!("/projects/{project_id}/repository/commits")),
        "since",
        "until",
    );
    let commits = collect_all(client, url).await;

    stream::iter(commits)
        .then(|commit| async move { commit_config_changes(ctx, project_id, &commit).await })
        .flat_map(stream::iter)
        .collect()
        .await
}

async fn commit_config_changes(
    ctx: &AppContext,
    project_id: i64,
    commit: &Value,
) -> Vec<ConfigChange> {
    let client = &ctx.client;
    let tracked = ctx.config.ci_config_path.as_str();
    let Some(sha) = commit.opt_str("id") else {
        return Vec::new();
    };
    let parent = commit
        .field("parent_ids")
        .and_then(Value::as_array)
        .and_then(|parents| parents.first())
        .and_then(Value::as_str);

    let diff_url = client.url(&format!(
        "/projects/{project_id}/repository/commits/{sha}/diff"
    ));
    let paths = collect_all(client, diff_url).await;

    let mut changes = Vec::new();
    for path in paths.iter().filter(|p| p.opt_str("new_path").as_deref() == Some(tracked)) {
        let old_path = path.str_or("old_path", tracked);
        let old = match parent {
            Some(parent) => client.file_content(project_id, &old_path, parent).await,
            None => None,
        };
        let new = client.file_content(project_id, tracked, &sha).await;

        let result = diff(old.as_deref(), new.as_deref());
        if let Some(change) = ConfigChange::from_commit(project_id, commit, result) {
            changes.push(change);
        }
    }
    changes
}
