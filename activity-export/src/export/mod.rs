//! The extraction pipelines and the run that drives them.
//!
//! Each pipeline pulls one family of entities, normalizes it and streams the
//! rows into its own sink transaction. Pipelines run concurrently and fail
//! independently.

use std::future::Future;
use std::pin::pin;

use anyhow::{Context, Error};
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use futures::FutureExt;
use tracing::{error, info};

use crate::context::AppContext;
use crate::paginate::fetch_all;
use crate::record::{Record, RecordKind, Row};
use crate::value::Lookup;

pub mod audit;
pub mod ci;
pub mod code;
pub mod dimension;

#[derive(Debug, Default)]
pub struct RunReport {
    pub written: Vec<(&'static str, usize)>,
    pub failed: Vec<&'static str>,
}

/// Run every pipeline once against the shared project list.
pub async fn run(ctx: &AppContext) -> RunReport {
    info!("Fetching project ids...");
    let project_ids = project_ids(ctx).await;
    info!("Total project ids fetched: {}", project_ids.len());
    let ids = project_ids.as_slice();

    let pipelines = vec![
        ("code_changes", code::code_changes(ctx, ids).boxed_local()),
        ("mr_reviews", code::merge_request_reviews(ctx, ids).boxed_local()),
        ("cicd_pipelines", ci::pipeline_jobs(ctx, ids).boxed_local()),
        ("cicd_changes", ci::config_changes(ctx, ids).boxed_local()),
        ("audit_records", audit::audit_records(ctx).boxed_local()),
        ("system_changes", audit::system_changes(ctx, ids).boxed_local()),
        ("dim_users", dimension::users(ctx).boxed_local()),
        ("dim_projects", dimension::projects(ctx, ids).boxed_local()),
        ("dim_groups", dimension::groups(ctx).boxed_local()),
    ];

    let (names, futures): (Vec<_>, Vec<_>) = pipelines.into_iter().unzip();
    let results = join_all(futures).await;

    let mut report = RunReport::default();
    for (name, result) in names.into_iter().zip(results) {
        match result {
            Ok(count) => {
                info!("Pipeline {name} finished with {count} rows");
                report.written.push((name, count));
            }
            Err(e) => {
                error!("Pipeline {name} failed: {e:#}");
                report.failed.push(name);
            }
        }
    }
    report
}

/// Ids of the projects updated inside the window. Every per-project
/// pipeline works from this one list.
pub async fn project_ids(ctx: &AppContext) -> Vec<i64> {
    let url = ctx.window.render_query(
        &ctx.client.url("/projects?order_by=updated_at"),
        "updated_after",
        "updated_before",
    );
    fetch_all(&ctx.client, url)
        .filter_map(|project| async move { project.opt_i64("id") })
        .collect()
        .await
}

/// Stream every batch of rows into a fresh transaction for `R`'s kind and
/// commit it.
pub(crate) async fn drain<R, S>(ctx: &AppContext, batches: S) -> Result<usize, Error>
where
    R: Record,
    S: Stream<Item = Vec<R>>,
{
    write_rows(
        ctx,
        R::KIND,
        batches.map(|records| records.into_iter().map(Record::into_row).collect()),
    )
    .await
}

pub(crate) async fn write_rows<S>(
    ctx: &AppContext,
    kind: &'static RecordKind,
    rows: S,
) -> Result<usize, Error>
where
    S: Stream<Item = Vec<Row>>,
{
    let mut tx = ctx
        .sink
        .begin(kind)
        .await
        .with_context(|| format!("opening {}", kind.file_name))?;

    let mut rows = pin!(rows);
    while let Some(batch) = rows.next().await {
        metrics::counter!("activity_export_records_total", "kind" => kind.file_name)
            .increment(batch.len() as u64);
        tx.emit(batch)
            .await
            .with_context(|| format!("writing {}", kind.file_name))?;
    }

    tx.commit()
        .await
        .with_context(|| format!("committing {}", kind.file_name))
}

/// Run `fetch` for every project with bounded concurrency, yielding
/// each project's records as they complete.
pub(crate) fn per_project<'a, R, F, Fut>(
    ctx: &'a AppContext,
    project_ids: &'a [i64],
    fetch: F,
) -> impl Stream<Item = Vec<R>> + 'a
where
    F: Fn(i64) -> Fut + 'a,
    Fut: Future<Output = Vec<R>> + 'a,
    R: 'a,
{
    stream::iter(project_ids.iter().copied())
        .map(fetch)
        .buffer_unordered(ctx.config.max_concurrent_requests.max(1))
}
