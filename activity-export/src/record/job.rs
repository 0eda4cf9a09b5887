use serde_json::{json, Value};

use super::{kinds, row_id, tables, Record, RecordKind, Row, TableRow};
use crate::value::Lookup;

/// One CI job, with gaps in its timing filled from the owning pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineJob {
    pub project_id: i64,
    pub branch: String,
    pub pipeline_id: i64,
    pub stage: String,
    pub job_name: String,
    pub job_status: String,
    pub time: String,
    pub end_time: String,
    pub duration: Value,
    pub triggered_by: String,
    pub environment: String,
    pub commit_sha: String,
}

impl PipelineJob {
    pub fn new(project_id: i64, pipeline: &Value, job: &Value) -> Self {
        Self {
            project_id,
            branch: pipeline.str_or("ref", ""),
            pipeline_id: pipeline.i64_or("id", -1),
            stage: job.str_or("stage", ""),
            job_name: job.str_or("name", ""),
            job_status: job.str_or("status", ""),
            time: job
                .opt_str("started_at")
                .unwrap_or_else(|| pipeline.str_or("created_at", "")),
            end_time: job
                .opt_str("finished_at")
                .unwrap_or_else(|| pipeline.str_or("updated_at", "")),
            duration: nonzero_number(job, "duration")
                .or_else(|| nonzero_number(pipeline, "duration"))
                .unwrap_or(Value::Null),
            triggered_by: job.path_str_or(&["user", "username"], "system"),
            environment: job.path_str_or(&["environment", "name"], ""),
            commit_sha: pipeline.str_or("sha", ""),
        }
    }
}

// Zero is how the API reports a job that never ran, so it counts as absent.
fn nonzero_number(source: &Value, key: &str) -> Option<Value> {
    let value = source.field(key)?;
    let n = value.as_f64()?;
    (n != 0.0).then(|| value.clone())
}

impl Record for PipelineJob {
    const KIND: &'static RecordKind = &kinds::CICD_PIPELINES;

    fn into_row(self) -> Row {
        let fields = vec![
            json!(self.project_id),
            json!(self.branch),
            json!(self.pipeline_id),
            json!(self.stage),
            json!(self.job_name),
            json!(self.job_status),
            json!(self.time),
            json!(self.end_time),
            self.duration.clone(),
            json!(self.triggered_by),
            json!(self.environment),
            json!(self.commit_sha),
        ];

        let table_row = TableRow {
            table: &tables::PIPELINE_ACTIVITIES_RECORDS,
            values: vec![
                json!(row_id("pipeline_job", &fields)),
                json!(self.pipeline_id),
                json!(self.stage),
                json!(self.job_name),
                json!(self.time),
                json!(self.end_time),
                json!(self.job_status),
                json!(self.project_id),
                json!({
                    "triggered_by_user": self.triggered_by,
                    "environment": self.environment,
                    "commit_sha": self.commit_sha,
                    "duration": self.duration,
                }),
            ],
        };

        Row {
            fields,
            table_row: Some(table_row),
        }
    }
}
