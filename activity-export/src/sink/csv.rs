use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{Sink, Transaction};
use crate::error::SinkError;
use crate::record::{RecordKind, Row};
use crate::value::{scalar_string, Lookup};

/// Writes one CSV file per record kind into a directory.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn begin<'a>(
        &'a self,
        kind: &'static RecordKind,
    ) -> Result<Box<dyn Transaction<'a> + 'a>, SinkError> {
        Ok(Box::new(CsvTransaction {
            path: self.dir.join(kind.file_name),
            kind,
            rows: Vec::new(),
        }))
    }
}

/// Buffers a whole pipeline's rows, since the file is written sorted.
pub struct CsvTransaction {
    path: PathBuf,
    kind: &'static RecordKind,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl<'a> Transaction<'a> for CsvTransaction {
    async fn emit(&mut self, rows: Vec<Row>) -> Result<(), SinkError> {
        self.rows.extend(rows.into_iter().map(|row| row.fields));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<usize, SinkError> {
        let Self {
            path,
            kind,
            mut rows,
        } = *self;
        let path_str = path.display().to_string();

        sort_rows(&mut rows, kind);
        let bytes = render(kind, &rows).map_err(|source| SinkError::Csv {
            path: path_str.clone(),
            source,
        })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SinkError::Io {
                path: path_str.clone(),
                source,
            })?;

        metrics::counter!("activity_export_rows_written_total", "sink" => "csv")
            .increment(rows.len() as u64);
        info!("Wrote {} rows to {}", rows.len(), path_str);
        Ok(rows.len())
    }
}

/// Stable sort on the kind's sort column. Two numbers compare numerically,
/// anything else compares as text with a missing value as the empty string.
pub fn sort_rows(rows: &mut [Vec<Value>], kind: &RecordKind) {
    let Some(idx) = kind.column_index(kind.sort_key) else {
        return;
    };
    rows.sort_by(|a, b| compare_cells(a.get(idx), b.get(idx)));
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    if let (Some(Value::Number(x)), Some(Value::Number(y))) = (a, b) {
        if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    let text = |v: Option<&Value>| v.and_then(scalar_string).unwrap_or_default();
    text(a).cmp(&text(b))
}

fn render(kind: &RecordKind, rows: &[Vec<Value>]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(kind.columns)?;
    for row in rows {
        writer.write_record(
            kind.columns
                .iter()
                .enumerate()
                .map(|(i, column)| cell(column, row.get(i))),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

fn cell(column: &str, value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) if column == "comments" => items
            .iter()
            .map(|c| {
                format!(
                    "{}: {} ({})",
                    c.str_or("commenter", ""),
                    c.str_or("content", ""),
                    c.str_or("time", "")
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => scalar_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::kinds;

    fn row(fields: Vec<Value>) -> Row {
        Row {
            fields,
            table_row: None,
        }
    }

    fn change(time: &str) -> Row {
        row(vec![
            json!("commit"),
            json!(time),
            Value::Null,
            json!("ana"),
            json!(""),
            json!("msg"),
            json!("sha"),
            json!(1),
            json!(""),
        ])
    }

    #[test]
    fn test_empty_timestamps_sort_first() {
        let mut rows = vec![
            change("2024-01-02T00:00:00Z").fields,
            change("2024-01-01T00:00:00Z").fields,
            change("").fields,
        ];
        sort_rows(&mut rows, &kinds::CODE_CHANGES);
        let times: Vec<_> = rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            times,
            vec![json!(""), json!("2024-01-01T00:00:00Z"), json!("2024-01-02T00:00:00Z")]
        );
    }

    #[test]
    fn test_numeric_ids_sort_numerically_and_stably() {
        let user = |id: i64, name: &str| {
            vec![json!(id), json!(name), json!(""), json!(""), json!(""), json!(false), json!(""), json!(""), json!("")]
        };
        let mut rows = vec![user(10, "a"), user(9, "b"), user(10, "c"), user(-1, "d")];
        sort_rows(&mut rows, &kinds::DIM_USERS);
        let names: Vec<_> = rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(names, vec![json!("d"), json!("b"), json!("a"), json!("c")]);
    }

    #[test]
    fn test_cells() {
        let comments = json!([
            {"commenter": "bo", "content": "LGTM", "time": "t1"},
            {"commenter": "cy", "content": "nit", "time": "t2"},
        ]);
        assert_eq!(cell("comments", Some(&comments)), "bo: LGTM (t1)\ncy: nit (t2)");
        assert_eq!(cell("comments", Some(&json!([]))), "");
        assert_eq!(cell("reviewers_ids", Some(&json!([1, 2]))), "[1,2]");
        assert_eq!(cell("metadata", Some(&json!({"a": 1}))), r#"{"a":1}"#);
        assert_eq!(cell("author_id", Some(&Value::Null)), "");
        assert_eq!(cell("is_admin", Some(&json!(true))), "true");
        assert_eq!(cell("id", Some(&json!(42))), "42");
    }

    #[tokio::test]
    async fn test_commit_writes_sorted_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());

        let mut tx = sink.begin(&kinds::CODE_CHANGES).await.unwrap();
        tx.emit(vec![change("2024-01-02T00:00:00Z")]).await.unwrap();
        tx.emit(vec![change("2024-01-01T00:00:00Z")]).await.unwrap();
        assert_eq!(tx.commit().await.unwrap(), 2);

        let written = std::fs::read_to_string(dir.path().join("code_changes.csv")).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(
            lines[0],
            "operation,time,author_id,author,email,message,sha,project_id,mr_state"
        );
        assert!(lines[1].contains("2024-01-01T00:00:00Z"));
        assert!(lines[2].contains("2024-01-02T00:00:00Z"));
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_pipeline_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());

        let tx = sink.begin(&kinds::DIM_GROUPS).await.unwrap();
        assert_eq!(tx.commit().await.unwrap(), 0);

        let written = std::fs::read_to_string(dir.path().join("dim_groups.csv")).unwrap();
        assert_eq!(written, "id,name,description,members,visibility,created_at,path\n");
    }
}
