use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::{RecordKind, Row};

pub mod csv;
pub mod doris;

pub use self::csv::CsvSink;
pub use self::doris::DorisSink;

/// Destination for normalized rows. Each pipeline opens its own transaction,
/// so a sink is shared by concurrent pipelines.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn begin<'a>(
        &'a self,
        kind: &'static RecordKind,
    ) -> Result<Box<dyn Transaction<'a> + 'a>, SinkError>;
}

#[async_trait]
pub trait Transaction<'a>: Send {
    async fn emit(&mut self, rows: Vec<Row>) -> Result<(), SinkError>;

    // Returns the number of rows persisted
    async fn commit(self: Box<Self>) -> Result<usize, SinkError>;
}
