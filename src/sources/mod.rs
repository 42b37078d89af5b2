//! Schedule source adapters
//!
//! A source returns the complete remote table as raw rows; node filtering and
//! validation happen in the schedule cache. Two adapters exist: the Sheets API and a
//! local table file for air-gapped nodes.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ScheduleConfig, ScheduleSourceKind};
use crate::errors::ScheduleResult;
use crate::models::ScheduleRow;

pub mod sheets;
pub mod table;
pub mod table_file;

pub use sheets::SheetsScheduleSource;
pub use table_file::TableFileSource;

/// Fetches the full schedule table
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Every non-blank row of the table, header already applied
    async fn fetch_rows(&self) -> ScheduleResult<Vec<ScheduleRow>>;
}

/// Create the configured source
pub fn create_source(config: &ScheduleConfig) -> ScheduleResult<Arc<dyn ScheduleSource>> {
    match config.source {
        ScheduleSourceKind::Sheets => Ok(Arc::new(SheetsScheduleSource::new(&config.sheets)?)),
        ScheduleSourceKind::File => Ok(Arc::new(TableFileSource::new(config.file.path.clone()))),
    }
}
