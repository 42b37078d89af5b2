//! Local table file source
//!
//! Accepts the same `{"values": [[...]]}` document the Sheets API returns, or a bare
//! array of arrays. Used on nodes without network access and in tests.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use super::{table::rows_from_grid, ScheduleSource};
use crate::errors::{ScheduleError, ScheduleResult};
use crate::models::ScheduleRow;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TableDocument {
    Values { values: Vec<Vec<Value>> },
    Grid(Vec<Vec<Value>>),
}

pub struct TableFileSource {
    path: PathBuf,
}

impl TableFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ScheduleSource for TableFileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch_rows(&self) -> ScheduleResult<Vec<ScheduleRow>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ScheduleError::decode(self.name(), format!("{}: {e}", self.path.display()))
        })?;
        let document: TableDocument = serde_json::from_str(&contents).map_err(|e| {
            ScheduleError::decode(self.name(), format!("{}: {e}", self.path.display()))
        })?;
        let grid = match document {
            TableDocument::Values { values } => values,
            TableDocument::Grid(grid) => grid,
        };
        let rows = rows_from_grid(&grid);
        debug!("Read {} schedule rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}
