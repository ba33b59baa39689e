use std::collections::BTreeMap;

use anyhow::{Context, Result};
use cellkit::{CellStore, FlushOutcome};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// One JSON-lines input record: `{"row": "...", "cells": {"family:qualifier": "value"}}`.
#[derive(Debug, Deserialize)]
pub struct Record {
    pub row: String,
    pub cells: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub records: u64,
    pub cells: u64,
    pub skipped: u64,
}

/// Streams records into a table through the facade's write buffer.
pub struct BulkLoader<'a> {
    store: &'a mut CellStore,
    table: String,
}

impl<'a> BulkLoader<'a> {
    pub fn new(store: &'a mut CellStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Loads every record of `input`. Lines that are not valid UTF-8 JSON are
    /// skipped and counted; store failures and read errors stop the load.
    pub async fn load<R>(&mut self, mut input: R) -> Result<LoadStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = LoadStats::default();
        let mut line = Vec::new();
        let mut line_no = 0u64;

        self.store.begin_buffer();

        loop {
            line.clear();
            let read = input
                .read_until(b'\n', &mut line)
                .await
                .with_context(|| format!("reading input after line {}", line_no))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let record: Record = match serde_json::from_slice(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping line {}: {}", line_no, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let cells = valid_cells(&record);
            if cells.is_empty() {
                warn!("Skipping line {}: row {} has no valid cells", line_no, record.row);
                stats.skipped += 1;
                continue;
            }

            self.store.create_pending_mutation(record.row.as_bytes().to_vec());
            for (family, qualifier, value) in cells {
                self.store.add_cell_to_pending(family, qualifier, value)?;
                stats.cells += 1;
            }
            self.store.append_pending_to_buffer(&self.table).await?;
            stats.records += 1;
        }

        match self.store.flush_buffer(&self.table).await? {
            FlushOutcome::Flushed(n) => debug!("Final flush wrote {} mutations", n),
            FlushOutcome::NothingBuffered => debug!("Nothing left to flush"),
        }

        info!(
            "Loaded {} records ({} cells) into {}, {} lines skipped",
            stats.records, stats.cells, self.table, stats.skipped
        );
        Ok(stats)
    }
}

/// Splits `family:qualifier` keys, dropping the ones that don't parse.
fn valid_cells(record: &Record) -> Vec<(String, String, String)> {
    let mut cells = Vec::with_capacity(record.cells.len());
    for (column, value) in &record.cells {
        match column.split_once(':') {
            Some((family, qualifier)) if !family.is_empty() => {
                cells.push((family.to_string(), qualifier.to_string(), value.clone()));
            }
            _ => warn!("Ignoring cell {} of row {}: expected family:qualifier", column, record.row),
        }
    }
    cells
}
