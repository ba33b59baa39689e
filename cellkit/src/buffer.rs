use tracing::warn;

use crate::database::request::Put;
use crate::errors::StoreError;
use crate::metrics;
use crate::types::{Cell, RowKey};

/// Pending-mutation slot plus the bounded list of finalized row mutations
/// awaiting a batched put.
///
/// Submission is the facade's job; this type only tracks state. Exclusive
/// access (`&mut self`) is required for every change, so one buffer never
/// has two writers.
#[derive(Debug)]
pub struct WriteBuffer {
    max_size: usize,
    pending: Option<Put>,
    buffered: Option<Vec<Put>>,
}

impl WriteBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            pending: None,
            buffered: None,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
    }

    /// Drops the pending mutation and the buffered list.
    pub fn reset(&mut self) {
        self.pending = None;
        self.discard_buffered();
    }

    /// Starts a pending mutation for `row`, handing back any unfinalized one.
    pub fn start(&mut self, row: RowKey) -> Option<Put> {
        let replaced = self.pending.replace(Put::new(row));
        if let Some(put) = &replaced {
            warn!(
                "Pending mutation for row {} replaced before it was appended ({} cells dropped)",
                String::from_utf8_lossy(&put.row),
                put.cells.len()
            );
        }
        replaced
    }

    pub fn add_cell(&mut self, cell: Cell) -> Result<(), StoreError> {
        match self.pending.as_mut() {
            Some(put) => {
                put.push(cell);
                Ok(())
            }
            None => Err(StoreError::InvalidState(
                "no pending mutation; create one before adding cells".into(),
            )),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&Put> {
        self.pending.as_ref()
    }

    /// True when the next append must flush first.
    pub fn is_full(&self) -> bool {
        self.buffered_len() >= self.max_size
    }

    /// Moves the pending mutation to the end of the buffer, creating the
    /// buffer if absent. The caller flushes beforehand when [`is_full`](Self::is_full).
    pub fn append_pending(&mut self) -> Result<(), StoreError> {
        let put = self.pending.take().ok_or_else(|| {
            StoreError::InvalidState("no pending mutation to append".into())
        })?;
        self.buffered.get_or_insert_with(Vec::new).push(put);
        metrics::add_buffered_mutations(1);
        Ok(())
    }

    pub fn buffered(&self) -> Option<&[Put]> {
        self.buffered.as_deref()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.as_ref().map_or(0, Vec::len)
    }

    /// Removes the buffered list for submission. Hand it back with
    /// [`restore_buffered`](Self::restore_buffered) if the submit fails.
    pub fn take_buffered(&mut self) -> Option<Vec<Put>> {
        let puts = self.buffered.take()?;
        metrics::add_buffered_mutations(-(puts.len() as i64));
        Some(puts)
    }

    /// Puts a taken list back ahead of anything appended since.
    pub fn restore_buffered(&mut self, mut puts: Vec<Put>) {
        metrics::add_buffered_mutations(puts.len() as i64);
        if let Some(newer) = self.buffered.take() {
            puts.extend(newer);
        }
        self.buffered = Some(puts);
    }

    /// Destroys the buffered list after it has been submitted.
    pub fn discard_buffered(&mut self) {
        if let Some(puts) = self.buffered.take() {
            metrics::add_buffered_mutations(-(puts.len() as i64));
        }
    }
}

impl Drop for WriteBuffer {
    fn drop(&mut self) {
        self.discard_buffered();
    }
}
