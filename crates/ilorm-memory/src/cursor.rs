//! Buffered cursor over a snapshot of matching rows.

use crate::config::MemoryConfig;
use crate::connector::Counters;
use ilorm_core::{Result, Row, RowCursor};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};

/// Rows matched when the cursor was opened, handed out in order.
///
/// Later writes to the connector do not affect an open cursor.
pub struct MemoryCursor {
    rows: VecDeque<Row>,
    unreadable_polls: usize,
    yield_every: usize,
    since_yield: usize,
    readable: bool,
    closed: bool,
    counters: Arc<Counters>,
}

impl MemoryCursor {
    pub(crate) fn new(rows: Vec<Row>, config: &MemoryConfig, counters: Arc<Counters>) -> Self {
        counters.cursors_opened.fetch_add(1, Ordering::Relaxed);
        Self {
            rows: rows.into(),
            unreadable_polls: config.pending_polls,
            yield_every: config.yield_every,
            since_yield: 0,
            readable: false,
            closed: false,
            counters,
        }
    }

    /// Rows not yet handed out.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowCursor for MemoryCursor {
    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.readable || self.closed {
            return Poll::Ready(Ok(()));
        }
        if self.unreadable_polls > 0 {
            self.unreadable_polls -= 1;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.readable = true;
        tracing::trace!(rows = self.rows.len(), "memory cursor readable");
        Poll::Ready(Ok(()))
    }

    fn poll_next_row(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Row>>> {
        if self.closed {
            return Poll::Ready(None);
        }
        if !self.readable {
            match self.poll_readable(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
        if self.yield_every > 0 && self.since_yield == self.yield_every && !self.rows.is_empty() {
            self.since_yield = 0;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        match self.rows.pop_front() {
            Some(row) => {
                self.since_yield += 1;
                Poll::Ready(Some(Ok(row)))
            }
            None => Poll::Ready(None),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.counters.cursors_closed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(discarded = self.rows.len(), "memory cursor closed");
        self.rows.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
