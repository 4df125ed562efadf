//! Direct record source over a connector cursor.

use futures::Stream;
use ilorm_core::{Result, Row, RowCursor};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Adapts a [`RowCursor`] to a [`Stream`] of rows.
///
/// The cursor is closed as soon as it is drained or fails, and on drop.
pub struct CursorStream<Cur: RowCursor> {
    cursor: Option<Cur>,
}

impl<Cur: RowCursor> CursorStream<Cur> {
    pub fn new(cursor: Cur) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    /// Close the cursor now; later pulls report the end.
    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }
}

impl<Cur: RowCursor> Stream for CursorStream<Cur> {
    type Item = Result<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Row>>> {
        let this = self.get_mut();
        let Some(cursor) = this.cursor.as_mut() else {
            return Poll::Ready(None);
        };
        let polled = cursor.poll_next_row(cx);
        if matches!(polled, Poll::Ready(None | Some(Err(_)))) {
            this.close();
        }
        polled
    }
}

impl<Cur: RowCursor> Drop for CursorStream<Cur> {
    fn drop(&mut self) {
        self.close();
    }
}
