//! Streaming execution of queries.
//!
//! A query result is a pipeline of two stages:
//!
//! - a record source: either a [`CursorStream`] straight over the connector's
//!   cursor, or a [`LinkedSource`] when the query has linked sub-queries and
//!   must be served inside the connector's complex query resolution;
//! - an [`Instantiate`] stage projecting each raw record into a typed value.
//!
//! [`open`] picks the source and assembles the pipeline.

mod cursor;
mod handshake;
mod instantiate;
mod linked;

pub use cursor::CursorStream;
pub use instantiate::Instantiate;
pub use linked::LinkedSource;

pub(crate) use instantiate::projection_error;

use asupersync::{Cx, Outcome};
use futures::Stream;
use ilorm_core::{Connector, Error, QueryState, Result, Row, RowCursor};
use std::pin::Pin;
use std::task::{Context, Poll};

/// The record source feeding a [`ModelStream`].
pub enum RowSource<'a, Cur: RowCursor> {
    Direct(CursorStream<Cur>),
    Linked(LinkedSource<'a, Cur>),
}

impl<Cur: RowCursor> RowSource<'_, Cur> {
    pub fn is_linked(&self) -> bool {
        matches!(self, RowSource::Linked(_))
    }

    /// Stop the source, releasing everything it holds.
    pub fn poll_close(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        match self {
            RowSource::Direct(stream) => {
                stream.close();
                Poll::Ready(Ok(()))
            }
            RowSource::Linked(source) => source.poll_abort(cx),
        }
    }
}

impl<Cur: RowCursor> Stream for RowSource<'_, Cur> {
    type Item = Result<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Row>>> {
        match self.get_mut() {
            RowSource::Direct(stream) => Pin::new(stream).poll_next(cx),
            RowSource::Linked(source) => Pin::new(source).poll_next(cx),
        }
    }
}

/// Projection applied by a [`ModelStream`].
pub type Projector<'a, T> = Box<dyn FnMut(Row) -> Result<T> + Send + 'a>;

/// Typed query results, pulled one at a time.
///
/// A failure, from the source or from the projection, closes the source
/// before it is reported: by the time the error is seen the connector cursor
/// is closed and any complex query resolution has been torn down.
pub struct ModelStream<'a, T, Cur: RowCursor> {
    inner: Instantiate<RowSource<'a, Cur>, Projector<'a, T>>,
    failed: Option<Error>,
}

impl<'a, T, Cur: RowCursor> ModelStream<'a, T, Cur> {
    pub fn new(source: RowSource<'a, Cur>, model: &'static str, project: Projector<'a, T>) -> Self {
        Self {
            inner: Instantiate::new(source, model, project),
            failed: None,
        }
    }

    /// Is this stream served through a complex query resolution?
    pub fn is_linked(&self) -> bool {
        self.inner.upstream().is_linked()
    }

    /// Number of values produced so far.
    pub fn position(&self) -> usize {
        self.inner.position()
    }

    /// Stop consuming early.
    ///
    /// Closes the connector cursor and, for linked queries, waits for the
    /// connector's resolution teardown. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let source = self.inner.upstream_mut();
        std::future::poll_fn(|cx| source.poll_close(cx)).await
    }

    /// Pull every remaining value.
    ///
    /// On failure the source is already closed when the error is returned.
    pub async fn try_collect(mut self) -> Result<Vec<T>> {
        use futures::StreamExt;

        let mut values = Vec::new();
        while let Some(value) = self.next().await {
            values.push(value?);
        }
        Ok(values)
    }
}

impl<T, Cur: RowCursor> Stream for ModelStream<'_, T, Cur> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
        let this = self.get_mut();
        if this.failed.is_none() {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Err(e))) => this.failed = Some(e),
                other => return other,
            }
        }
        // Hold the failure until the source is released.
        match this.inner.upstream_mut().poll_close(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(closed) => {
                if let Err(e) = closed {
                    tracing::debug!(
                        model = this.inner.model(),
                        error = %e,
                        "close after failure"
                    );
                }
                Poll::Ready(this.failed.take().map(Err))
            }
        }
    }
}

/// Open the result stream of `query`.
///
/// Queries with linked sub-queries get a [`LinkedSource`], which defers all
/// connector work to the first pull. Other queries open their cursor here.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(query = query.id().get(), model = query.model(), connector = connector.name())
)]
pub async fn open<'a, C, T>(
    cx: &'a Cx,
    connector: &'a C,
    query: &'a QueryState,
    model: &'static str,
    project: Projector<'a, T>,
) -> Outcome<ModelStream<'a, T, C::Cursor>, Error>
where
    C: Connector,
{
    if query.has_linked_sub_queries() {
        tracing::debug!(links = query.linked().len(), "streaming through linked source");
        let source = LinkedSource::new(cx, connector, query);
        return Outcome::Ok(ModelStream::new(RowSource::Linked(source), model, project));
    }

    tracing::trace!("streaming directly from connector cursor");
    connector.stream(cx, query).await.map(|cursor| {
        ModelStream::new(
            RowSource::Direct(CursorStream::new(cursor)),
            model,
            project,
        )
    })
}
