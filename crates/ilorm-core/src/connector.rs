//! Connector contract.
//!
//! This module defines the boundary between ilorm and a storage backend:
//!
//! - [`Connector`] - operations a backend serves for a [`QueryState`]
//! - [`RowCursor`] - the raw record sequence a backend opens for a query
//! - [`ResolutionBody`] - the continuation handed to
//!   [`Connector::resolve_complex_query`]
//!
//! All async operations take a `Cx` context and return an `Outcome`, so
//! cancellation flows through asupersync like any other database call.

use crate::error::Error;
use crate::filter::QueryState;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A raw record sequence opened by a connector.
///
/// A cursor signals readiness once per session through
/// [`poll_readable`](RowCursor::poll_readable), then hands out rows one by
/// one until it reports itself drained.
pub trait RowCursor: Send + Unpin {
    /// Resolve once the cursor has rows to read, or knows it has none.
    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<crate::Result<()>>;

    /// Pull one row. `Ready(None)` reports the cursor drained.
    fn poll_next_row(&mut self, cx: &mut Context<'_>) -> Poll<Option<crate::Result<Row>>>;

    /// Release backend resources. Calling it twice is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Wait until `cursor` becomes readable.
pub fn readable<C: RowCursor + ?Sized>(
    cursor: &mut C,
) -> impl Future<Output = crate::Result<()>> + Send + '_ {
    std::future::poll_fn(move |cx| cursor.poll_readable(cx))
}

/// Pull the next row from `cursor`.
pub fn next_row<C: RowCursor + ?Sized>(
    cursor: &mut C,
) -> impl Future<Output = Option<crate::Result<Row>>> + Send + '_ {
    std::future::poll_fn(move |cx| cursor.poll_next_row(cx))
}

/// The work a connector must run inside a complex query resolution.
///
/// Awaiting the body runs it to completion. A connector sets up whatever
/// the linked sub-queries need, awaits the body, then tears the setup down.
/// The body must be awaited at most once and its outcome propagated.
#[must_use = "a resolution body does nothing unless awaited"]
pub struct ResolutionBody<'a> {
    inner: Pin<Box<dyn Future<Output = Outcome<(), Error>> + Send + 'a>>,
}

impl<'a> ResolutionBody<'a> {
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = Outcome<(), Error>> + Send + 'a,
    {
        Self {
            inner: Box::pin(body),
        }
    }
}

impl Future for ResolutionBody<'_> {
    type Output = Outcome<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for ResolutionBody<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionBody").finish_non_exhaustive()
    }
}

/// A storage backend serving queries.
///
/// Implementations must be `Send + Sync` for use across async boundaries.
///
/// # Complex query resolution
///
/// Queries with linked sub-queries are never served directly. ilorm calls
/// [`resolve_complex_query`](Connector::resolve_complex_query) instead,
/// passing a body that performs the actual operation:
///
/// ```rust,ignore
/// async fn resolve_complex_query<'a>(&'a self, cx: &'a Cx, query: &'a QueryState, body: ResolutionBody<'a>) -> Outcome<(), Error> {
///     let restriction = self.resolve_links(cx, query).await?;
///     self.restrictions.push(query.id(), restriction);
///     let outcome = body.await;
///     self.restrictions.pop(query.id());
///     outcome
/// }
/// ```
pub trait Connector: Send + Sync {
    /// The cursor type returned by [`stream`](Connector::stream).
    type Cursor: RowCursor + 'static;

    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Open a raw record cursor for the query.
    fn stream(
        &self,
        cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<Self::Cursor, Error>> + Send;

    /// Resolve the linked sub-queries of `query`, run `body`, then tear down.
    ///
    /// Must await `body` exactly once and must not complete before it does.
    fn resolve_complex_query<'a>(
        &'a self,
        cx: &'a Cx,
        query: &'a QueryState,
        body: ResolutionBody<'a>,
    ) -> impl Future<Output = Outcome<(), Error>> + Send + 'a;

    /// Return all matching rows.
    ///
    /// The default drains a cursor from [`stream`](Connector::stream).
    fn find(
        &self,
        cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            let mut cursor = match self.stream(cx, query).await {
                Outcome::Ok(cursor) => cursor,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let mut rows = Vec::new();
            while let Some(row) = next_row(&mut cursor).await {
                match row {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        cursor.close();
                        return Outcome::Err(e);
                    }
                }
            }
            cursor.close();
            Outcome::Ok(rows)
        }
    }

    /// Return the first matching row, if any.
    fn find_one(
        &self,
        cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            let mut cursor = match self.stream(cx, query).await {
                Outcome::Ok(cursor) => cursor,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let first = next_row(&mut cursor).await;
            cursor.close();
            match first {
                Some(Ok(row)) => Outcome::Ok(Some(row)),
                Some(Err(e)) => Outcome::Err(e),
                None => Outcome::Ok(None),
            }
        }
    }

    /// Count matching rows.
    fn count(&self, cx: &Cx, query: &QueryState)
    -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Apply `changes` to every matching row; returns rows affected.
    fn update(
        &self,
        cx: &Cx,
        query: &QueryState,
        changes: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Apply `changes` to the first matching row; returns rows affected.
    fn update_one(
        &self,
        cx: &Cx,
        query: &QueryState,
        changes: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Delete every matching row; returns rows affected.
    fn remove(&self, cx: &Cx, query: &QueryState)
    -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Delete the first matching row; returns rows affected.
    fn remove_one(
        &self,
        cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Store a new record for `model`.
    fn insert(
        &self,
        cx: &Cx,
        model: &str,
        row: Row,
    ) -> impl Future<Output = Outcome<(), Error>> + Send;
}
