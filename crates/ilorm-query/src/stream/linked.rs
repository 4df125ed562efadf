//! Record source for queries with linked sub-queries.
//!
//! Such a query can only be served inside the connector's complex query
//! resolution: the connector prepares whatever the links need, runs a body,
//! and tears its preparation down once the body returns. [`LinkedSource`]
//! turns that callback into a pull-based [`Stream`]:
//!
//! 1. On first pull the resolution starts; its body opens the inner cursor
//!    and hands it over once the cursor is readable.
//! 2. Pulls are answered from the inner cursor.
//! 3. When the cursor is drained (or fails) it is closed and the body is
//!    released, exactly once. The source ends only after the resolution has
//!    finished its teardown.
//!
//! The resolution future is owned and polled by the source itself, so the
//! whole exchange runs on the consumer's task without spawning.

use super::handshake::{ReleaseHandle, release_pair};
use asupersync::{Cx, Outcome};
use futures::Stream;
use futures::channel::oneshot;
use ilorm_core::{
    Connector, Error, ProtocolError, ProtocolErrorKind, QueryId, QueryState, ResolutionBody,
    ResolutionError, ResolutionErrorKind, Result, Row, RowCursor, readable,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

type Resolution<'a> = Pin<Box<dyn Future<Output = Outcome<(), Error>> + Send + 'a>>;

enum SourceState<Cur> {
    /// Waiting for the resolution body to hand over a readable cursor.
    Pending(oneshot::Receiver<Cur>),
    /// Serving rows from the inner cursor.
    Active(Cur),
    /// Cursor closed and body released; waiting for the teardown.
    Settling,
    Finished,
}

impl<Cur> SourceState<Cur> {
    fn name(&self) -> &'static str {
        match self {
            SourceState::Pending(_) => "pending",
            SourceState::Active(_) => "active",
            SourceState::Settling => "settling",
            SourceState::Finished => "finished",
        }
    }
}

/// A pull-based record source over a connector's complex query resolution.
pub struct LinkedSource<'a, Cur: RowCursor> {
    query: QueryId,
    resolution: Option<Resolution<'a>>,
    resolved: Option<Result<()>>,
    state: SourceState<Cur>,
    release: ReleaseHandle,
    handed_over: bool,
    pending_error: Option<Error>,
    emitted: usize,
}

impl<'a, Cur: RowCursor + 'static> LinkedSource<'a, Cur> {
    /// Prepare a linked source for `query`.
    ///
    /// Nothing is requested from the connector until the first pull. Aborting
    /// before that still starts the resolution, so the connector's setup and
    /// teardown both run.
    pub fn new<C>(cx: &'a Cx, connector: &'a C, query: &'a QueryState) -> Self
    where
        C: Connector<Cursor = Cur>,
    {
        let (cursor_tx, cursor_rx) = oneshot::channel::<Cur>();
        let (release, release_wait) = release_pair();

        let body = ResolutionBody::new(async move {
            let mut cursor = match connector.stream(cx, query).await {
                Outcome::Ok(cursor) => cursor,
                Outcome::Err(e) => {
                    return Outcome::Err(e.into_resolution(ResolutionErrorKind::CursorUnavailable));
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if let Err(e) = readable(&mut cursor).await {
                cursor.close();
                return Outcome::Err(e.into_resolution(ResolutionErrorKind::CursorUnavailable));
            }
            tracing::trace!(query = query.id().get(), "inner cursor readable");

            if let Err(mut cursor) = cursor_tx.send(cursor) {
                // Consumer went away before the handover.
                cursor.close();
                return Outcome::Ok(());
            }
            release_wait.await;
            Outcome::Ok(())
        });

        tracing::debug!(
            query = query.id().get(),
            model = query.model(),
            connector = connector.name(),
            links = query.linked().len(),
            "linked source created"
        );

        Self {
            query: query.id(),
            resolution: Some(Box::pin(connector.resolve_complex_query(cx, query, body))),
            resolved: None,
            state: SourceState::Pending(cursor_rx),
            release,
            handed_over: false,
            pending_error: None,
            emitted: 0,
        }
    }
}

impl<Cur: RowCursor> LinkedSource<'_, Cur> {
    /// Has the source reported its end?
    pub fn is_finished(&self) -> bool {
        matches!(self.state, SourceState::Finished)
    }

    /// Has the resolution procedure been released?
    pub fn is_released(&self) -> bool {
        self.release.is_released()
    }

    /// Number of records handed out so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Stop pulling, close the inner cursor and let the resolution finish.
    ///
    /// Resolves once the connector's teardown has run. Aborting a finished
    /// source is a no-op. Rows not yet pulled are discarded.
    pub async fn abort(&mut self) -> Result<()> {
        std::future::poll_fn(|cx| self.poll_abort(cx)).await
    }

    /// Poll form of [`abort`](Self::abort).
    pub fn poll_abort(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        loop {
            match &self.state {
                SourceState::Finished => return Poll::Ready(Ok(())),
                SourceState::Pending(_) | SourceState::Active(_) => {
                    tracing::debug!(
                        query = self.query.get(),
                        from = self.state.name(),
                        emitted = self.emitted,
                        "aborting linked source"
                    );
                    self.settle();
                }
                SourceState::Settling => {
                    self.drive_resolution(cx);
                    let Some(result) = self.resolved.take() else {
                        return Poll::Pending;
                    };
                    self.finish();
                    // A cursor error nobody asked for is dropped with the rest.
                    self.pending_error = None;
                    return Poll::Ready(result);
                }
            }
        }
    }

    fn drive_resolution(&mut self, cx: &mut Context<'_>) {
        let Some(resolution) = self.resolution.as_mut() else {
            return;
        };
        if let Poll::Ready(outcome) = resolution.as_mut().poll(cx) {
            self.resolution = None;
            let result = resolution_result(outcome);
            match &result {
                Ok(()) => tracing::trace!(query = self.query.get(), "resolution finished"),
                Err(e) => tracing::debug!(
                    query = self.query.get(),
                    error = %e,
                    "resolution failed"
                ),
            }
            self.resolved = Some(result);
        }
    }

    fn resolution_failed(&self) -> bool {
        matches!(self.resolved, Some(Err(_)))
    }

    /// Close the inner cursor (if any) and release the resolution body.
    fn settle(&mut self) {
        if let SourceState::Active(cursor) = &mut self.state {
            cursor.close();
        }
        self.state = SourceState::Settling;
        if self.release.release().is_ok() {
            tracing::trace!(
                query = self.query.get(),
                emitted = self.emitted,
                "resolution released"
            );
        }
    }

    fn finish(&mut self) {
        self.state = SourceState::Finished;
        tracing::debug!(
            query = self.query.get(),
            emitted = self.emitted,
            "linked source finished"
        );
    }
}

impl<Cur: RowCursor> Stream for LinkedSource<'_, Cur> {
    type Item = Result<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Row>>> {
        let this = self.get_mut();
        loop {
            this.drive_resolution(cx);
            let failed = this.resolution_failed();
            match &mut this.state {
                SourceState::Finished => return Poll::Ready(None),
                SourceState::Pending(_) | SourceState::Active(_) if failed => {
                    this.settle();
                }
                SourceState::Pending(handoff) => match Pin::new(handoff).poll(cx) {
                    Poll::Ready(Ok(cursor)) => {
                        tracing::trace!(query = this.query.get(), "inner cursor handed over");
                        this.handed_over = true;
                        this.state = SourceState::Active(cursor);
                    }
                    // The body ended without handing a cursor over; the
                    // resolution outcome says why.
                    Poll::Ready(Err(oneshot::Canceled)) => this.settle(),
                    Poll::Pending => return Poll::Pending,
                },
                SourceState::Active(cursor) => match cursor.poll_next_row(cx) {
                    Poll::Ready(Some(Ok(row))) => {
                        this.emitted += 1;
                        return Poll::Ready(Some(Ok(row)));
                    }
                    Poll::Ready(Some(Err(e))) => {
                        tracing::debug!(
                            query = this.query.get(),
                            error = %e,
                            "inner cursor failed"
                        );
                        this.pending_error = Some(e);
                        this.settle();
                    }
                    Poll::Ready(None) => {
                        tracing::trace!(
                            query = this.query.get(),
                            emitted = this.emitted,
                            "inner cursor drained"
                        );
                        this.settle();
                    }
                    Poll::Pending => return Poll::Pending,
                },
                SourceState::Settling => {
                    let Some(result) = this.resolved.take() else {
                        return Poll::Pending;
                    };
                    let handed_over = this.handed_over;
                    let pending_error = this.pending_error.take();
                    this.finish();
                    let end = match (pending_error, result) {
                        (Some(e), _) | (None, Err(e)) => Some(Err(e)),
                        (None, Ok(())) if !handed_over => {
                            Some(Err(Error::Protocol(ProtocolError::new(
                                ProtocolErrorKind::MissingContinuation,
                                "resolution finished without opening the inner cursor",
                            ))))
                        }
                        (None, Ok(())) => None,
                    };
                    return Poll::Ready(end);
                }
            }
        }
    }
}

impl<Cur: RowCursor> Drop for LinkedSource<'_, Cur> {
    fn drop(&mut self) {
        if self.is_finished() {
            return;
        }
        tracing::warn!(
            query = self.query.get(),
            state = self.state.name(),
            emitted = self.emitted,
            "linked source dropped before completion"
        );
        if let SourceState::Active(cursor) = &mut self.state {
            cursor.close();
        }
        let _ = self.release.release();
    }
}

fn resolution_result(outcome: Outcome<(), Error>) -> Result<()> {
    match outcome {
        Outcome::Ok(()) => Ok(()),
        Outcome::Err(e) => Err(e.into_resolution(ResolutionErrorKind::ProcedureFailed)),
        Outcome::Cancelled(reason) => {
            tracing::debug!(reason = ?reason, "resolution cancelled");
            Err(Error::Cancelled)
        }
        Outcome::Panicked(payload) => Err(Error::Resolution(ResolutionError {
            kind: ResolutionErrorKind::Panicked,
            message: format!("resolution procedure panicked: {payload:?}"),
            source: None,
        })),
    }
}
