//! One-to-one projection of raw records into typed values.

use futures::Stream;
use ilorm_core::{Error, ProjectionError, Result, Row};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Stream stage applying a projection to every upstream row.
///
/// Order is preserved and nothing is buffered: a row is pulled from upstream
/// only when a value is pulled from this stage. The first failure, upstream
/// or in the projection, is reported once and ends the stage without pulling
/// anything further.
pub struct Instantiate<S, F> {
    upstream: S,
    project: F,
    model: &'static str,
    position: usize,
    done: bool,
}

impl<S, F> Instantiate<S, F> {
    /// `model` names the projection target in errors.
    pub fn new(upstream: S, model: &'static str, project: F) -> Self {
        Self {
            upstream,
            project,
            model,
            position: 0,
            done: false,
        }
    }

    pub fn upstream(&self) -> &S {
        &self.upstream
    }

    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }

    /// Number of values produced so far.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn model(&self) -> &'static str {
        self.model
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<S, F, T> Stream for Instantiate<S, F>
where
    S: Stream<Item = Result<Row>> + Unpin,
    F: FnMut(Row) -> Result<T> + Unpin,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.upstream).poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => match (this.project)(row) {
                Ok(value) => {
                    this.position += 1;
                    Poll::Ready(Some(Ok(value)))
                }
                Err(e) => {
                    this.done = true;
                    tracing::debug!(
                        model = this.model,
                        position = this.position,
                        error = %e,
                        "projection failed"
                    );
                    Poll::Ready(Some(Err(projection_error(this.model, this.position, e))))
                }
            },
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

pub(crate) fn projection_error(model: &'static str, position: usize, error: Error) -> Error {
    match error {
        Error::Projection(_) => error,
        other => Error::Projection(ProjectionError {
            model,
            position,
            message: other.to_string(),
            source: Some(Box::new(other)),
        }),
    }
}
