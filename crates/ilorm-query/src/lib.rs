//! Query builder and streaming execution engine for ilorm.
//!
//! `ilorm-query` is the **execution layer**. It turns `Model` metadata into
//! a connector-facing `QueryState` and runs it.
//!
//! # Role In The Architecture
//!
//! - **Query builder**: `Query` with its field proxy, OR branches and linked
//!   sub-queries, values cast through each field's declared kind.
//! - **Streaming engine**: `stream::open` chooses between a direct cursor
//!   source and a `LinkedSource` that serves linked queries from inside the
//!   connector's complex query resolution, then projects every record into
//!   a typed model.
//! - **Repository**: a model bound to a connector, with insert and identity
//!   resolution.
//!
//! Most users access these types via the `ilorm` facade crate.

pub mod query;
pub mod repository;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use query::{Branch, FieldFilter, Filterable, OrBuilder, Query};
pub use repository::{Repository, ResolveInstance};
pub use stream::{CursorStream, Instantiate, LinkedSource, ModelStream, Projector, RowSource};
