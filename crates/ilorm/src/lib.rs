//! ilorm - a data-mapping layer streaming typed query results from
//! pluggable connectors.
//!
//! ilorm provides:
//!
//! - Typed models described by their fields and kinds
//! - A fluent query builder with OR branches and linked sub-queries
//! - A streaming engine projecting connector records into models one by one
//! - A connector contract, with an in-memory connector as reference backend
//!
//! # Quick Start
//!
//! ```ignore
//! use ilorm::prelude::*;
//!
//! async fn adults(cx: &Cx, connector: Arc<MemoryConnector>) -> Outcome<Vec<User>, Error> {
//!     let users = Repository::<User, _>::new(connector);
//!     users
//!         .query()
//!         .field("age")
//!         .greater_or_equal(18)
//!         .sort("lastName", SortOrder::Ascending)
//!         .find(cx)
//!         .await
//! }
//! ```
//!
//! # Linked queries
//!
//! `Query::linked_with` restricts a field to the values another query's
//! records take for a field. Such queries are served from inside the
//! connector's complex query resolution: the stream pulls records while the
//! resolution is held open, then releases it exactly once.

// Re-export all public types from sub-crates
pub use ilorm_core::{
    // asupersync re-exports
    Cx,
    Outcome,
    // Core types
    Condition,
    Connector,
    ConnectorError,
    ConnectorErrorKind,
    Error,
    FieldInfo,
    FieldKind,
    FilterVisitor,
    FromValue,
    Link,
    Model,
    ModelId,
    Operator,
    ProjectionError,
    ProtocolError,
    ProtocolErrorKind,
    QueryId,
    QueryState,
    ResolutionBody,
    ResolutionError,
    ResolutionErrorKind,
    Result,
    Row,
    RowCursor,
    Schema,
    SchemaError,
    SchemaErrorKind,
    SortOrder,
    TypeError,
    Value,
};

pub use ilorm_query::{
    Branch, CursorStream, FieldFilter, Filterable, Instantiate, LinkedSource, ModelStream,
    OrBuilder, Projector, Query, Repository, ResolveInstance, RowSource,
};

pub use ilorm_memory::{MemoryConfig, MemoryConnector, MemoryCursor, MemoryStats};

/// Streaming engine internals, for connectors and custom pipelines.
pub mod stream {
    pub use ilorm_query::stream::*;
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ilorm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        // Core traits and types
        Connector,
        Error,
        FieldInfo,
        FieldKind,
        // Connectors
        MemoryConfig,
        MemoryConnector,
        Model,
        ModelId,
        Outcome,
        // Query building
        Query,
        Repository,
        ResolveInstance,
        Result,
        Row,
        SortOrder,
        Value,
    };
    pub use futures::StreamExt;
    pub use std::sync::Arc;
}
