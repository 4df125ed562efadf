//! Core types and traits for ilorm.
//!
//! This crate provides the foundational abstractions shared by the query
//! layer and every connector:
//!
//! - `Model` trait for typed entity mapping
//! - `Value` / `Row` for raw connector records
//! - `QueryState` and `FilterVisitor`, the filter tree a connector reads
//! - `Connector` and `RowCursor`, the storage backend contract
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connector;
pub mod error;
pub mod field;
pub mod filter;
pub mod model;
pub mod model_id;
pub mod row;
pub mod value;

pub use connector::{Connector, ResolutionBody, RowCursor, next_row, readable};
pub use error::{
    ConnectorError, ConnectorErrorKind, Error, ProjectionError, ProtocolError, ProtocolErrorKind,
    ResolutionError, ResolutionErrorKind, Result, SchemaError, SchemaErrorKind, TypeError,
};
pub use field::{FieldInfo, FieldKind, Schema};
pub use filter::{Condition, FilterVisitor, Link, Operator, QueryId, QueryState, SortOrder};
pub use model::Model;
pub use model_id::ModelId;
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
