//! Model trait for typed entity mapping.
//!
//! A `Model` describes one entity: the name connectors store it under, its
//! declared fields, and how a raw [`Row`] becomes a typed instance.

use crate::Result;
use crate::field::{FieldInfo, Schema};
use crate::row::Row;
use crate::value::Value;

/// Trait for types that can be mapped to connector records.
///
/// # Example
///
/// ```ignore
/// struct User {
///     id: i64,
///     first_name: String,
/// }
///
/// impl Model for User {
///     const NAME: &'static str = "users";
///
///     fn fields() -> &'static [FieldInfo] {
///         const FIELDS: &[FieldInfo] = &[
///             FieldInfo::new("id", FieldKind::Number).primary_key(true),
///             FieldInfo::new("firstName", FieldKind::String),
///         ];
///         FIELDS
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             id: row.get_named("id")?,
///             first_name: row.get_named("firstName")?,
///         })
///     }
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("firstName", self.first_name.clone().into())]
///     }
///
///     fn primary_key_value(&self) -> Vec<Value> {
///         vec![self.id.into()]
///     }
/// }
/// ```
pub trait Model: Sized + Send + 'static {
    /// Name the connector stores this model under.
    const NAME: &'static str;

    /// Declared fields.
    fn fields() -> &'static [FieldInfo];

    /// Schema built from [`Model::fields`].
    fn schema() -> Schema {
        Schema::new(Self::NAME, Self::fields())
    }

    /// Build an instance from a raw record.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Flatten an instance into `(field, value)` pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Primary key values, in the order of the schema's primary keys.
    fn primary_key_value(&self) -> Vec<Value>;
}
