//! Field and schema descriptions.

use crate::Result;
use crate::error::{Error, SchemaError, SchemaErrorKind, TypeError};
use crate::value::Value;

/// The declared kind of a schema field.
///
/// A field kind knows how to cast filter operands into the representation
/// the connector stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Text field
    String,
    /// Integer or floating point field
    Number,
    /// Date field, stored as milliseconds since epoch
    Date,
    /// Boolean field
    Boolean,
    /// Free-form JSON document
    Json,
}

impl FieldKind {
    /// Get the name used in schema definitions.
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Date => "Date",
            FieldKind::Boolean => "Boolean",
            FieldKind::Json => "Json",
        }
    }

    /// Cast a value to this kind, or fail with a type error.
    ///
    /// NULL passes through unchanged. Arrays (operands of `is_in` and
    /// `between`) are cast element-wise.
    #[allow(clippy::result_large_err)]
    pub fn cast(self, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (kind, Value::Array(items)) => items
                .into_iter()
                .map(|item| kind.cast(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (FieldKind::String, Value::Text(s)) => Ok(Value::Text(s)),
            (FieldKind::String, Value::BigInt(v)) => Ok(Value::Text(v.to_string())),
            (FieldKind::String, Value::Double(v)) => Ok(Value::Text(v.to_string())),
            (FieldKind::String, Value::Bool(v)) => Ok(Value::Text(v.to_string())),
            (FieldKind::Number, v @ (Value::BigInt(_) | Value::Double(_))) => Ok(v),
            (FieldKind::Number, Value::Text(s)) => parse_number(&s),
            (FieldKind::Date, Value::Timestamp(ms) | Value::BigInt(ms)) => Ok(Value::Timestamp(ms)),
            (FieldKind::Boolean, Value::Bool(v)) => Ok(Value::Bool(v)),
            (FieldKind::Boolean, Value::BigInt(0)) => Ok(Value::Bool(false)),
            (FieldKind::Boolean, Value::BigInt(1)) => Ok(Value::Bool(true)),
            (FieldKind::Json, v) => Ok(v),
            (kind, other) => Err(Error::Type(TypeError {
                expected: kind.name(),
                actual: other.type_name().to_string(),
                column: None,
            })),
        }
    }

    /// Check whether a stored value already has this kind.
    pub fn is_valid(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldKind::Json, _) => true,
            (FieldKind::String, Value::Text(_))
            | (FieldKind::Number, Value::BigInt(_) | Value::Double(_))
            | (FieldKind::Date, Value::Timestamp(_))
            | (FieldKind::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

fn parse_number(s: &str) -> Result<Value> {
    let trimmed = s.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(Value::BigInt(v));
    }
    trimmed.parse::<f64>().map(Value::Double).map_err(|_| {
        Error::Type(TypeError {
            expected: "Number",
            actual: format!("text '{}'", s),
            column: None,
        })
    })
}

/// Metadata about a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name as stored by the connector
    pub name: &'static str,
    /// Declared kind
    pub kind: FieldKind,
    /// Part of the primary key
    pub primary_key: bool,
    /// NULL allowed
    pub nullable: bool,
}

impl FieldInfo {
    /// Create a required, non-key field.
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            primary_key: false,
            nullable: false,
        }
    }

    /// Mark this field as part of the primary key.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Allow NULL for this field.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }
}

/// The schema of one model: its name and declared fields.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    model: &'static str,
    fields: &'static [FieldInfo],
}

impl Schema {
    pub const fn new(model: &'static str, fields: &'static [FieldInfo]) -> Self {
        Self { model, fields }
    }

    /// Name of the model this schema describes.
    pub const fn model(&self) -> &'static str {
        self.model
    }

    pub const fn fields(&self) -> &'static [FieldInfo] {
        self.fields
    }

    /// Look a field up by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look a field up by name, failing for undeclared names.
    #[allow(clippy::result_large_err)]
    pub fn require_field(&self, name: &str) -> Result<&'static FieldInfo> {
        self.field(name)
            .ok_or_else(|| Error::unknown_field(self.model, name))
    }

    /// Fields making up the primary key, in declaration order.
    ///
    /// The iterator borrows only the static field table, not the schema.
    pub fn primary_keys(&self) -> impl Iterator<Item = &'static FieldInfo> + use<> {
        let fields: &'static [FieldInfo] = self.fields;
        fields.iter().filter(|f| f.primary_key)
    }

    /// Check a value against the declared kind of a field.
    #[allow(clippy::result_large_err)]
    pub fn check(&self, name: &str, value: &Value) -> Result<()> {
        let field = self.require_field(name)?;
        if value.is_null() && !field.nullable {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::NotNullable,
                model: Some(self.model),
                message: format!("field {name} does not accept NULL"),
            }));
        }
        if field.kind.is_valid(value) {
            Ok(())
        } else {
            Err(Error::Type(TypeError {
                expected: field.kind.name(),
                actual: value.type_name().to_string(),
                column: Some(name.to_string()),
            }))
        }
    }
}
