//! Model identity.

use crate::Result;
use crate::error::{Error, SchemaError, SchemaErrorKind};
use crate::model::Model;
use crate::value::Value;
use std::fmt;
use std::marker::PhantomData;

/// The primary key of one `M` instance.
///
/// Keys are stored in schema order, one entry per primary-key field.
pub struct ModelId<M: Model> {
    keys: Vec<(&'static str, Value)>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> ModelId<M> {
    /// Build an id from a single value.
    ///
    /// Only valid for models with exactly one primary-key field.
    #[allow(clippy::result_large_err)]
    pub fn new(id: impl Into<Value>) -> Result<Self> {
        let schema = M::schema();
        let mut keys = schema.primary_keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(Self {
                keys: vec![(key.name, id.into())],
                _marker: PhantomData,
            }),
            _ => {
                let value = id.into();
                Err(primary_key_error(format!(
                    "cannot build a {} id from a single value {:?}: the model has {} primary keys",
                    M::NAME,
                    value,
                    schema.primary_keys().count()
                )))
            }
        }
    }

    /// Build an id from named key values; every primary key is required.
    ///
    /// Values for fields that are not primary keys are ignored.
    #[allow(clippy::result_large_err)]
    pub fn from_keys<I, K, V>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let given: Vec<(String, Value)> = values
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();

        let mut keys = Vec::new();
        for field in M::schema().primary_keys() {
            let value = given
                .iter()
                .find(|(name, value)| name == field.name && !value.is_null())
                .map(|(_, value)| value.clone())
                .ok_or_else(|| {
                    let names: Vec<&str> = given.iter().map(|(n, _)| n.as_str()).collect();
                    primary_key_error(format!(
                        "cannot build a {} id, missing key: {} in {:?}",
                        M::NAME,
                        field.name,
                        names
                    ))
                })?;
            keys.push((field.name, value));
        }
        Ok(Self {
            keys,
            _marker: PhantomData,
        })
    }

    /// Identity of an existing instance.
    #[allow(clippy::result_large_err)]
    pub fn of(instance: &M) -> Result<Self> {
        let names = M::schema().primary_keys().map(|f| f.name);
        Self::from_keys(names.zip(instance.primary_key_value()))
    }

    /// `(field, value)` pairs in schema order.
    pub fn keys(&self) -> &[(&'static str, Value)] {
        &self.keys
    }
}

fn primary_key_error(message: String) -> Error {
    Error::Schema(SchemaError {
        kind: SchemaErrorKind::PrimaryKey,
        model: None,
        message,
    })
}

impl<M: Model> Clone for ModelId<M> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> PartialEq for ModelId<M> {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl<M: Model> fmt::Debug for ModelId<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelId")
            .field("model", &M::NAME)
            .field("keys", &self.keys)
            .finish()
    }
}
