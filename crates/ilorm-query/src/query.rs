//! Typed query builder and execution.
//!
//! A [`Query`] targets one [`Model`] on one [`Connector`]. Filters are added
//! through the field proxy returned by [`Query::field`]:
//!
//! ```ignore
//! let people = Query::<User, _>::new(connector)
//!     .field("lastName").is("Daix")
//!     .field("age").between(25, 35)
//!     .or(|or| {
//!         or.branch(|b| b.field("firstName").is("Guillaume"));
//!         or.branch(|b| b.field("firstName").is("Tom"));
//!     })
//!     .find(&cx)
//!     .await;
//! ```
//!
//! Builder mistakes (an undeclared field, an operand the field kind cannot
//! hold) do not panic: the first one is recorded and every execution
//! operation reports it.

use crate::stream::{self, ModelStream, Projector};
use asupersync::{Cx, Outcome};
use futures::StreamExt;
use futures::channel::oneshot;
use ilorm_core::{
    Condition, Connector, Error, FieldInfo, Link, Model, ModelId, Operator, ProtocolError,
    ProtocolErrorKind, QueryState, ResolutionBody, ResolutionErrorKind, Result, Row,
    SchemaError, SchemaErrorKind, SortOrder, TypeError, Value,
};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A builder error kept until the query is executed.
#[derive(Debug, Clone)]
enum InvalidFilter {
    Schema {
        kind: SchemaErrorKind,
        model: Option<&'static str>,
        message: String,
    },
    Type {
        expected: &'static str,
        actual: String,
        column: Option<String>,
    },
    Other(String),
}

impl InvalidFilter {
    fn to_error(&self) -> Error {
        match self {
            InvalidFilter::Schema {
                kind,
                model,
                message,
            } => Error::Schema(SchemaError {
                kind: *kind,
                model: *model,
                message: message.clone(),
            }),
            InvalidFilter::Type {
                expected,
                actual,
                column,
            } => Error::Type(TypeError {
                expected: *expected,
                actual: actual.clone(),
                column: column.clone(),
            }),
            InvalidFilter::Other(message) => Error::Custom(message.clone()),
        }
    }
}

impl From<Error> for InvalidFilter {
    fn from(error: Error) -> Self {
        match error {
            Error::Schema(e) => InvalidFilter::Schema {
                kind: e.kind,
                model: e.model,
                message: e.message,
            },
            Error::Type(e) => InvalidFilter::Type {
                expected: e.expected,
                actual: e.actual,
                column: e.column,
            },
            other => InvalidFilter::Other(other.to_string()),
        }
    }
}

/// Anything filters can be attached to: a query or one OR branch.
pub trait Filterable: Sized {
    type Model: Model;

    #[doc(hidden)]
    fn filter_state(&mut self) -> &mut QueryState;

    /// Record a builder error; the first one wins.
    #[doc(hidden)]
    fn reject(&mut self, error: Error);
}

fn field_proxy<Q: Filterable>(mut owner: Q, name: &str) -> FieldFilter<Q> {
    let field = match Q::Model::schema().require_field(name) {
        Ok(field) => Some(field),
        Err(e) => {
            owner.reject(e);
            None
        }
    };
    FieldFilter { owner, field }
}

fn keep_first(slot: &mut Option<InvalidFilter>, error: Error) {
    if slot.is_none() {
        tracing::debug!(error = %error, "query builder rejected a filter");
        *slot = Some(InvalidFilter::from(error));
    }
}

fn with_column(error: Error, column: &str) -> Error {
    match error {
        Error::Type(mut te) => {
            te.column.get_or_insert_with(|| column.to_string());
            Error::Type(te)
        }
        other => other,
    }
}

/// Operators applicable to one field; each returns the owning builder.
#[must_use = "a field filter does nothing until an operator is applied"]
pub struct FieldFilter<Q> {
    owner: Q,
    field: Option<&'static FieldInfo>,
}

impl<Q: Filterable> FieldFilter<Q> {
    fn apply(mut self, operator: Operator, value: Value) -> Q {
        let Some(field) = self.field else {
            return self.owner;
        };
        match field.kind.cast(value) {
            Ok(value) => self
                .owner
                .filter_state()
                .push_condition(Condition::new(field.name, operator, value)),
            Err(e) => self.owner.reject(with_column(e, field.name)),
        }
        self.owner
    }

    fn apply_raw(mut self, operator: Operator, value: Value) -> Q {
        if let Some(field) = self.field {
            self.owner
                .filter_state()
                .push_condition(Condition::new(field.name, operator, value));
        }
        self.owner
    }

    pub fn is(self, value: impl Into<Value>) -> Q {
        self.apply(Operator::Is, value.into())
    }

    pub fn is_not(self, value: impl Into<Value>) -> Q {
        self.apply(Operator::IsNot, value.into())
    }

    pub fn is_in<I, V>(self, values: I) -> Q
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.apply(Operator::IsIn, list(values))
    }

    pub fn is_not_in<I, V>(self, values: I) -> Q
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.apply(Operator::IsNotIn, list(values))
    }

    /// Inclusive range.
    pub fn between(self, min: impl Into<Value>, max: impl Into<Value>) -> Q {
        self.apply(Operator::Between, Value::Array(vec![min.into(), max.into()]))
    }

    pub fn not_between(self, min: impl Into<Value>, max: impl Into<Value>) -> Q {
        self.apply(
            Operator::NotBetween,
            Value::Array(vec![min.into(), max.into()]),
        )
    }

    pub fn greater_than(self, value: impl Into<Value>) -> Q {
        self.apply(Operator::GreaterThan, value.into())
    }

    pub fn greater_or_equal(self, value: impl Into<Value>) -> Q {
        self.apply(Operator::GreaterOrEqual, value.into())
    }

    pub fn lower_than(self, value: impl Into<Value>) -> Q {
        self.apply(Operator::LowerThan, value.into())
    }

    pub fn lower_or_equal(self, value: impl Into<Value>) -> Q {
        self.apply(Operator::LowerOrEqual, value.into())
    }

    /// SQL-style pattern match: `%` matches any run of characters, `_` one.
    pub fn like(self, pattern: impl Into<String>) -> Q {
        self.apply_raw(Operator::Like, Value::Text(pattern.into()))
    }

    pub fn exists(self, present: bool) -> Q {
        self.apply_raw(Operator::Exists, Value::Bool(present))
    }
}

fn list<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Value::Array(values.into_iter().map(Into::into).collect())
}

/// One branch of an OR group.
pub struct Branch<M: Model> {
    state: QueryState,
    invalid: Option<InvalidFilter>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Branch<M> {
    fn new() -> Self {
        Self {
            state: QueryState::new(M::NAME),
            invalid: None,
            _marker: PhantomData,
        }
    }

    pub fn field(self, name: &str) -> FieldFilter<Self> {
        field_proxy(self, name)
    }
}

impl<M: Model> Filterable for Branch<M> {
    type Model = M;

    fn filter_state(&mut self) -> &mut QueryState {
        &mut self.state
    }

    fn reject(&mut self, error: Error) {
        keep_first(&mut self.invalid, error);
    }
}

/// Collects the branches of one OR group.
pub struct OrBuilder<M: Model> {
    branches: Vec<Branch<M>>,
}

impl<M: Model> OrBuilder<M> {
    /// Add a branch; a record matches the group when any branch matches.
    pub fn branch(&mut self, build: impl FnOnce(Branch<M>) -> Branch<M>) -> &mut Self {
        self.branches.push(build(Branch::new()));
        self
    }
}

/// A query against model `M` served by connector `C`.
pub struct Query<M: Model, C: Connector> {
    connector: Arc<C>,
    state: QueryState,
    invalid: Option<InvalidFilter>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model, C: Connector> Filterable for Query<M, C> {
    type Model = M;

    fn filter_state(&mut self) -> &mut QueryState {
        &mut self.state
    }

    fn reject(&mut self, error: Error) {
        keep_first(&mut self.invalid, error);
    }
}

impl<M: Model, C: Connector> Query<M, C> {
    /// An unfiltered query over every `M` record.
    pub fn new(connector: Arc<C>) -> Self {
        Self {
            connector,
            state: QueryState::new(M::NAME),
            invalid: None,
            _marker: PhantomData,
        }
    }

    /// A query matching the record identified by `id`.
    pub fn by_id(connector: Arc<C>, id: &ModelId<M>) -> Self {
        id.keys()
            .iter()
            .fold(Self::new(connector), |query, (name, value)| {
                query.field(name).is(value.clone())
            })
    }

    /// Start a filter on `name`.
    pub fn field(self, name: &str) -> FieldFilter<Self> {
        field_proxy(self, name)
    }

    /// Add an OR group of independent branches.
    pub fn or(mut self, build: impl FnOnce(&mut OrBuilder<M>)) -> Self {
        let mut group = OrBuilder {
            branches: Vec::new(),
        };
        build(&mut group);
        let mut branches = Vec::with_capacity(group.branches.len());
        for branch in group.branches {
            if let Some(invalid) = branch.invalid {
                keep_first(&mut self.invalid, invalid.to_error());
            }
            branches.push(branch.state);
        }
        self.state.push_or_group(branches);
        self
    }

    /// Restrict `field` to the values `target_field` takes in the records
    /// matched by `other`.
    ///
    /// The query then becomes a linked query: the connector resolves `other`
    /// inside its complex query resolution.
    pub fn linked_with<N: Model, D: Connector>(
        mut self,
        field: &str,
        target_field: &str,
        other: Query<N, D>,
    ) -> Self {
        if let Err(e) = M::schema().require_field(field) {
            self.reject(e);
            return self;
        }
        if let Err(e) = N::schema().require_field(target_field) {
            self.reject(e);
            return self;
        }
        if let Some(invalid) = &other.invalid {
            self.reject(invalid.to_error());
            return self;
        }
        self.state.push_link(Link {
            field: field.to_string(),
            target_field: target_field.to_string(),
            query: other.state,
        });
        self
    }

    /// Keep only these fields in projected records.
    pub fn select(mut self, fields: &[&str]) -> Self {
        let schema = M::schema();
        for name in fields {
            if let Err(e) = schema.require_field(name) {
                self.reject(e);
                return self;
            }
        }
        self.state
            .set_select(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        match M::schema().require_field(field) {
            Ok(info) => self.state.push_sort(info.name, order),
            Err(e) => self.reject(e),
        }
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.state.set_skip(Some(n));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.state.set_limit(Some(n));
        self
    }

    /// The filter tree handed to the connector.
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// The first builder error, if any.
    pub fn error(&self) -> Option<Error> {
        self.invalid.as_ref().map(InvalidFilter::to_error)
    }

    fn project_row(&self, row: Row) -> Result<M> {
        let row = row.project(self.state.selected());
        M::from_row(&row)
    }

    /// Stream typed results.
    ///
    /// Linked queries are served through the connector's complex query
    /// resolution, which starts on the first pull.
    pub async fn stream<'a>(&'a self, cx: &'a Cx) -> Outcome<ModelStream<'a, M, C::Cursor>, Error> {
        if let Some(invalid) = &self.invalid {
            return Outcome::Err(invalid.to_error());
        }
        let project: Projector<'a, M> = Box::new(move |row: Row| self.project_row(row));
        stream::open(cx, &*self.connector, &self.state, M::NAME, project).await
    }

    /// Fetch every matching instance.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn find(&self, cx: &Cx) -> Outcome<Vec<M>, Error> {
        if let Some(invalid) = &self.invalid {
            return Outcome::Err(invalid.to_error());
        }
        if self.state.has_linked_sub_queries() {
            let stream = match self.stream(cx).await {
                Outcome::Ok(stream) => stream,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            return into_outcome(stream.try_collect().await);
        }

        let rows = self.connector.find(cx, &self.state).await;
        rows.and_then(|rows| {
            tracing::debug!(row_count = rows.len(), "projecting rows");
            let mut models = Vec::with_capacity(rows.len());
            for (position, row) in rows.into_iter().enumerate() {
                match self.project_row(row) {
                    Ok(model) => models.push(model),
                    Err(e) => return Outcome::Err(stream::projection_error(M::NAME, position, e)),
                }
            }
            Outcome::Ok(models)
        })
    }

    /// Fetch the first matching instance.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn find_one(&self, cx: &Cx) -> Outcome<Option<M>, Error> {
        if let Some(invalid) = &self.invalid {
            return Outcome::Err(invalid.to_error());
        }
        if self.state.has_linked_sub_queries() {
            let mut stream = match self.stream(cx).await {
                Outcome::Ok(stream) => stream,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let first = stream.next().await.transpose();
            let closed = stream.close().await;
            return into_outcome(first.and_then(|first| closed.map(|()| first)));
        }

        let row = self.connector.find_one(cx, &self.state).await;
        row.and_then(|row| match row {
            Some(row) => match self.project_row(row) {
                Ok(model) => Outcome::Ok(Some(model)),
                Err(e) => Outcome::Err(stream::projection_error(M::NAME, 0, e)),
            },
            None => Outcome::Ok(None),
        })
    }

    /// Count matching records.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn count(&self, cx: &Cx) -> Outcome<u64, Error> {
        if let Some(invalid) = &self.invalid {
            return Outcome::Err(invalid.to_error());
        }
        self.run(cx, || self.connector.count(cx, &self.state)).await
    }

    /// Apply `changes` to every matching record; returns the number changed.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn update(&self, cx: &Cx, changes: &[(&str, Value)]) -> Outcome<u64, Error> {
        let changes = match self.checked_changes(changes) {
            Ok(changes) => changes,
            Err(e) => return Outcome::Err(e),
        };
        self.run(cx, || self.connector.update(cx, &self.state, &changes))
            .await
    }

    /// Apply `changes` to the first matching record.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn update_one(&self, cx: &Cx, changes: &[(&str, Value)]) -> Outcome<u64, Error> {
        let changes = match self.checked_changes(changes) {
            Ok(changes) => changes,
            Err(e) => return Outcome::Err(e),
        };
        self.run(cx, || self.connector.update_one(cx, &self.state, &changes))
            .await
    }

    /// Delete every matching record; returns the number deleted.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn remove(&self, cx: &Cx) -> Outcome<u64, Error> {
        if let Some(invalid) = &self.invalid {
            return Outcome::Err(invalid.to_error());
        }
        self.run(cx, || self.connector.remove(cx, &self.state)).await
    }

    /// Delete the first matching record.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME, query = self.state.id().get()))]
    pub async fn remove_one(&self, cx: &Cx) -> Outcome<u64, Error> {
        if let Some(invalid) = &self.invalid {
            return Outcome::Err(invalid.to_error());
        }
        self.run(cx, || self.connector.remove_one(cx, &self.state))
            .await
    }

    fn checked_changes(&self, changes: &[(&str, Value)]) -> Result<Vec<(String, Value)>> {
        if let Some(invalid) = &self.invalid {
            return Err(invalid.to_error());
        }
        let schema = M::schema();
        changes
            .iter()
            .map(|(name, value)| {
                let field = schema.require_field(name)?;
                let value = field
                    .kind
                    .cast(value.clone())
                    .map_err(|e| with_column(e, field.name))?;
                schema.check(field.name, &value)?;
                Ok((field.name.to_string(), value))
            })
            .collect()
    }

    /// Run a connector operation, inside the complex query resolution when
    /// the query has linked sub-queries.
    async fn run<'a, T, F, Fut>(&'a self, cx: &'a Cx, op: F) -> Outcome<T, Error>
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Outcome<T, Error>> + Send + 'a,
        T: Send + 'a,
    {
        if !self.state.has_linked_sub_queries() {
            return op().await;
        }

        tracing::debug!(
            links = self.state.linked().len(),
            "running inside complex query resolution"
        );
        let (tx, mut rx) = oneshot::channel();
        let body = ResolutionBody::new(async move {
            match op().await {
                Outcome::Ok(value) => {
                    let _ = tx.send(value);
                    Outcome::Ok(())
                }
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        });

        match self
            .connector
            .resolve_complex_query(cx, &self.state, body)
            .await
        {
            Outcome::Ok(()) => match rx.try_recv() {
                Ok(Some(value)) => Outcome::Ok(value),
                _ => Outcome::Err(Error::Protocol(ProtocolError::new(
                    ProtocolErrorKind::MissingContinuation,
                    "resolution finished without running the operation",
                ))),
            },
            Outcome::Err(e) => Outcome::Err(e.into_resolution(ResolutionErrorKind::ProcedureFailed)),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl<M: Model, C: Connector> Clone for Query<M, C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            state: self.state.clone(),
            invalid: self.invalid.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model, C: Connector> std::fmt::Debug for Query<M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("model", &M::NAME)
            .field("connector", &self.connector.name())
            .field("state", &self.state)
            .field("invalid", &self.invalid)
            .finish()
    }
}

fn into_outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Person, ScriptedConnector, Step, person};
    use asupersync::runtime::RuntimeBuilder;

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(value) => value,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn people(connector: &Arc<ScriptedConnector>) -> Query<Person, ScriptedConnector> {
        Query::new(Arc::clone(connector))
    }

    #[test]
    fn test_field_filters_build_conditions() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector)
            .field("name")
            .is("Guillaume")
            .field("id")
            .between(1, "10")
            .field("teamId")
            .is_in([1, 2])
            .field("name")
            .like("G%");

        assert!(query.error().is_none());
        let conditions = query.state().conditions();
        assert_eq!(conditions.len(), 4);
        assert_eq!(conditions[0], Condition::new("name", Operator::Is, "Guillaume"));
        assert_eq!(
            conditions[1].value,
            Value::Array(vec![Value::BigInt(1), Value::BigInt(10)])
        );
        assert_eq!(conditions[2].operator, Operator::IsIn);
        assert_eq!(conditions[3].value, Value::from("G%"));
    }

    #[test]
    fn test_string_field_casts_numbers() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector).field("name").is(42);
        assert_eq!(query.state().conditions()[0].value, Value::from("42"));
    }

    #[test]
    fn test_unknown_field_is_reported() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector).field("fakeField").is("x");
        let err = query.error().expect("builder error");
        assert_eq!(
            err.to_string(),
            "Schema error: The property fakeField does not exists in the defined schema."
        );
        assert!(query.state().conditions().is_empty());

        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            assert!(matches!(query.find(&cx).await, Outcome::Err(Error::Schema(_))));
            assert!(matches!(query.count(&cx).await, Outcome::Err(Error::Schema(_))));
        });
        assert!(connector.events.snapshot().is_empty());
    }

    #[test]
    fn test_uncastable_operand_is_reported() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector).field("id").is("not a number");
        match query.error() {
            Some(Error::Type(te)) => assert_eq!(te.column.as_deref(), Some("id")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_or_branches_are_independent() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector).field("id").greater_than(0).or(|or| {
            or.branch(|b| b.field("name").is("Guillaume"));
            or.branch(|b| b.field("name").is("Tom").field("id").lower_than(5));
        });

        let groups = query.state().or_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][0].conditions().len(), 1);
        assert_eq!(groups[0][1].conditions().len(), 2);
        assert_eq!(query.state().conditions().len(), 1);
    }

    #[test]
    fn test_or_branch_error_reaches_query() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector).or(|or| {
            or.branch(|b| b.field("nickname").is("G"));
        });
        assert!(matches!(query.error(), Some(Error::Schema(_))));
    }

    #[test]
    fn test_find_projects_selected_fields() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector::with_rows([
            person(1, "Guillaume"),
            person(2, "Tom"),
        ]));

        rt.block_on(async {
            let found = unwrap_outcome(people(&connector).find(&cx).await);
            assert_eq!(found.len(), 2);
            assert_eq!(found[1].name, "Tom");

            let narrowed = people(&connector).select(&["id"]);
            let err = match narrowed.find(&cx).await {
                Outcome::Err(e) => e,
                _ => panic!("projection should fail without `name`"),
            };
            match err {
                Error::Projection(p) => assert_eq!(p.position, 0),
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn test_non_linked_operations_delegate() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector::with_rows([
            person(1, "Guillaume"),
            person(2, "Tom"),
        ]));

        rt.block_on(async {
            let query = people(&connector).field("name").is("Tom");
            assert_eq!(unwrap_outcome(query.count(&cx).await), 2);
            assert_eq!(
                unwrap_outcome(query.update(&cx, &[("name", Value::from("Thomas"))]).await),
                2
            );
            assert_eq!(unwrap_outcome(query.update_one(&cx, &[("id", Value::from("3"))]).await), 1);
            assert_eq!(unwrap_outcome(query.remove(&cx).await), 2);
            assert_eq!(unwrap_outcome(query.remove_one(&cx).await), 1);
            assert_eq!(
                unwrap_outcome(query.find_one(&cx).await).map(|p| p.id),
                Some(1)
            );
        });

        assert_eq!(
            *connector.last_changes.lock().unwrap(),
            vec![("id".to_string(), Value::BigInt(3))]
        );
        assert_eq!(connector.events.count("setup"), 0);
        let last = connector.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(last.conditions()[0], Condition::new("name", Operator::Is, "Tom"));
    }

    #[test]
    fn test_update_rejects_bad_changes() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector::with_rows([person(1, "a")]));

        rt.block_on(async {
            let query = people(&connector);
            assert!(matches!(
                query.update(&cx, &[("nickname", Value::from("x"))]).await,
                Outcome::Err(Error::Schema(_))
            ));
            assert!(matches!(
                query.update(&cx, &[("name", Value::Null)]).await,
                Outcome::Err(Error::Schema(_))
            ));
        });
        assert_eq!(connector.events.count("update"), 0);
    }

    fn linked_people(connector: &Arc<ScriptedConnector>) -> Query<Person, ScriptedConnector> {
        let teams = people(connector).field("name").is("core");
        people(connector).linked_with("teamId", "id", teams)
    }

    #[test]
    fn test_linked_operations_run_inside_resolution() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector::with_rows([
            person(1, "Guillaume"),
            person(2, "Tom"),
        ]));

        rt.block_on(async {
            let query = linked_people(&connector);
            assert!(query.state().has_linked_sub_queries());
            assert_eq!(unwrap_outcome(query.count(&cx).await), 2);
        });
        assert_eq!(
            connector.events.snapshot(),
            vec!["setup", "count", "teardown"]
        );
    }

    #[test]
    fn test_linked_find_streams_and_find_one_aborts() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector::with_rows([
            person(1, "Guillaume"),
            person(2, "Tom"),
            person(3, "Ana"),
        ]));

        rt.block_on(async {
            let query = linked_people(&connector);
            let all = unwrap_outcome(query.find(&cx).await);
            assert_eq!(all.len(), 3);
            assert_eq!(connector.events.count("teardown"), 1);

            let first = unwrap_outcome(query.find_one(&cx).await);
            assert_eq!(first.map(|p| p.name), Some("Guillaume".to_string()));
            assert_eq!(connector.events.count("teardown"), 2);
            assert_eq!(connector.events.count("close"), 2);
        });
    }

    #[test]
    fn test_linked_find_projection_failure_tears_down_once() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector::with_rows([
            person(1, "Guillaume"),
            Row::from_pairs([("id", Value::BigInt(2)), ("name", Value::BigInt(9))]),
            person(3, "Ana"),
        ]));

        rt.block_on(async {
            match linked_people(&connector).find(&cx).await {
                Outcome::Err(e) => assert!(e.is_projection_failure()),
                _ => panic!("expected a projection failure"),
            }
        });
        assert_eq!(connector.events.count("teardown"), 1);
        assert_eq!(connector.events.count("close"), 1);
        assert!(
            connector.events.position("close").unwrap()
                < connector.events.position("teardown").unwrap()
        );
        assert_eq!(connector.events.count("pull:3"), 0);
    }

    #[test]
    fn test_linked_setup_failure_is_resolution_failure() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let connector = Arc::new(ScriptedConnector {
            fail_setup: true,
            steps: vec![Step::Row(person(1, "a"))],
            ..ScriptedConnector::default()
        });

        rt.block_on(async {
            let query = linked_people(&connector);
            match query.remove(&cx).await {
                Outcome::Err(e) => assert!(e.is_resolution_failure()),
                _ => panic!("expected a resolution failure"),
            }
        });
        assert_eq!(connector.events.count("remove"), 0);
    }

    #[test]
    fn test_linked_with_validates_fields() {
        let connector = Arc::new(ScriptedConnector::default());
        let query = people(&connector).linked_with("team", "id", people(&connector));
        assert!(matches!(query.error(), Some(Error::Schema(_))));
        assert!(!query.state().has_linked_sub_queries());
    }

    #[test]
    fn test_by_id_filters_on_primary_key() {
        let connector = Arc::new(ScriptedConnector::default());
        let id = ModelId::<Person>::new(7_i64).unwrap();
        let query = Query::by_id(connector, &id);
        assert_eq!(
            query.state().conditions(),
            &[Condition::new("id", Operator::Is, 7_i64)]
        );
    }
}
