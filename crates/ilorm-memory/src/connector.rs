//! In-memory connector.

use crate::config::MemoryConfig;
use crate::cursor::MemoryCursor;
use crate::predicate::Predicate;
use asupersync::{Cx, Outcome};
use ilorm_core::{
    Connector, ConnectorError, ConnectorErrorKind, Error, Link, QueryId, QueryState,
    ResolutionBody, Result, Row, SortOrder, Value,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Values a field is restricted to while a linked query is being served.
type Restriction = Vec<(String, Vec<Value>)>;

type Tables = HashMap<String, Vec<Row>>;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) resolutions_started: AtomicUsize,
    pub(crate) resolutions_finished: AtomicUsize,
    pub(crate) cursors_opened: AtomicUsize,
    pub(crate) cursors_closed: AtomicUsize,
}

/// Connector statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Complex query resolutions that ran their setup
    pub resolutions_started: usize,
    /// Complex query resolutions that ran their teardown
    pub resolutions_finished: usize,
    /// Linked-query restrictions currently registered
    pub active_restrictions: usize,
    /// Cursors handed out by `stream`
    pub cursors_opened: usize,
    /// Cursors explicitly closed
    pub cursors_closed: usize,
}

/// A connector keeping every model's records in memory.
///
/// Linked sub-queries are resolved inside `resolve_complex_query`: the
/// values each link allows are computed up front and registered for the
/// query until the body returns.
pub struct MemoryConnector {
    config: MemoryConfig,
    tables: Mutex<Tables>,
    restrictions: Mutex<HashMap<QueryId, Vec<Restriction>>>,
    counters: Arc<Counters>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryConnector {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            tables: Mutex::new(HashMap::new()),
            restrictions: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Store rows for `model` without going through a context.
    pub fn seed<I>(&self, model: &str, rows: I)
    where
        I: IntoIterator<Item = Row>,
    {
        let mut tables = self.tables();
        let table = tables.entry(model.to_string()).or_default();
        let before = table.len();
        table.extend(rows);
        tracing::debug!(
            connector = %self.config.name,
            model,
            added = table.len() - before,
            "seeded rows"
        );
    }

    /// Snapshot of the rows stored for `model`, in insertion order.
    pub fn rows(&self, model: &str) -> Vec<Row> {
        self.tables().get(model).cloned().unwrap_or_default()
    }

    pub fn stats(&self) -> MemoryStats {
        let active_restrictions = self
            .restrictions()
            .values()
            .map(Vec::len)
            .sum();
        MemoryStats {
            resolutions_started: self.counters.resolutions_started.load(AtomicOrdering::Relaxed),
            resolutions_finished: self
                .counters
                .resolutions_finished
                .load(AtomicOrdering::Relaxed),
            active_restrictions,
            cursors_opened: self.counters.cursors_opened.load(AtomicOrdering::Relaxed),
            cursors_closed: self.counters.cursors_closed.load(AtomicOrdering::Relaxed),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn restrictions(&self) -> MutexGuard<'_, HashMap<QueryId, Vec<Restriction>>> {
        self.restrictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn error(&self, kind: ConnectorErrorKind, message: String) -> Error {
        Error::Connector(ConnectorError {
            kind,
            connector: Some(self.config.name.clone()),
            message,
            source: None,
        })
    }

    /// The restriction registered for a linked query.
    ///
    /// Linked queries can only be served inside their complex resolution.
    fn restriction_for(&self, query: &QueryState) -> Result<Restriction> {
        if !query.has_linked_sub_queries() {
            return Ok(Vec::new());
        }
        self.restrictions()
            .get(&query.id())
            .and_then(|stack| stack.last())
            .cloned()
            .ok_or_else(|| {
                self.error(
                    ConnectorErrorKind::Unsupported,
                    format!(
                        "linked query on {} served outside its complex query resolution",
                        query.model()
                    ),
                )
            })
    }

    /// Compute the values every link of `query` allows.
    fn resolve_links(&self, tables: &Tables, query: &QueryState) -> Result<Restriction> {
        query
            .linked()
            .iter()
            .map(|link| self.link_values(tables, link).map(|v| (link.field.clone(), v)))
            .collect()
    }

    fn link_values(&self, tables: &Tables, link: &Link) -> Result<Vec<Value>> {
        let nested = self.resolve_links(tables, &link.query)?;
        let indices = self.matching(tables, &link.query, &nested)?;
        let rows = tables.get(link.query.model()).map(Vec::as_slice).unwrap_or(&[]);
        let mut values: Vec<Value> = Vec::new();
        for index in indices {
            if let Some(value) = rows[index].get_by_name(&link.target_field) {
                if !value.is_null() && !values.iter().any(|v| v.loose_eq(value)) {
                    values.push(value.clone());
                }
            }
        }
        tracing::trace!(
            field = %link.field,
            target = %link.target_field,
            model = link.query.model(),
            values = values.len(),
            "link resolved"
        );
        Ok(values)
    }

    /// Indices of the rows of `query.model()` matching the query, ordered and
    /// paged.
    fn matching(&self, tables: &Tables, query: &QueryState, restriction: &[(String, Vec<Value>)]) -> Result<Vec<usize>> {
        let Some(rows) = tables.get(query.model()) else {
            return Ok(Vec::new());
        };
        let predicate = Predicate::compile(query)?;

        let mut indices: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| predicate.matches(row) && allowed(row, restriction))
            .map(|(i, _)| i)
            .collect();

        if !query.sort().is_empty() {
            indices.sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], query.sort()));
        }

        let skip = query.skip().map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let limit = query
            .limit()
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        Ok(indices.into_iter().skip(skip).take(limit).collect())
    }

    fn select_rows(&self, query: &QueryState) -> Result<Vec<Row>> {
        let restriction = self.restriction_for(query)?;
        let tables = self.tables();
        let indices = self.matching(&tables, query, &restriction)?;
        let rows = tables.get(query.model()).map(Vec::as_slice).unwrap_or(&[]);
        Ok(indices.into_iter().map(|i| rows[i].clone()).collect())
    }

    fn apply_update(&self, query: &QueryState, changes: &[(String, Value)], first_only: bool) -> Result<u64> {
        let restriction = self.restriction_for(query)?;
        let mut tables = self.tables();
        let mut indices = self.matching(&tables, query, &restriction)?;
        if first_only {
            indices.truncate(1);
        }
        let Some(rows) = tables.get_mut(query.model()) else {
            return Ok(0);
        };
        for &index in &indices {
            rows[index] = with_changes(&rows[index], changes);
        }
        Ok(indices.len() as u64)
    }

    fn apply_remove(&self, query: &QueryState, first_only: bool) -> Result<u64> {
        let restriction = self.restriction_for(query)?;
        let mut tables = self.tables();
        let mut indices = self.matching(&tables, query, &restriction)?;
        if first_only {
            indices.truncate(1);
        }
        let Some(rows) = tables.get_mut(query.model()) else {
            return Ok(0);
        };
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for &index in &indices {
            rows.remove(index);
        }
        Ok(indices.len() as u64)
    }

    fn setup(&self, query: &QueryState) -> Result<()> {
        let restriction = {
            let tables = self.tables();
            self.resolve_links(&tables, query)?
        };
        self.restrictions()
            .entry(query.id())
            .or_default()
            .push(restriction);
        Ok(())
    }
}

/// Removes a query's restriction when the resolution ends, however it ends.
struct Teardown<'a> {
    connector: &'a MemoryConnector,
    query: QueryId,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        let mut restrictions = self.connector.restrictions();
        if let Some(stack) = restrictions.get_mut(&self.query) {
            stack.pop();
            if stack.is_empty() {
                restrictions.remove(&self.query);
            }
        }
        drop(restrictions);
        self.connector
            .counters
            .resolutions_finished
            .fetch_add(1, AtomicOrdering::Relaxed);
        tracing::debug!(
            connector = %self.connector.config.name,
            query = self.query.get(),
            "complex query resolution torn down"
        );
    }
}

fn allowed(row: &Row, restriction: &[(String, Vec<Value>)]) -> bool {
    restriction.iter().all(|(field, values)| {
        row.get_by_name(field)
            .is_some_and(|value| values.iter().any(|v| v.loose_eq(value)))
    })
}

fn compare_rows(a: &Row, b: &Row, sort: &[(String, SortOrder)]) -> Ordering {
    for (field, order) in sort {
        let left = a.get_by_name(field).unwrap_or(&Value::Null);
        let right = b.get_by_name(field).unwrap_or(&Value::Null);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            // NULLs sort last in ascending order.
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
        };
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn with_changes(row: &Row, changes: &[(String, Value)]) -> Row {
    let mut pairs: Vec<(String, Value)> = row
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    for (field, value) in changes {
        match pairs.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => slot.1 = value.clone(),
            None => pairs.push((field.clone(), value.clone())),
        }
    }
    Row::from_pairs(pairs)
}

fn into_outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e),
    }
}

impl Connector for MemoryConnector {
    type Cursor = MemoryCursor;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn stream(
        &self,
        _cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<MemoryCursor, Error>> + Send {
        async move {
            let rows = match self.select_rows(query) {
                Ok(rows) => rows,
                Err(e) => return Outcome::Err(e),
            };
            tracing::debug!(
                connector = %self.config.name,
                model = query.model(),
                rows = rows.len(),
                "opening memory cursor"
            );
            Outcome::Ok(MemoryCursor::new(
                rows,
                &self.config,
                Arc::clone(&self.counters),
            ))
        }
    }

    fn resolve_complex_query<'a>(
        &'a self,
        _cx: &'a Cx,
        query: &'a QueryState,
        body: ResolutionBody<'a>,
    ) -> impl Future<Output = Outcome<(), Error>> + Send + 'a {
        async move {
            self.counters
                .resolutions_started
                .fetch_add(1, AtomicOrdering::Relaxed);
            tracing::debug!(
                connector = %self.config.name,
                query = query.id().get(),
                links = query.linked().len(),
                "complex query resolution started"
            );

            if let Err(e) = self.setup(query) {
                tracing::debug!(error = %e, "link resolution failed");
                self.counters
                    .resolutions_finished
                    .fetch_add(1, AtomicOrdering::Relaxed);
                return Outcome::Err(e);
            }
            let teardown = Teardown {
                connector: self,
                query: query.id(),
            };

            let outcome = body.await;
            drop(teardown);
            outcome
        }
    }

    fn count(&self, _cx: &Cx, query: &QueryState) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move { into_outcome(self.select_rows(query).map(|rows| rows.len() as u64)) }
    }

    fn update(
        &self,
        _cx: &Cx,
        query: &QueryState,
        changes: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move { into_outcome(self.apply_update(query, changes, false)) }
    }

    fn update_one(
        &self,
        _cx: &Cx,
        query: &QueryState,
        changes: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move { into_outcome(self.apply_update(query, changes, true)) }
    }

    fn remove(&self, _cx: &Cx, query: &QueryState) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move { into_outcome(self.apply_remove(query, false)) }
    }

    fn remove_one(
        &self,
        _cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move { into_outcome(self.apply_remove(query, true)) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        model: &str,
        row: Row,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            self.seed(model, [row]);
            Outcome::Ok(())
        }
    }
}
