//! Scripted connector shared by the unit tests of this crate.

use asupersync::{Cx, Outcome};
use ilorm_core::{
    ConnectorError, ConnectorErrorKind, Connector, Error, FieldInfo, FieldKind, Model,
    QueryState, ResolutionBody, Result, Row, RowCursor, Value,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Shared, ordered event log.
#[derive(Clone, Default)]
pub(crate) struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub(crate) fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub(crate) fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }
}

/// One scripted cursor step.
#[derive(Clone)]
pub(crate) enum Step {
    Row(Row),
    Fail(&'static str),
}

pub(crate) fn person(id: i64, name: &str) -> Row {
    Row::from_pairs([("id", Value::BigInt(id)), ("name", Value::from(name))])
}

/// A cursor replaying a fixed script.
pub(crate) struct ScriptedCursor {
    steps: VecDeque<Step>,
    pulled: usize,
    pending_before_each: usize,
    pending_left: usize,
    closed: bool,
    events: Events,
}

impl RowCursor for ScriptedCursor {
    fn poll_readable(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.events.push("readable");
        Poll::Ready(Ok(()))
    }

    fn poll_next_row(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Row>>> {
        if self.closed {
            return Poll::Ready(None);
        }
        if self.pending_left > 0 {
            self.pending_left -= 1;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.pending_left = self.pending_before_each;
        match self.steps.pop_front() {
            Some(Step::Row(row)) => {
                self.pulled += 1;
                self.events.push(format!("pull:{}", self.pulled));
                Poll::Ready(Some(Ok(row)))
            }
            Some(Step::Fail(message)) => {
                self.events.push("pull:error");
                Poll::Ready(Some(Err(Error::Custom(message.to_string()))))
            }
            None => {
                self.events.push("drained");
                Poll::Ready(None)
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.events.push("close");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A connector serving one scripted cursor per query.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    pub(crate) steps: Vec<Step>,
    pub(crate) fail_stream: bool,
    pub(crate) fail_setup: bool,
    pub(crate) skip_body: bool,
    pub(crate) pending_before_each: usize,
    pub(crate) events: Events,
    pub(crate) last_query: Mutex<Option<QueryState>>,
    pub(crate) last_changes: Mutex<Vec<(String, Value)>>,
}

impl ScriptedConnector {
    pub(crate) fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            steps: rows.into_iter().map(Step::Row).collect(),
            ..Self::default()
        }
    }

    fn record(&self, op: &str, query: &QueryState) {
        self.events.push(op);
        *self.last_query.lock().unwrap() = Some(query.clone());
    }

    fn row_count(&self) -> u64 {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Row(_)))
            .count() as u64
    }
}

impl Connector for ScriptedConnector {
    type Cursor = ScriptedCursor;

    fn name(&self) -> &str {
        "scripted"
    }

    fn stream(
        &self,
        _cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<ScriptedCursor, Error>> + Send {
        self.record("stream", query);
        let result = if self.fail_stream {
            Outcome::Err(Error::Connector(ConnectorError {
                kind: ConnectorErrorKind::Stream,
                connector: Some("scripted".to_string()),
                message: "cursor refused".to_string(),
                source: None,
            }))
        } else {
            Outcome::Ok(ScriptedCursor {
                steps: self.steps.iter().cloned().collect(),
                pulled: 0,
                pending_before_each: self.pending_before_each,
                pending_left: self.pending_before_each,
                closed: false,
                events: self.events.clone(),
            })
        };
        async move { result }
    }

    fn resolve_complex_query<'a>(
        &'a self,
        _cx: &'a Cx,
        _query: &'a QueryState,
        body: ResolutionBody<'a>,
    ) -> impl Future<Output = Outcome<(), Error>> + Send + 'a {
        async move {
            self.events.push("setup");
            if self.fail_setup {
                return Outcome::Err(Error::Custom("link target missing".to_string()));
            }
            if self.skip_body {
                self.events.push("teardown");
                return Outcome::Ok(());
            }
            let outcome = body.await;
            self.events.push("teardown");
            outcome
        }
    }

    fn count(&self, _cx: &Cx, query: &QueryState) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record("count", query);
        let n = self.row_count();
        async move { Outcome::Ok(n) }
    }

    fn update(
        &self,
        _cx: &Cx,
        query: &QueryState,
        changes: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record("update", query);
        *self.last_changes.lock().unwrap() = changes.to_vec();
        let n = self.row_count();
        async move { Outcome::Ok(n) }
    }

    fn update_one(
        &self,
        _cx: &Cx,
        query: &QueryState,
        changes: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record("update_one", query);
        *self.last_changes.lock().unwrap() = changes.to_vec();
        let n = self.row_count().min(1);
        async move { Outcome::Ok(n) }
    }

    fn remove(&self, _cx: &Cx, query: &QueryState) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record("remove", query);
        let n = self.row_count();
        async move { Outcome::Ok(n) }
    }

    fn remove_one(
        &self,
        _cx: &Cx,
        query: &QueryState,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record("remove_one", query);
        let n = self.row_count().min(1);
        async move { Outcome::Ok(n) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        model: &str,
        _row: Row,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.events.push(format!("insert:{model}"));
        async { Outcome::Ok(()) }
    }
}

/// Minimal model used across tests; `name` must be text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Person {
    pub(crate) id: i64,
    pub(crate) name: String,
}

impl Model for Person {
    const NAME: &'static str = "people";

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", FieldKind::Number).primary_key(true),
            FieldInfo::new("name", FieldKind::String),
            FieldInfo::new("teamId", FieldKind::Number).nullable(true),
        ];
        FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }
}
