//! Model bound to a connector.

use crate::query::Query;
use asupersync::{Cx, Outcome};
use ilorm_core::{Connector, Error, Model, ModelId, Result, Row, Value};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Entry point for working with model `M` stored by connector `C`.
pub struct Repository<M: Model, C: Connector> {
    connector: Arc<C>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model, C: Connector> Repository<M, C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self {
            connector,
            _marker: PhantomData,
        }
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Start a query over every `M` record.
    pub fn query(&self) -> Query<M, C> {
        Query::new(Arc::clone(&self.connector))
    }

    /// Identity from a single primary-key value.
    #[allow(clippy::result_large_err)]
    pub fn id(&self, value: impl Into<Value>) -> Result<ModelId<M>> {
        ModelId::new(value)
    }

    /// Store a new instance after checking it against the schema.
    #[tracing::instrument(level = "debug", skip_all, fields(model = M::NAME))]
    pub async fn insert(&self, cx: &Cx, instance: &M) -> Outcome<(), Error> {
        let schema = M::schema();
        let pairs = instance.to_row();
        for (name, value) in &pairs {
            if let Err(e) = schema.check(name, value) {
                return Outcome::Err(e);
            }
        }
        self.connector
            .insert(cx, M::NAME, Row::from_pairs(pairs))
            .await
    }

    /// Load the instance identified by `id`.
    pub async fn resolve(&self, cx: &Cx, id: &ModelId<M>) -> Outcome<Option<M>, Error> {
        id.resolve_instance(cx, Arc::clone(&self.connector)).await
    }
}

impl<M: Model, C: Connector> Clone for Repository<M, C> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.connector))
    }
}

/// Loading the instance a [`ModelId`] identifies.
pub trait ResolveInstance<M: Model> {
    /// Run an `is` query on every primary key and return the first match.
    fn resolve_instance<C: Connector>(
        &self,
        cx: &Cx,
        connector: Arc<C>,
    ) -> impl Future<Output = Outcome<Option<M>, Error>> + Send;
}

impl<M: Model> ResolveInstance<M> for ModelId<M> {
    fn resolve_instance<C: Connector>(
        &self,
        cx: &Cx,
        connector: Arc<C>,
    ) -> impl Future<Output = Outcome<Option<M>, Error>> + Send {
        let query = Query::<M, C>::by_id(connector, self);
        async move { query.find_one(cx).await }
    }
}
