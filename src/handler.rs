use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers};
use pgwire::api::query::SimpleQueryHandler;
use pgwire::api::results::Response;
use pgwire::error::PgWireResult;
use pgwire::messages::PgWireBackendMessage;
use tracing::{info, span, warn, Level};
use ulid::Ulid;

use crate::executor::Executor;

/// Hands every connection the same query handler over one shared executor
pub(crate) struct HandlerFactory {
    handler: Arc<Handler>,
}

impl HandlerFactory {
    pub fn new(executor: Arc<Executor>) -> Self {
        HandlerFactory {
            handler: Arc::new(Handler { executor }),
        }
    }
}

impl PgWireServerHandlers for HandlerFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl pgwire::api::auth::StartupHandler> {
        Arc::new(NoopHandler)
    }
}

struct Handler {
    executor: Arc<Executor>,
}

#[async_trait]
impl SimpleQueryHandler for Handler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        pgwire::error::PgWireError: From<<C as Sink<PgWireBackendMessage>>::Error>,
    {
        let query_id = Ulid::new();
        let client_addr = client.socket_addr();
        let span = span!(Level::INFO, "query", query_id = %query_id, client_addr = %client_addr);
        let _enter = span.enter();

        info!(query = %query, "received query");
        let started = Instant::now();
        match self.executor.execute(query) {
            Ok(responses) => {
                info!(responses = responses.len(), elapsed_us = started.elapsed().as_micros() as u64, "query complete");
                Ok(responses)
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "query failed");
                Err(e.into())
            }
        }
    }
}
