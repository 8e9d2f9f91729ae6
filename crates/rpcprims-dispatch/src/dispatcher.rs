use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rpcprims_procedure::{Procedure, ProcedureInput, RequestContext};
use rpcprims_spec::RouteMatch;
use rpcprims_types::{Dispatch, ErrorKind, RawRequest, Reply, Result, RpcError};
use serde_json::json;
use tracing::field::{display, Empty};
use tracing::{debug, error, info_span, warn, Instrument, Span};

use crate::lifecycle::{Lifecycle, RequestState};
use crate::registry::Registry;

/// Header a caller may use to supply its own request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    format!("req-{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// Routes inbound requests to procedures of one registered specification.
///
/// Every request loads the snapshot current at arrival and holds it until it
/// finishes, so a concurrent reload never mixes old routes with new
/// procedures. Handlers run on their own task: a panic becomes an
/// `InternalError` reply and leaves other requests alone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    spec: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, spec: impl Into<String>) -> Self {
        Self {
            registry,
            spec: spec.into(),
        }
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Route one request and produce the reply a transport writes back.
    pub async fn route(&self, request: RawRequest) -> Reply {
        self.route_traced(request).await.0
    }

    /// Like [`Dispatcher::route`], also returning the states the request went through.
    pub async fn route_traced(&self, request: RawRequest) -> (Reply, Vec<RequestState>) {
        let request_id = request
            .header(REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(next_request_id);
        let span = info_span!("rpc.request", request_id = %request_id, route = Empty);

        async move {
            let mut lifecycle = Lifecycle::new();
            let reply = self.drive(request, request_id, &mut lifecycle).await;
            (reply, lifecycle.into_history())
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: RawRequest,
        request_id: String,
        lifecycle: &mut Lifecycle,
    ) -> Reply {
        let (matched, procedure) = match self.resolve(&request) {
            Ok(found) => found,
            Err(err) => return reject(lifecycle, err, None),
        };
        let RouteMatch { key, params, .. } = matched;
        Span::current().record("route", display(&key));
        lifecycle.advance(RequestState::Matched);

        lifecycle.advance(RequestState::Validating);
        let RawRequest {
            content_type,
            body,
            query,
            headers,
            ..
        } = request;
        let input = ProcedureInput {
            content_type,
            body,
            path_params: params,
            query,
        };
        let value = match procedure.prepare(input) {
            Ok(value) => value,
            Err(err) => return reject(lifecycle, err, None),
        };

        lifecycle.advance(RequestState::Executing);
        let context = RequestContext {
            request_id,
            procedure: procedure.name().to_string(),
            route: Some(key.to_string()),
            headers,
        };
        // Dropping this future leaves a started handler running to completion.
        let task = tokio::spawn({
            let procedure = procedure.clone();
            async move { procedure.invoke(value, context).await }.in_current_span()
        });
        let output = match task.await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                let status_hint = declared_status(&procedure, &err);
                return reject(lifecycle, err, status_hint);
            }
            Err(join) => {
                let err = RpcError::internal(format!(
                    "handler for {} did not finish: {join}",
                    procedure.name()
                ))
                .with_context(json!({ "panicked": join.is_panic() }));
                return reject(lifecycle, err, None);
            }
        };

        lifecycle.advance(RequestState::Responding);
        let reply = Reply::success(output.content_type, output.body);
        lifecycle.advance(RequestState::Completed);
        debug!(procedure = %procedure.name(), "request completed");
        reply
    }

    fn resolve(&self, request: &RawRequest) -> Result<(RouteMatch, Arc<Procedure>)> {
        let snapshot = self.registry.snapshot(&self.spec)?;
        let (matched, procedure) = snapshot.resolve(request.method, &request.path)?;
        if !procedure.is_external() {
            return Err(RpcError::not_found(format!(
                "no route for {} {}",
                request.method, request.path
            )));
        }
        Ok((matched, procedure))
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, request: RawRequest) -> Reply {
        self.route(request).await
    }
}

fn declared_status(procedure: &Procedure, err: &RpcError) -> Option<u16> {
    err.code()
        .and_then(|code| procedure.declared_error(code))
        .and_then(|declared| declared.status)
}

fn reject(lifecycle: &mut Lifecycle, err: RpcError, status_hint: Option<u16>) -> Reply {
    lifecycle.fail(err.kind());
    if err.kind() == ErrorKind::InternalError {
        error!(error = %err, context = %err.context(), "request failed");
    } else {
        warn!(kind = %err.kind(), error = %err, "request rejected");
    }
    Reply::failure(&err, status_hint)
}
