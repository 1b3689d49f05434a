//! HTTP handler: decode the request envelope, dispatch, stream the answers.

use crate::error::Rejection;
use crate::service::{DelegatedRoutingService, Replies};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use delegated_routing_core::{
    CONTENT_TYPE, DecodeError, IdentifyResponse, REQUEST_ENVELOPE, Request, Response,
    SchemaError, decode_request, encode_response_line,
};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, DropGuard};

type SharedService = Arc<dyn DelegatedRoutingService>;

#[derive(Debug, Deserialize)]
struct RequestQuery {
    q: Option<String>,
}

/// Router answering GET and POST on `/`.
pub fn router(service: impl DelegatedRoutingService) -> Router {
    router_shared(Arc::new(service))
}

/// Like [`router`], for a service already behind an `Arc`.
pub fn router_shared(service: Arc<dyn DelegatedRoutingService>) -> Router {
    Router::new()
        .route("/", get(handle).post(handle))
        .with_state(service)
}

async fn handle(
    State(service): State<SharedService>,
    Query(query): Query<RequestQuery>,
    body: Bytes,
) -> HttpResponse {
    let payload = match &query.q {
        Some(q) => q.as_bytes(),
        None => &body[..],
    };
    let request = match decode_request(payload) {
        Ok(request) => request,
        Err(DecodeError::Schema(SchemaError::NoApplicableKey { type_name, key }))
            if type_name == REQUEST_ENVELOPE =>
        {
            tracing::error!(%key, "unknown request method");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(DecodeError::Schema(SchemaError::EmptyUnion { type_name }))
            if type_name == REQUEST_ENVELOPE =>
        {
            tracing::error!("request names no method");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "request not decodable");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let method = request.method();
    let cancel = CancellationToken::new();
    let replies = match dispatch(service.as_ref(), cancel.clone(), request).await {
        Ok(replies) => replies,
        Err(e) => {
            tracing::error!(%method, error = %e, "service rejected request");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        Body::from_stream(response_lines(replies, cancel.drop_guard())),
    )
        .into_response()
}

async fn dispatch(
    service: &dyn DelegatedRoutingService,
    cancel: CancellationToken,
    request: Request,
) -> Result<BoxStream<'static, Response>, Rejection> {
    Ok(match request {
        Request::Identify(_) => {
            let methods = service
                .methods()
                .into_iter()
                .map(|m| m.name().to_string())
                .collect();
            stream::iter([Response::Identify(IdentifyResponse { methods })]).boxed()
        }
        Request::FindProviders(r) => envelopes(service.find_providers(cancel, r).await?),
        Request::GetIpns(r) => envelopes(service.get_ipns(cancel, r).await?),
        Request::PutIpns(r) => envelopes(service.put_ipns(cancel, r).await?),
        Request::Provide(r) => envelopes(service.provide(cancel, r).await?),
    })
}

fn envelopes<T>(replies: Replies<T>) -> BoxStream<'static, Response>
where
    T: Into<Response> + Send + 'static,
{
    stream::unfold(replies, |mut replies| async move {
        let envelope = match replies.recv().await? {
            Ok(value) => value.into(),
            Err(e) => Response::Error(e),
        };
        Some((envelope, replies))
    })
    .boxed()
}

/// One encoded line per envelope, ending after the first error envelope.
///
/// `guard` lives as long as the body; dropping the body (completion or a
/// disconnected peer) cancels the service's token.
fn response_lines(
    replies: BoxStream<'static, Response>,
    guard: DropGuard,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(Some((replies, guard)), |state| async move {
        let (mut replies, guard) = state?;
        loop {
            let response = replies.next().await?;
            let line = match encode_response_line(&response) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "cannot encode response");
                    continue;
                }
            };
            let next = if response.is_error() {
                None
            } else {
                Some((replies, guard))
            };
            return Some((Ok(Bytes::from(line)), next));
        }
    })
}
