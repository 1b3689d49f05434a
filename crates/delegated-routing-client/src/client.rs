//! HTTP transport and the asynchronous call lifecycle.
//!
//! Every call spawns one task that decodes the response stream and feeds a
//! single-slot channel. The task checks its cancellation token before each
//! decode and while waiting on the body or the channel, and closes the
//! channel without another send once the token fires.

use crate::config::{ClientConfig, Placement, RequiredProtocol};
use crate::error::ClientError;
use crate::observe::{CallObserver, TracingObserver};
use crate::provide::Signer;
use crate::records::Validator;
use bytes::Bytes;
use delegated_routing_core::{
    AddrInfo, CONTENT_TYPE, Call, IdentifyRequest, Method, QUERY_PARAM, Response, ResponseDecoder,
    encode_call,
};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A channel item: one payload or the error that ended the call.
pub type AsyncResult<T> = Result<T, ClientError>;

/// Client for a delegated routing endpoint.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct DelegatedRoutingClient {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    http: reqwest::Client,
    endpoint: Url,
    placement: Placement,
    pub(crate) required_protocol: RequiredProtocol,
    observer: Arc<dyn CallObserver>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) provide_identity: Option<(AddrInfo, Arc<dyn Signer>)>,
}

impl fmt::Debug for DelegatedRoutingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedRoutingClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("placement", &self.inner.placement)
            .field("required_protocol", &self.inner.required_protocol)
            .field("validator", &self.inner.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DelegatedRoutingClient`].
pub struct ClientBuilder {
    endpoint: String,
    http: Option<reqwest::Client>,
    placement: Placement,
    connect_timeout: Option<Duration>,
    required_protocol: RequiredProtocol,
    observer: Arc<dyn CallObserver>,
    validator: Option<Arc<dyn Validator>>,
    provide_identity: Option<(AddrInfo, Arc<dyn Signer>)>,
}

impl ClientBuilder {
    /// Use an existing HTTP client instead of building one.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Where the request envelope travels: POST body or `q` parameter.
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Ignored when an HTTP client is supplied.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Transfer protocol a provider must offer to be returned.
    pub fn required_protocol(mut self, protocol: RequiredProtocol) -> Self {
        self.required_protocol = protocol;
        self
    }

    /// Replace the default tracing observer.
    pub fn observer(mut self, observer: impl CallObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Validate and rank naming records returned by `get_ipns`.
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Identity announced by `provide`, and the key that signs for it.
    pub fn provide_identity(mut self, identity: AddrInfo, signer: impl Signer + 'static) -> Self {
        self.provide_identity = Some((identity, Arc::new(signer)));
        self
    }

    /// Fails when the endpoint is not a valid URL or the HTTP client cannot be built.
    pub fn build(self) -> Result<DelegatedRoutingClient, ClientError> {
        let endpoint = Url::parse(&self.endpoint)?;
        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.connect_timeout {
                    builder = builder.connect_timeout(timeout);
                }
                builder.build()?
            }
        };
        Ok(DelegatedRoutingClient {
            inner: Arc::new(Inner {
                http,
                endpoint,
                placement: self.placement,
                required_protocol: self.required_protocol,
                observer: self.observer,
                validator: self.validator,
                provide_identity: self.provide_identity,
            }),
        })
    }
}

impl DelegatedRoutingClient {
    /// Client with default settings.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        Self::builder(endpoint).build()
    }

    /// Start configuring a client for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            endpoint: endpoint.into(),
            http: None,
            placement: Placement::default(),
            connect_timeout: None,
            required_protocol: RequiredProtocol::default(),
            observer: Arc::new(TracingObserver),
            validator: None,
            provide_identity: None,
        }
    }

    /// Builder preloaded from a config.
    pub fn builder_from_config(config: &ClientConfig) -> ClientBuilder {
        let mut builder = Self::builder(config.endpoint.clone())
            .placement(config.placement)
            .required_protocol(config.required_protocol);
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        builder
    }

    /// The URL every call is sent to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }

    /// Start a call and return the channel its responses arrive on.
    ///
    /// Failures before the response stream starts (encoding, connection,
    /// non-success status) are returned here. Later failures arrive as the
    /// last channel item. Cancelling `cancel` closes the channel without
    /// further items.
    pub async fn call_async<C>(
        &self,
        cancel: &CancellationToken,
        request: C,
    ) -> Result<mpsc::Receiver<AsyncResult<C::Response>>, ClientError>
    where
        C: Call + Send + 'static,
        C::Response: Send + 'static,
    {
        self.call_async_with(cancel, request, Some).await
    }

    /// Like [`call_async`](Self::call_async), with each payload passed
    /// through `map` inside the call task. Payloads mapped to `None` are
    /// not delivered.
    pub(crate) async fn call_async_with<C, T, F>(
        &self,
        cancel: &CancellationToken,
        request: C,
        map: F,
    ) -> Result<mpsc::Receiver<AsyncResult<T>>, ClientError>
    where
        C: Call + Send + 'static,
        C::Response: Send,
        T: Send + 'static,
        F: FnMut(C::Response) -> Option<T> + Send + 'static,
    {
        let started = Instant::now();
        let response = match self.send(cancel, request).await {
            Ok(response) => response,
            Err(e) => {
                self.inner
                    .observer
                    .call_finished(C::METHOD, started.elapsed(), Some(e.label()));
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(1);
        let stream = ResponseStream::new(response.bytes_stream().boxed());
        let report = CallReport {
            observer: self.inner.observer.clone(),
            method: C::METHOD,
            started,
        };
        tokio::spawn(process_responses::<C, T, F>(
            cancel.clone(),
            stream,
            tx,
            map,
            report,
        ));
        Ok(rx)
    }

    /// Run a call to completion and collect its responses.
    ///
    /// The first error item ends the call and is returned. Dropping the
    /// returned future, or cancelling `cancel`, stops the in-flight call.
    pub async fn call<C>(
        &self,
        cancel: &CancellationToken,
        request: C,
    ) -> Result<Vec<C::Response>, ClientError>
    where
        C: Call + Send + 'static,
        C::Response: Send + 'static,
    {
        let call_token = cancel.child_token();
        let _stop = call_token.clone().drop_guard();
        let rx = self.call_async(&call_token, request).await?;
        drain(cancel, rx).await
    }

    /// Method names the service answers.
    pub async fn identify(&self, cancel: &CancellationToken) -> Result<Vec<String>, ClientError> {
        let responses = self.call(cancel, IdentifyRequest {}).await?;
        Ok(responses.into_iter().flat_map(|r| r.methods).collect())
    }

    async fn send<C: Call>(
        &self,
        cancel: &CancellationToken,
        request: C,
    ) -> Result<reqwest::Response, ClientError> {
        let body = encode_call(&request.into_request())?;
        let inner = &self.inner;
        let builder = match inner.placement {
            Placement::Body => inner
                .http
                .post(inner.endpoint.clone())
                .header(header::CONTENT_TYPE, CONTENT_TYPE)
                .body(body),
            Placement::Query => {
                let mut url = inner.endpoint.clone();
                url.query_pairs_mut()
                    .append_pair(QUERY_PARAM, &String::from_utf8_lossy(&body));
                inner.http.get(url)
            }
        };
        let builder = builder.header(header::ACCEPT, CONTENT_TYPE);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = builder.send() => response?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        Ok(response)
    }
}

/// Receive until the channel closes, stopping at the first error item.
pub(crate) async fn drain<T>(
    cancel: &CancellationToken,
    mut rx: mpsc::Receiver<AsyncResult<T>>,
) -> Result<Vec<T>, ClientError> {
    let mut items = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            item = rx.recv() => match item {
                Some(Ok(item)) => items.push(item),
                Some(Err(e)) => return Err(e),
                None => return Ok(items),
            },
        }
    }
}

struct CallReport {
    observer: Arc<dyn CallObserver>,
    method: Method,
    started: Instant,
}

impl CallReport {
    fn finish(self, error: Option<&'static str>) {
        self.observer
            .call_finished(self.method, self.started.elapsed(), error);
    }
}

async fn process_responses<C, T, F>(
    cancel: CancellationToken,
    mut stream: ResponseStream,
    tx: mpsc::Sender<AsyncResult<T>>,
    mut map: F,
    report: CallReport,
) where
    C: Call,
    F: FnMut(C::Response) -> Option<T>,
{
    let mut outcome = None;
    loop {
        if cancel.is_cancelled() {
            outcome = Some(ClientError::Cancelled.label());
            break;
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome = Some(ClientError::Cancelled.label());
                break;
            }
            next = stream.next() => next,
        };

        let item = match next {
            None => break,
            Some(Err(e)) => Err(e),
            Some(Ok(Response::Error(e))) => Err(ClientError::Service(e)),
            Some(Ok(response)) => match C::from_response(response) {
                Ok(payload) => match map(payload) {
                    Some(value) => Ok(value),
                    None => continue,
                },
                Err(other) => {
                    tracing::debug!(
                        expected = %C::METHOD,
                        got = ?other.method(),
                        "skipping non-matching response"
                    );
                    continue;
                }
            },
        };

        let terminal = match &item {
            Ok(_) => false,
            Err(e) => {
                outcome = Some(e.label());
                true
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome = Some(ClientError::Cancelled.label());
                break;
            }
            sent = tx.send(item) => {
                if sent.is_err() {
                    tracing::trace!(method = %C::METHOD, "receiver dropped");
                    break;
                }
            }
        }
        if terminal {
            break;
        }
    }
    report.finish(outcome);
}

/// Decodes response envelopes from a streaming HTTP body.
struct ResponseStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: ResponseDecoder,
    ended: bool,
}

impl ResponseStream {
    fn new(body: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self {
            body,
            decoder: ResponseDecoder::new(),
            ended: false,
        }
    }

    /// Next envelope, or `None` once the body ended cleanly.
    async fn next(&mut self) -> Option<Result<Response, ClientError>> {
        loop {
            match self.decoder.next_response() {
                Ok(Some(response)) => return Some(Ok(response)),
                Ok(None) => {}
                Err(e) => return Some(Err(e.into())),
            }
            if self.ended {
                return None;
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(e)) => return Some(Err(e.into())),
                None => {
                    self.ended = true;
                    return self.decoder.finish().map_err(ClientError::from).transpose();
                }
            }
        }
    }
}
