//! Envelope multiplexing.
//!
//! A request envelope is a union carrying exactly one request variant. The
//! response side is a newline-delimited stream of response envelopes, at
//! most one of which is an error; the stream ends after it.

use crate::codec::{self, StreamDecoder};
use crate::error::{DecodeError, FramingError, SchemaError};
use crate::node::Node;
use crate::proto::{
    FindProvidersRequest, FindProvidersResponse, GetIpnsRequest, GetIpnsResponse,
    IdentifyRequest, IdentifyResponse, ProvideRequest, ProvideResponse, PutIpnsRequest,
    PutIpnsResponse, ServiceError,
};
use crate::schema::{Schema, union_entry, union_node};
use std::fmt;
use std::str::FromStr;

/// Type name reported in schema errors for request envelopes.
pub const REQUEST_ENVELOPE: &str = "Request";
/// Type name reported in schema errors for response envelopes.
pub const RESPONSE_ENVELOPE: &str = "Response";

const ERROR_TAG: &str = "Error";

/// A protocol method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Identify,
    FindProviders,
    GetIpns,
    PutIpns,
    Provide,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Identify,
        Method::FindProviders,
        Method::GetIpns,
        Method::PutIpns,
        Method::Provide,
    ];

    /// Protocol name of the method, as listed by Identify.
    pub fn name(self) -> &'static str {
        match self {
            Method::Identify => "Identify",
            Method::FindProviders => "FindProviders",
            Method::GetIpns => "GetIPNS",
            Method::PutIpns => "PutIPNS",
            Method::Provide => "Provide",
        }
    }

    /// Key naming this method in a request envelope.
    pub fn request_tag(self) -> &'static str {
        match self {
            Method::Identify => "IdentifyRequest",
            Method::FindProviders => "FindProvidersRequest",
            Method::GetIpns => "GetIPNSRequest",
            Method::PutIpns => "PutIPNSRequest",
            Method::Provide => "ProvideRequest",
        }
    }

    /// Key naming this method in a response envelope.
    pub fn response_tag(self) -> &'static str {
        match self {
            Method::Identify => "IdentifyResponse",
            Method::FindProviders => "FindProvidersResponse",
            Method::GetIpns => "GetIPNSResponse",
            Method::PutIpns => "PutIPNSResponse",
            Method::Provide => "ProvideResponse",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = MethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| MethodParseError::Unknown(s.to_string()))
    }
}

/// Error parsing a method name.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MethodParseError {
    #[error("unknown method: {0}")]
    Unknown(String),
}

/// A request envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Identify(IdentifyRequest),
    FindProviders(FindProvidersRequest),
    GetIpns(GetIpnsRequest),
    PutIpns(PutIpnsRequest),
    Provide(ProvideRequest),
}

impl Request {
    /// The method this request invokes.
    pub fn method(&self) -> Method {
        match self {
            Request::Identify(_) => Method::Identify,
            Request::FindProviders(_) => Method::FindProviders,
            Request::GetIpns(_) => Method::GetIpns,
            Request::PutIpns(_) => Method::PutIpns,
            Request::Provide(_) => Method::Provide,
        }
    }
}

impl Schema for Request {
    fn to_node(&self) -> Node {
        let value = match self {
            Request::Identify(r) => r.to_node(),
            Request::FindProviders(r) => r.to_node(),
            Request::GetIpns(r) => r.to_node(),
            Request::PutIpns(r) => r.to_node(),
            Request::Provide(r) => r.to_node(),
        };
        union_node(self.method().request_tag(), value)
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        let (tag, value) = union_entry(REQUEST_ENVELOPE, node)?;
        let Some(method) = Method::ALL.into_iter().find(|m| m.request_tag() == tag) else {
            return Err(misplaced_or_unknown(REQUEST_ENVELOPE, tag));
        };
        Ok(match method {
            Method::Identify => Request::Identify(Schema::parse(value)?),
            Method::FindProviders => Request::FindProviders(Schema::parse(value)?),
            Method::GetIpns => Request::GetIpns(Schema::parse(value)?),
            Method::PutIpns => Request::PutIpns(Schema::parse(value)?),
            Method::Provide => Request::Provide(Schema::parse(value)?),
        })
    }
}

/// A response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Identify(IdentifyResponse),
    FindProviders(FindProvidersResponse),
    GetIpns(GetIpnsResponse),
    PutIpns(PutIpnsResponse),
    Provide(ProvideResponse),
    Error(ServiceError),
}

impl Response {
    /// The method this response answers; `None` for errors.
    pub fn method(&self) -> Option<Method> {
        match self {
            Response::Identify(_) => Some(Method::Identify),
            Response::FindProviders(_) => Some(Method::FindProviders),
            Response::GetIpns(_) => Some(Method::GetIpns),
            Response::PutIpns(_) => Some(Method::PutIpns),
            Response::Provide(_) => Some(Method::Provide),
            Response::Error(_) => None,
        }
    }

    /// Whether this is an error envelope, which ends a stream.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl Schema for Response {
    fn to_node(&self) -> Node {
        let (tag, value) = match self {
            Response::Identify(r) => (Method::Identify.response_tag(), r.to_node()),
            Response::FindProviders(r) => (Method::FindProviders.response_tag(), r.to_node()),
            Response::GetIpns(r) => (Method::GetIpns.response_tag(), r.to_node()),
            Response::PutIpns(r) => (Method::PutIpns.response_tag(), r.to_node()),
            Response::Provide(r) => (Method::Provide.response_tag(), r.to_node()),
            Response::Error(e) => (ERROR_TAG, e.to_node()),
        };
        union_node(tag, value)
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        let (tag, value) = union_entry(RESPONSE_ENVELOPE, node)?;
        if tag == ERROR_TAG {
            return Ok(Response::Error(ServiceError::parse(value)?));
        }
        let Some(method) = Method::ALL.into_iter().find(|m| m.response_tag() == tag) else {
            return Err(misplaced_or_unknown(RESPONSE_ENVELOPE, tag));
        };
        Ok(match method {
            Method::Identify => Response::Identify(Schema::parse(value)?),
            Method::FindProviders => Response::FindProviders(Schema::parse(value)?),
            Method::GetIpns => Response::GetIpns(Schema::parse(value)?),
            Method::PutIpns => Response::PutIpns(Schema::parse(value)?),
            Method::Provide => Response::Provide(Schema::parse(value)?),
        })
    }
}

fn misplaced_or_unknown(type_name: &'static str, tag: &str) -> SchemaError {
    let misplaced = tag == ERROR_TAG
        || Method::ALL
            .into_iter()
            .any(|m| m.request_tag() == tag || m.response_tag() == tag);
    if misplaced {
        SchemaError::UnexpectedVariant {
            type_name,
            key: tag.to_string(),
        }
    } else {
        SchemaError::NoApplicableKey {
            type_name,
            key: tag.to_string(),
        }
    }
}

/// A typed request paired with the response variant that answers it.
pub trait Call: Schema {
    type Response: Schema;

    const METHOD: Method;

    fn into_request(self) -> Request;

    /// Extract the matching payload, handing back any other variant.
    fn from_response(response: Response) -> Result<Self::Response, Response>;
}

macro_rules! impl_call {
    ($request:ident => $response:ident, $variant:ident) => {
        impl Call for $request {
            type Response = $response;

            const METHOD: Method = Method::$variant;

            fn into_request(self) -> Request {
                Request::$variant(self)
            }

            fn from_response(response: Response) -> Result<$response, Response> {
                match response {
                    Response::$variant(r) => Ok(r),
                    other => Err(other),
                }
            }
        }

        impl From<$request> for Request {
            fn from(r: $request) -> Self {
                Request::$variant(r)
            }
        }

        impl From<$response> for Response {
            fn from(r: $response) -> Self {
                Response::$variant(r)
            }
        }
    };
}

impl_call!(IdentifyRequest => IdentifyResponse, Identify);
impl_call!(FindProvidersRequest => FindProvidersResponse, FindProviders);
impl_call!(GetIpnsRequest => GetIpnsResponse, GetIpns);
impl_call!(PutIpnsRequest => PutIpnsResponse, PutIpns);
impl_call!(ProvideRequest => ProvideResponse, Provide);

impl From<ServiceError> for Response {
    fn from(e: ServiceError) -> Self {
        Response::Error(e)
    }
}

/// Encode a request envelope.
pub fn encode_call(request: &Request) -> Result<Vec<u8>, FramingError> {
    codec::encode(&request.to_node())
}

/// Decode a request envelope from a query parameter or request body.
pub fn decode_request(bytes: &[u8]) -> Result<Request, DecodeError> {
    let node = codec::decode(bytes)?;
    Ok(Request::parse(&node)?)
}

/// Encode one response envelope followed by a newline.
pub fn encode_response_line(response: &Response) -> Result<Vec<u8>, FramingError> {
    let mut line = codec::encode(&response.to_node())?;
    line.push(b'\n');
    Ok(line)
}

/// Decode every response envelope in a complete byte sequence.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<Response>, DecodeError> {
    let mut decoder = ResponseDecoder::new();
    decoder.push(bytes);
    let mut responses = Vec::new();
    while let Some(response) = decoder.next_response()? {
        responses.push(response);
    }
    if let Some(response) = decoder.finish()? {
        responses.push(response);
    }
    Ok(responses)
}

/// Incremental decoder for a response stream.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    inner: StreamDecoder,
}

impl ResponseDecoder {
    /// An empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.inner.push(chunk);
    }

    /// Next complete response, or `None` if more bytes are needed.
    pub fn next_response(&mut self) -> Result<Option<Response>, DecodeError> {
        match self.inner.next_node()? {
            Some(node) => Ok(Some(Response::parse(&node)?)),
            None => Ok(None),
        }
    }

    /// Drain what is left once the byte stream has ended.
    pub fn finish(&mut self) -> Result<Option<Response>, DecodeError> {
        match self.inner.finish()? {
            Some(node) => Ok(Some(Response::parse(&node)?)),
            None => Ok(None),
        }
    }
}
