//! HTTP transport for talking to the AutoGLM API server.

mod http;

pub use http::{
    parse_base_url, HttpTransport, TransportError, DEFAULT_BASE_URL,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SUBMIT_TIMEOUT_SECS,
};
