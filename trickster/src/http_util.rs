//! Conversions between `http` types and the plain maps the data model uses.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Request, Response};

use trickster_core::Document;

pub(crate) fn headers_to_map(headers: &http::HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = value.to_str().unwrap_or_default();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

/// Rebuild an owned clone of a request. `http::Request` doesn't implement
/// `Clone` itself, so fan-out (one copy per miss extent) and conditional
/// revalidation (one mutated copy) go through this.
pub(crate) fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut builder = Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .version(request.version());
    if let Some(headers) = builder.headers_mut() {
        *headers = request.headers().clone();
    }
    builder
        .body(request.body().clone())
        .expect("cloned request parts are always valid")
}

/// Strip conditional headers before forwarding upstream: their scope ends at
/// this proxy.
pub(crate) fn strip_conditional_headers(mut request: Request<Bytes>) -> Request<Bytes> {
    for name in [
        http::header::IF_MATCH,
        http::header::IF_NONE_MATCH,
        http::header::IF_MODIFIED_SINCE,
        http::header::IF_UNMODIFIED_SINCE,
    ] {
        request.headers_mut().remove(name);
    }
    request
}

pub(crate) fn response_from_document(doc: &Document) -> Response<Bytes> {
    let mut builder = Response::builder().status(doc.status_code);
    for (name, value) in &doc.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(doc.body.clone())
        .unwrap_or_else(|_| Response::new(doc.body.clone()))
}
