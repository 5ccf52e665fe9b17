//! The Object Proxy Cache engine: RFC-7234-style freshness, revalidation,
//! and conditional-request negotiation.

use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use http::{Request, Response, StatusCode};

use trickster_backend::{Backend, LockRegistry};
use trickster_core::{CachingPolicy, Document, OriginConfig};

use crate::error::CacheError;
use crate::http_util::{clone_request, headers_to_map, response_from_document, strip_conditional_headers};
use crate::metrics;
use crate::origin::OriginClient;
use crate::status::CacheLookupStatus;

/// Result of [`fetch_via_object_proxy_cache`].
pub struct ObjectCacheOutcome {
    /// The response to return to the downstream client.
    pub response: Response<Bytes>,
    /// Whether this response was served (wholly or via revalidation) from cache.
    pub was_hit: bool,
    /// Detailed result state, for metrics and tests.
    pub status: CacheLookupStatus,
}

fn decode_document(raw: &Bytes) -> Option<Document> {
    serde_json::from_slice(raw).ok()
}

fn encode_document(doc: &Document) -> Result<Bytes, CacheError> {
    serde_json::to_vec(doc)
        .map(Bytes::from)
        .map_err(|e| trickster_core::TricksterError::MarshalFailure(e.to_string()).into())
}

async fn load_document<B: Backend>(backend: &B, key: &str) -> Result<Option<Document>, CacheError> {
    match backend.get(key).await? {
        None => Ok(None),
        Some(raw) => match decode_document(&raw) {
            Some(doc) => Ok(Some(doc)),
            None => {
                backend.remove(key).await?;
                Ok(None)
            }
        },
    }
}

/// Compute a response's caching policy, fold in the size check, and either
/// remove the key or write the new document with the appropriate TTL.
async fn apply_caching_decision<B: Backend>(
    backend: &B,
    origin: &OriginConfig,
    key: &str,
    status_code: u16,
    headers: std::collections::HashMap<String, String>,
    body: Bytes,
) -> Result<Document, CacheError> {
    let mut policy = trickster_core::policy::response_caching_policy(status_code, &origin.negative_cache, &headers);

    let max_object_size = backend.configuration().max_object_size_bytes;
    if body.len() >= max_object_size {
        policy.no_cache = true;
    }

    let mut document = Document::new(status_code, status_code.to_string(), headers, body);
    document.caching_policy = Some(policy.clone());

    let should_remove = policy.no_cache || (!policy.can_revalidate && policy.freshness_lifetime <= 0);
    if should_remove {
        backend.remove(key).await?;
    } else {
        let factor = if policy.can_revalidate { origin.revalidation_factor as i64 } else { 1 };
        let mut ttl_secs = policy.freshness_lifetime.saturating_mul(factor);
        let cap = origin.max_ttl.as_secs() as i64;
        if cap > 0 {
            ttl_secs = ttl_secs.min(cap);
        }
        let ttl = std::time::Duration::from_secs(ttl_secs.max(0) as u64);
        let raw = encode_document(&document)?;
        backend.set(key, raw, ttl).await?;
    }

    Ok(document)
}

fn merge_revalidation_headers(
    cached: &std::collections::HashMap<String, String>,
    fresh: &std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, String> {
    let mut merged = cached.clone();
    for (k, v) in fresh {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

fn add_revalidators(mut request: Request<Bytes>, policy: &CachingPolicy) -> Request<Bytes> {
    if let Some(etag) = &policy.etag {
        if let Ok(value) = http::HeaderValue::from_str(etag) {
            request.headers_mut().insert(http::header::IF_NONE_MATCH, value);
        }
    }
    if let Some(last_modified) = policy.last_modified {
        if let Ok(value) = http::HeaderValue::from_str(&last_modified.to_rfc2822()) {
            request.headers_mut().insert(http::header::IF_MODIFIED_SINCE, value);
        }
    }
    request
}

/// Evaluate the downstream client's own conditional headers against the
/// document that's about to be served, after the upstream-facing cache lookup
///
/// `If-Match`/`If-Unmodified-Since` are implemented per RFC 7232 (a
/// precondition failure yields `412`) — see the reference test below
/// and `DESIGN.md`.
fn negotiate_downstream(request_policy: &CachingPolicy, document: &Document) -> Response<Bytes> {
    let policy = document.caching_policy.clone().unwrap_or_default();
    let mut precondition_failed = false;
    let mut not_modified = true;
    let mut any_cache_negotiation = false;

    if let Some(im) = &request_policy.if_match_value {
        if im != "*" && policy.etag.as_deref() != Some(im.as_str()) {
            precondition_failed = true;
        }
    }
    if let Some(ius) = request_policy.if_unmodified_since {
        if policy.last_modified.map(|lm| lm > ius).unwrap_or(false) {
            precondition_failed = true;
        }
    }
    if let Some(inm) = &request_policy.if_none_match_value {
        any_cache_negotiation = true;
        not_modified &= policy.etag.as_deref() == Some(inm.as_str());
    }
    if let Some(ims) = request_policy.if_modified_since {
        any_cache_negotiation = true;
        not_modified &= policy.last_modified.map(|lm| lm <= ims).unwrap_or(false);
    }

    if precondition_failed {
        return Response::builder()
            .status(StatusCode::PRECONDITION_FAILED)
            .body(Bytes::new())
            .unwrap_or_else(|_| Response::new(Bytes::new()));
    }

    if any_cache_negotiation && not_modified {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .body(Bytes::new())
            .unwrap_or_else(|_| Response::new(Bytes::new()));
    }

    response_from_document(document)
}

/// `FetchViaObjectProxyCache(request, client, pathConfig?, noLock)`.
///
/// Runs under the per-key lock unless `no_lock` — the Delta engine's
/// fast-forward sub-call passes `no_lock = true` because it already holds
/// Delta's lock for the same key namespace.
#[tracing::instrument(skip_all, fields(origin = %origin.name))]
pub async fn fetch_via_object_proxy_cache<OC, B>(
    client: &OC,
    backend: &B,
    locks: &LockRegistry,
    origin: &OriginConfig,
    request: Request<Bytes>,
    path_config: Option<&str>,
    no_lock: bool,
) -> Result<ObjectCacheOutcome, CacheError>
where
    OC: OriginClient,
    B: Backend,
{
    let start = Instant::now();
    let request_headers = headers_to_map(request.headers());
    let request_policy = trickster_core::policy::request_caching_policy(&request_headers);
    let path = request.uri().path().to_string();

    let key = format!("{}.{}", origin.host, client.derive_cache_key(&request, path_config, ""));

    let _guard = if no_lock { None } else { Some(locks.acquire(&key).await) };

    if request_policy.no_cache {
        let upstream_request = strip_conditional_headers(request);
        let upstream_response = client.fetch(upstream_request).await?;
        backend.remove(&key).await?;
        metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyOnly, start.elapsed());
        return Ok(ObjectCacheOutcome {
            response: upstream_response,
            was_hit: false,
            status: CacheLookupStatus::ProxyOnly,
        });
    }

    let downstream_request = strip_conditional_headers(clone_request(&request));

    let mut document = load_document(backend, &key).await?;
    let now = Utc::now();
    let is_fresh = document
        .as_ref()
        .and_then(|d| d.caching_policy.as_ref())
        .map(|p| p.is_fresh_at(now))
        .unwrap_or(false);

    let status = if document.is_some() && is_fresh {
        CacheLookupStatus::Hit
    } else if let Some(existing) = document.clone() {
        let can_revalidate = existing.caching_policy.as_ref().map(|p| p.can_revalidate).unwrap_or(false);
        if can_revalidate {
            let policy = existing.caching_policy.clone().unwrap_or_default();
            let conditional_request = add_revalidators(clone_request(&downstream_request), &policy);
            let fetch_result = client.fetch(conditional_request).await;
            let upstream_response = match fetch_result {
                Ok(r) => r,
                Err(e) => {
                    metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyError, start.elapsed());
                    return Err(e);
                }
            };

            if upstream_response.status() == StatusCode::NOT_MODIFIED {
                let fresh_headers = headers_to_map(upstream_response.headers());
                let merged_headers = merge_revalidation_headers(&existing.headers, &fresh_headers);
                let mut new_policy = trickster_core::policy::response_caching_policy(
                    existing.status_code,
                    &origin.negative_cache,
                    &merged_headers,
                );
                new_policy.etag = new_policy.etag.or(policy.etag.clone());
                new_policy.last_modified = new_policy.last_modified.or(policy.last_modified);

                let mut updated = existing;
                updated.headers = merged_headers;
                updated.caching_policy = Some(new_policy.clone());

                let should_remove = new_policy.no_cache
                    || (!new_policy.can_revalidate && new_policy.freshness_lifetime <= 0);
                if should_remove {
                    backend.remove(&key).await?;
                } else {
                    let factor = if new_policy.can_revalidate { origin.revalidation_factor as i64 } else { 1 };
                    let mut ttl_secs = new_policy.freshness_lifetime.saturating_mul(factor);
                    let cap = origin.max_ttl.as_secs() as i64;
                    if cap > 0 {
                        ttl_secs = ttl_secs.min(cap);
                    }
                    let ttl = std::time::Duration::from_secs(ttl_secs.max(0) as u64);
                    let raw = encode_document(&updated)?;
                    backend.set(&key, raw, ttl).await?;
                }

                document = Some(updated);
                CacheLookupStatus::RevalidationHit
            } else {
                let (parts, body) = upstream_response.into_parts();
                let headers = headers_to_map(&parts.headers);
                let new_document = apply_caching_decision(backend, origin, &key, parts.status.as_u16(), headers, body).await?;
                document = Some(new_document);
                CacheLookupStatus::Hit
            }
        } else {
            backend.remove(&key).await?;
            let fetch_result = client.fetch(downstream_request).await;
            let upstream_response = match fetch_result {
                Ok(r) => r,
                Err(e) => {
                    metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyError, start.elapsed());
                    return Err(e);
                }
            };
            let (parts, body) = upstream_response.into_parts();
            let headers = headers_to_map(&parts.headers);
            let new_document = apply_caching_decision(backend, origin, &key, parts.status.as_u16(), headers, body).await?;
            document = Some(new_document);
            CacheLookupStatus::KeyMiss
        }
    } else {
        let fetch_result = client.fetch(downstream_request).await;
        let upstream_response = match fetch_result {
            Ok(r) => r,
            Err(e) => {
                metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyError, start.elapsed());
                return Err(e);
            }
        };
        let (parts, body) = upstream_response.into_parts();
        let headers = headers_to_map(&parts.headers);
        let new_document = apply_caching_decision(backend, origin, &key, parts.status.as_u16(), headers, body).await?;
        document = Some(new_document);
        CacheLookupStatus::KeyMiss
    };

    let document = document.expect("every branch above populates document before falling through");
    let response = negotiate_downstream(&request_policy, &document);
    let was_hit = matches!(status, CacheLookupStatus::Hit | CacheLookupStatus::RevalidationHit);

    metrics::record_request(&origin.name, &origin.origin_type, &path, status, start.elapsed());

    Ok(ObjectCacheOutcome { response, was_hit, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn policy(if_none_match: Option<&str>, if_match: Option<&str>) -> CachingPolicy {
        CachingPolicy {
            if_none_match_value: if_none_match.map(str::to_string),
            if_match_value: if_match.map(str::to_string),
            ..Default::default()
        }
    }

    fn doc_with_etag(etag: &str) -> Document {
        let mut doc = Document::new(200, "200 OK".into(), Default::default(), Bytes::from_static(b"hi"));
        doc.caching_policy = Some(CachingPolicy {
            etag: Some(etag.to_string()),
            local_date: Utc::now(),
            freshness_lifetime: 60,
            ..Default::default()
        });
        doc
    }

    #[test]
    fn if_none_match_hit_yields_304() {
        let req_policy = policy(Some("\"v1\""), None);
        let doc = doc_with_etag("\"v1\"");
        let response = negotiate_downstream(&req_policy, &doc);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.body().is_empty());
    }

    #[test]
    fn if_none_match_miss_yields_body() {
        let req_policy = policy(Some("\"stale\""), None);
        let doc = doc_with_etag("\"v1\"");
        let response = negotiate_downstream(&req_policy, &doc);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hi");
    }

    /// Reference test: `If-Match` follows
    /// RFC 7232 (precondition failure -> 412 on mismatch).
    #[test]
    fn if_match_mismatch_yields_412_per_rfc7232() {
        let req_policy = policy(None, Some("\"other\""));
        let doc = doc_with_etag("\"v1\"");
        let response = negotiate_downstream(&req_policy, &doc);
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn if_match_hit_serves_body() {
        let req_policy = policy(None, Some("\"v1\""));
        let doc = doc_with_etag("\"v1\"");
        let response = negotiate_downstream(&req_policy, &doc);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn no_conditional_headers_serves_body() {
        let req_policy = policy(None, None);
        let doc = doc_with_etag("\"v1\"");
        let response = negotiate_downstream(&req_policy, &doc);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn is_fresh_respects_freshness_lifetime() {
        let mut policy = CachingPolicy {
            local_date: Utc::now() - ChronoDuration::seconds(30),
            freshness_lifetime: 60,
            ..Default::default()
        };
        assert!(policy.is_fresh_at(Utc::now()));
        policy.freshness_lifetime = 10;
        assert!(!policy.is_fresh_at(Utc::now()));
    }
}
