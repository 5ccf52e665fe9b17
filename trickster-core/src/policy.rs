//! Derivation of [`CachingPolicy`] from request and response headers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::document::CachingPolicy;

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn cache_control_directives(headers: &HashMap<String, String>) -> Vec<String> {
    let mut directives = Vec::new();
    for name in ["Cache-Control", "Pragma"] {
        if let Some(value) = header(headers, name) {
            directives.extend(value.split(',').map(|d| d.trim().to_ascii_lowercase()));
        }
    }
    directives
}

fn directive_value<'a>(directives: &'a [String], key: &str) -> Option<&'a str> {
    directives
        .iter()
        .find_map(|d| d.strip_prefix(key).map(|rest| rest.trim_start_matches('=')))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Derive the client's request-side [`CachingPolicy`] from its headers.
///
/// Honours `Cache-Control`/`Pragma: no-cache`, `no-transform`,
/// `If-None-Match`, `If-Match`, `If-Modified-Since`, `If-Unmodified-Since`.
pub fn request_caching_policy(headers: &HashMap<String, String>) -> CachingPolicy {
    let directives = cache_control_directives(headers);
    let no_cache = directives.iter().any(|d| d == "no-cache");
    let no_transform = directives.iter().any(|d| d == "no-transform");

    CachingPolicy {
        no_cache,
        no_transform,
        if_none_match_value: header(headers, "If-None-Match").map(str::to_string),
        if_match_value: header(headers, "If-Match").map(str::to_string),
        if_modified_since: header(headers, "If-Modified-Since").and_then(parse_http_date),
        if_unmodified_since: header(headers, "If-Unmodified-Since").and_then(parse_http_date),
        ..Default::default()
    }
}

/// Derive the server's response-side [`CachingPolicy`] from status code and
/// response headers.
///
/// Honours `Cache-Control: max-age`, `s-maxage`, `no-store`, `no-cache`,
/// `must-revalidate`; falls back to `Expires - Date`; consults
/// `negative_cache` for an override TTL on an uncacheable status.
pub fn response_caching_policy(
    status: u16,
    negative_cache: &HashMap<u16, i64>,
    headers: &HashMap<String, String>,
) -> CachingPolicy {
    let directives = cache_control_directives(headers);
    let no_store = directives.iter().any(|d| d == "no-store");
    let no_cache_directive = directives.iter().any(|d| d == "no-cache");
    let must_revalidate = directives.iter().any(|d| d == "must-revalidate");
    let no_transform = directives.iter().any(|d| d == "no-transform");

    let etag = header(headers, "ETag").map(str::to_string);
    let last_modified = header(headers, "Last-Modified").and_then(parse_http_date);
    let can_revalidate = etag.is_some() || last_modified.is_some();

    let local_date = header(headers, "Date")
        .and_then(parse_http_date)
        .unwrap_or_else(Utc::now);

    let mut freshness_lifetime = directive_value(&directives, "s-maxage")
        .or_else(|| directive_value(&directives, "max-age"))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or_else(|| {
            header(headers, "Expires")
                .and_then(parse_http_date)
                .map(|expires| (expires - local_date).num_seconds())
                .unwrap_or(0)
        });

    let is_success = (200..300).contains(&status);
    let mut no_cache = no_store || (no_cache_directive && !can_revalidate);

    if !is_success {
        match negative_cache.get(&status) {
            Some(&ttl) => freshness_lifetime = ttl,
            None => no_cache = true,
        }
    }

    if must_revalidate {
        // must-revalidate forbids serving stale without revalidation; the
        // freshness window itself is unaffected, so nothing else to flip.
    }

    CachingPolicy {
        no_cache,
        no_transform,
        can_revalidate,
        local_date,
        freshness_lifetime,
        etag,
        last_modified,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn request_no_cache_directive_detected() {
        let h = headers(&[("Cache-Control", "no-cache")]);
        let policy = request_caching_policy(&h);
        assert!(policy.no_cache);
    }

    #[test]
    fn response_max_age_sets_freshness_lifetime() {
        let h = headers(&[("Cache-Control", "max-age=120"), ("ETag", "\"v1\"")]);
        let policy = response_caching_policy(200, &HashMap::new(), &h);
        assert_eq!(policy.freshness_lifetime, 120);
        assert!(policy.can_revalidate);
        assert!(!policy.no_cache);
    }

    #[test]
    fn response_negative_cache_overrides_uncacheable_status() {
        let mut negative = HashMap::new();
        negative.insert(404, 30);
        let policy = response_caching_policy(404, &negative, &HashMap::new());
        assert_eq!(policy.freshness_lifetime, 30);
        assert!(!policy.no_cache);
    }

    #[test]
    fn response_uncacheable_status_without_override_is_no_cache() {
        let policy = response_caching_policy(500, &HashMap::new(), &HashMap::new());
        assert!(policy.no_cache);
    }

    #[test]
    fn response_no_store_forces_no_cache() {
        let h = headers(&[("Cache-Control", "no-store, max-age=60")]);
        let policy = response_caching_policy(200, &HashMap::new(), &h);
        assert!(policy.no_cache);
    }
}
