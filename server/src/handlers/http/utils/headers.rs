use hyper::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Alternative token header used by browser clients.
pub const TOKEN_HEADER: &str = "x-token";
/// Replacement token sent after an authority switch.
pub const NEW_TOKEN_HEADER: HeaderName = HeaderName::from_static("new-token");
pub const NEW_EXPIRES_AT_HEADER: HeaderName = HeaderName::from_static("new-expires-at");

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| {
        debug!("Retrieved header: {}", name);
        s.to_string()
    })
}

/// Extract bearer token from Authorization header
/// Format: "Authorization: Bearer <token>"
pub fn get_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = auth.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        debug!("Authorization header is not a Bearer token");
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Token from `Authorization: Bearer`, falling back to `x-token`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_bearer_token(headers) {
        return Some(token);
    }

    get_header_value(headers, TOKEN_HEADER)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Add no-cache headers; token responses must never be cached.
pub fn add_no_cache_headers<T>(mut res: hyper::Response<T>) -> hyper::Response<T> {
    let headers = res.headers_mut();

    headers.insert(
        "cache-control",
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert("pragma", HeaderValue::from_static("no-cache"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn bearer_token_is_extracted() {
        let h = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(extract_token(&h).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let h = headers(&[("authorization", "bearer abc")]);
        assert_eq!(get_bearer_token(&h).as_deref(), Some("abc"));
    }

    #[test]
    fn basic_auth_is_ignored() {
        let h = headers(&[("authorization", "Basic dXNlcjpwdw==")]);
        assert_eq!(extract_token(&h), None);
    }

    #[test]
    fn x_token_is_the_fallback() {
        let h = headers(&[("x-token", "tok")]);
        assert_eq!(extract_token(&h).as_deref(), Some("tok"));

        let both = headers(&[("authorization", "Bearer first"), ("x-token", "second")]);
        assert_eq!(extract_token(&both).as_deref(), Some("first"));
    }

    #[test]
    fn empty_values_are_missing() {
        assert_eq!(extract_token(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(extract_token(&headers(&[("x-token", " ")])), None);
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }
}
