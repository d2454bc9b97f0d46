use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

/// Shared secret gating the history endpoint.
#[derive(Clone)]
pub struct HistoryKey {
    value: String,
}

impl HistoryKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Constant-time comparison. Length differences still short-circuit,
    /// which leaks only the length of the configured key.
    pub fn verify(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        self.value.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl std::fmt::Debug for HistoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HistoryKey(****)")
    }
}

/// Picks the presented secret from the `Authorization` header (raw or
/// `Bearer` form) and falls back to the `key` query parameter. Values are
/// compared as sent; only an exact `Bearer ` prefix is removed.
pub fn presented_history_key(headers: &HeaderMap, query_key: Option<&str>) -> Option<String> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value))
        .filter(|value| !value.is_empty());

    header_value
        .or_else(|| query_key.filter(|value| !value.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn verify_accepts_only_exact_match() {
        let key = HistoryKey::new("secret");

        assert!(key.verify("secret"));
        assert!(!key.verify("Secret"));
        assert!(!key.verify("secret "));
        assert!(!key.verify("secre"));
        assert!(!key.verify(""));
    }

    #[test]
    fn debug_does_not_print_the_secret() {
        let key = HistoryKey::new("secret");
        assert_eq!(format!("{:?}", key), "HistoryKey(****)");
    }

    #[test]
    fn header_takes_precedence_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("from-header"));

        let presented = presented_history_key(&headers, Some("from-query"));

        assert_eq!(presented.as_deref(), Some("from-header"));
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));

        assert_eq!(presented_history_key(&headers, None).as_deref(), Some("abc"));
    }

    #[test]
    fn padded_values_are_passed_through_untouched() {
        let key = HistoryKey::new("letmein");

        let presented = presented_history_key(&HeaderMap::new(), Some(" letmein ")).unwrap();
        assert_eq!(presented, " letmein ");
        assert!(!key.verify(&presented));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  letmein"));
        let presented = presented_history_key(&headers, None).unwrap();
        assert_eq!(presented, " letmein");
        assert!(!key.verify(&presented));
    }

    #[test]
    fn query_is_used_when_header_missing_or_not_utf8() {
        let headers = HeaderMap::new();
        assert_eq!(
            presented_history_key(&headers, Some("q")).as_deref(),
            Some("q")
        );

        let mut bad_headers = HeaderMap::new();
        let non_utf8 = HeaderValue::from_bytes(&[0xFF, 0xFE, 0xFD])
            .expect("header value bytes should be accepted");
        bad_headers.insert(header::AUTHORIZATION, non_utf8);
        assert_eq!(
            presented_history_key(&bad_headers, Some("q")).as_deref(),
            Some("q")
        );
        assert_eq!(presented_history_key(&bad_headers, None), None);
    }
}
