use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::chat::ClientIdentity;

pub const CLIENT_KEY_HEADER: &str = "x-client-key";
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// A client that sends body `client_key` or `x-client-key` gets a history
/// under that key. Everyone else is rate limited by the first
/// `x-forwarded-for` hop or the peer address and stays stateless.
pub fn resolve_client_identity(
    body_key: Option<&str>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> ClientIdentity {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let explicit = [body_key.map(str::to_string), header(CLIENT_KEY_HEADER)]
        .into_iter()
        .flatten()
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty());
    if let Some(key) = explicit {
        return ClientIdentity::keyed(key);
    }

    let rate_key = header("x-forwarded-for")
        .and_then(|chain| chain.split(',').next().map(|hop| hop.trim().to_string()))
        .filter(|hop| !hop.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string());
    ClientIdentity::anonymous(rate_key)
}
