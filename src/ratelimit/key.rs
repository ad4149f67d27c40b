//! Client identity key derivation.

use axum::http::{HeaderMap, Request};

/// Header carrying the proxy chain; the first entry is the originating client.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Header carrying the client address as seen by the edge proxy.
pub const REAL_IP_HEADER: &str = "x-real-ip";
/// Identity shared by every client whose address cannot be determined.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// A key that identifies one client on one endpoint.
///
/// All clients without address headers collapse into the shared
/// [`UNKNOWN_IDENTITY`] bucket and compete for the same quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    /// The client address, or `unknown`
    pub identity: String,
    /// The request path (no query string)
    pub path: String,
}

impl ClientKey {
    /// Derive the key for an inbound request.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_parts(request.headers(), request.uri().path())
    }

    /// Derive the key from request headers and a path.
    pub fn from_parts(headers: &HeaderMap, path: &str) -> Self {
        Self {
            identity: client_identity(headers),
            path: path.to_string(),
        }
    }

    /// Convert the key to the string used by the window store.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.identity, self.path)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

/// Pick the client identity from forwarding headers.
///
/// Order: first `x-forwarded-for` entry, then `x-real-ip`, then `unknown`.
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| header_str(headers, REAL_IP_HEADER))
        .unwrap_or(UNKNOWN_IDENTITY)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
