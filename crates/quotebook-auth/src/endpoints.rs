//! Auth endpoint paths on the Quotebook backend
//!
//! Paths are relative to the host-configured base URL.

/// Login endpoint (OAuth2 password form: `username` + `password`)
pub const LOGIN_PATH: &str = "/auth/login";

/// Refresh endpoint (JSON body carrying the refresh token)
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Join a base URL and an endpoint path.
///
/// Tolerates a trailing slash on the base and a missing leading slash on
/// the path, so configuration typos don't produce `//auth/login` URLs.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
