//! Token exchanges against the auth endpoints
//!
//! Handles the two auth endpoint interactions:
//! 1. Login (OAuth2 password form, establishes the first pair)
//! 2. Refresh (exchanges the refresh token for a new pair)
//!
//! Both POST to paths under the host-configured base URL. The backend also
//! returns a `token_type` field; it is always `bearer` and is ignored here.

use serde::{Deserialize, Serialize};

use crate::endpoints::{LOGIN_PATH, REFRESH_PATH, join_url};
use crate::error::{Error, Result};

/// Response from the login and refresh endpoints.
///
/// The two tokens always arrive together and are stored together. Fields
/// beyond these two are ignored.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Exchange a username and password for the first token pair.
///
/// The backend expects an OAuth2 password form, so credentials go out
/// form-encoded rather than as JSON.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(join_url(base_url, LOGIN_PATH))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::LoginRejected {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Parse(format!("invalid login response: {e}")))
}

/// Exchange a refresh token for a new token pair.
///
/// Called by the request client when an access token is rejected. Any
/// non-success status means the session cannot be recovered with this
/// refresh token.
pub async fn refresh(
    client: &reqwest::Client,
    base_url: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(join_url(base_url, REFRESH_PATH))
        .json(&serde_json::json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::RefreshRejected {
                status: status.as_u16(),
                body,
            });
        }

        return Err(Error::Refresh(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Parse(format!("invalid refresh response: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Form, Json, Router, http::StatusCode, routing::post};

    use super::*;

    async fn start_auth_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn refresh_router() -> Router {
        Router::new().route(
            REFRESH_PATH,
            post(|Json(body): Json<serde_json::Value>| async move {
                if body["refresh_token"] == "rt_live" {
                    (
                        StatusCode::OK,
                        Json(serde_json::json!({
                            "access_token": "at_new",
                            "token_type": "bearer",
                            "refresh_token": "rt_next",
                        })),
                    )
                } else {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(serde_json::json!({ "detail": "Invalid refresh token" })),
                    )
                }
            }),
        )
    }

    fn login_router() -> Router {
        Router::new().route(
            LOGIN_PATH,
            post(|Form(fields): Form<HashMap<String, String>>| async move {
                let username = fields.get("username").map(String::as_str);
                let password = fields.get("password").map(String::as_str);
                if username == Some("ada") && password == Some("hunter2") {
                    (
                        StatusCode::OK,
                        Json(serde_json::json!({
                            "access_token": "at_login",
                            "token_type": "bearer",
                            "refresh_token": "rt_login",
                        })),
                    )
                } else {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(serde_json::json!({ "detail": "Incorrect username or password" })),
                    )
                }
            }),
        )
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"access_token":"at_abc","token_type":"bearer","refresh_token":"rt_def"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.refresh_token, "rt_def");
    }

    #[test]
    fn token_response_serializes() {
        let token = TokenResponse {
            access_token: "at_test".into(),
            refresh_token: "rt_test".into(),
        };
        let json = serde_json::to_string(&token).unwrap();
        assert!(json.contains("\"access_token\":\"at_test\""));
        assert!(json.contains("\"refresh_token\":\"rt_test\""));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_and_parses_pair() {
        let base = start_auth_server(refresh_router()).await;
        let client = reqwest::Client::new();

        let token = refresh(&client, &base, "rt_live").await.unwrap();
        assert_eq!(token.access_token, "at_new");
        assert_eq!(token.refresh_token, "rt_next");
    }

    #[tokio::test]
    async fn refresh_rejection_carries_status_and_body() {
        let base = start_auth_server(refresh_router()).await;
        let client = reqwest::Client::new();

        match refresh(&client, &base, "rt_revoked").await {
            Err(Error::RefreshRejected { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid refresh token"));
            }
            other => panic!("expected RefreshRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_server_error_is_refresh_failure() {
        let app = Router::new().route(
            REFRESH_PATH,
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = start_auth_server(app).await;
        let client = reqwest::Client::new();

        match refresh(&client, &base, "rt_live").await {
            Err(Error::Refresh(msg)) => assert!(msg.contains("500")),
            other => panic!("expected Refresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_malformed_success_body_is_parse_error() {
        let app = Router::new().route(
            REFRESH_PATH,
            post(|| async { (StatusCode::OK, "not json") }),
        );
        let base = start_auth_server(app).await;
        let client = reqwest::Client::new();

        let result = refresh(&client, &base, "rt_live").await;
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn login_sends_form_credentials() {
        let base = start_auth_server(login_router()).await;
        let client = reqwest::Client::new();

        let token = login(&client, &base, "ada", "hunter2").await.unwrap();
        assert_eq!(token.access_token, "at_login");
        assert_eq!(token.refresh_token, "rt_login");
    }

    #[tokio::test]
    async fn login_rejection_carries_status_and_body() {
        let base = start_auth_server(login_router()).await;
        let client = reqwest::Client::new();

        match login(&client, &base, "ada", "wrong").await {
            Err(Error::LoginRejected { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Incorrect username or password"));
            }
            other => panic!("expected LoginRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        // Port 1 is never listening; the connection is refused immediately
        let client = reqwest::Client::new();
        let result = refresh(&client, "http://127.0.0.1:1", "rt_live").await;
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
