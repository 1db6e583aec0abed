//! The directory/auth proxy: two stateless HTTP endpoints in front of the
//! hosted chat backend. Backend responses pass through verbatim, with one
//! exception: a duplicate-identity error on registration is normalized to
//! success, making registration idempotent by policy.

use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{ErrorBody, NewUser, RegisterRequest, TokenRequest, ERR_USER_ALREADY_EXISTS};

pub struct Proxy {
    listener: TcpListener,
    state: ProxyState,
}

impl Proxy {
    pub fn new(listener: TcpListener, backend_url: String) -> Self {
        Self {
            listener,
            state: ProxyState {
                http: reqwest::Client::new(),
                backend_url: backend_url.trim_end_matches('/').to_string(),
            },
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

#[derive(Clone)]
struct ProxyState {
    http: reqwest::Client,
    backend_url: String,
}

fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/authenticate", get(authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_user(
    State(state): State<ProxyState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let new_user = NewUser {
        id: request.username.clone(),
        name: request.username.clone(),
    };
    let upstream = state
        .http
        .post(format!("{}/users", state.backend_url))
        .json(&new_user)
        .send()
        .await;

    match upstream {
        Ok(response) if response.status().is_success() => {
            info!(username = %request.username, "user created");
            StatusCode::CREATED.into_response()
        }
        Ok(response) => {
            let status = response.status();
            let content_type = upstream_content_type(&response);
            let body = response.bytes().await.unwrap_or_default();
            if is_duplicate_identity(&body) {
                info!(username = %request.username, "user already exists");
                StatusCode::OK.into_response()
            } else {
                relay(status, content_type, body)
            }
        }
        Err(error) => backend_unreachable(error),
    }
}

#[derive(Debug, Deserialize)]
struct AuthenticateParams {
    user_id: String,
}

async fn authenticate(
    State(state): State<ProxyState>,
    Query(params): Query<AuthenticateParams>,
) -> Response {
    let request = TokenRequest {
        user_id: params.user_id,
    };
    let upstream = state
        .http
        .post(format!("{}/tokens", state.backend_url))
        .json(&request)
        .send()
        .await;

    match upstream {
        Ok(response) => {
            // Token material and token errors alike are relayed verbatim.
            let status = response.status();
            let content_type = upstream_content_type(&response);
            let body = response.bytes().await.unwrap_or_default();
            relay(status, content_type, body)
        }
        Err(error) => backend_unreachable(error),
    }
}

fn is_duplicate_identity(body: &[u8]) -> bool {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|payload| payload.error == ERR_USER_ALREADY_EXISTS)
        .unwrap_or(false)
}

fn upstream_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

fn relay(status: reqwest::StatusCode, content_type: Option<String>, body: Bytes) -> Response {
    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, body).into_response();
    if let Some(value) = content_type.and_then(|value| HeaderValue::from_str(&value).ok()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

fn backend_unreachable(error: reqwest::Error) -> Response {
    warn!(?error, "backend unreachable");
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody {
            error: "backend_unreachable".to_string(),
            description: Some(error.to_string()),
        }),
    )
        .into_response()
}
