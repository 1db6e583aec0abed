#![allow(dead_code)]

//! In-process stand-in for the hosted chat backend, plus a proxy spawner.
//! The mock honors the same HTTP+WebSocket boundary the real backend would:
//! user creation with a duplicate-identity error code, token minting,
//! joined/joinable room listing, joining, message posting, and a realtime
//! subscription that replays `message_limit` historical messages before
//! going live.

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use room_relay::{
    api::{ChatMessage, ErrorBody, NewUser, Room, TokenGrant, TokenRequest, ERR_USER_ALREADY_EXISTS},
    proxy::Proxy,
};
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::{broadcast, oneshot},
    task::JoinHandle,
    time::timeout,
};

pub fn room(id: &str, name: &str) -> Room {
    Room {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub struct MockBackend {
    addr: SocketAddr,
    pub state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn spawn(catalog: Vec<Room>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let feeds = catalog
            .iter()
            .map(|room| (room.id.clone(), broadcast::channel(64).0))
            .collect();
        let (quiesce, _) = broadcast::channel(1);
        let state = Arc::new(MockState {
            users: Mutex::new(HashSet::new()),
            joined: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            catalog,
            feeds,
            quiesce,
        });

        let app = router(Arc::clone(&state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            server,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Hangs up like a backend outage: open subscriptions are closed, the
    /// listener stops accepting, and the server is awaited out.
    pub async fn shutdown(mut self) {
        let _ = self.state.quiesce.send(());
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = timeout(Duration::from_secs(5), &mut self.server).await;
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub struct MockState {
    users: Mutex<HashSet<String>>,
    joined: Mutex<HashMap<String, Vec<String>>>,
    history: Mutex<HashMap<String, Vec<ChatMessage>>>,
    catalog: Vec<Room>,
    feeds: HashMap<String, broadcast::Sender<ChatMessage>>,
    quiesce: broadcast::Sender<()>,
}

impl MockState {
    /// Every message posted to a room, in arrival order.
    pub fn messages_in(&self, room_id: &str) -> Vec<ChatMessage> {
        let history = self.history.lock().unwrap();
        history.get(room_id).cloned().unwrap_or_default()
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/tokens", post(mint_token))
        .route("/users/:user_id/rooms", get(list_rooms))
        .route("/users/:user_id/rooms/:room_id/join", post(join_room))
        .route("/rooms/:room_id/messages", post(post_message))
        .route("/rooms/:room_id/subscribe", get(subscribe))
        .with_state(state)
}

fn error_body(error: &str, description: &str) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: error.to_string(),
        description: Some(description.to_string()),
    })
}

async fn create_user(
    State(state): State<Arc<MockState>>,
    Json(new_user): Json<NewUser>,
) -> Response {
    if new_user.id.contains(char::is_whitespace) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            error_body("invalid_username", "usernames may not contain whitespace"),
        )
            .into_response();
    }

    let mut users = state.users.lock().unwrap();
    if !users.insert(new_user.id.clone()) {
        return (
            StatusCode::CONFLICT,
            error_body(ERR_USER_ALREADY_EXISTS, "that id is already registered"),
        )
            .into_response();
    }
    StatusCode::CREATED.into_response()
}

async fn mint_token(
    State(state): State<Arc<MockState>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    let users = state.users.lock().unwrap();
    if !users.contains(&request.user_id) {
        return (
            StatusCode::NOT_FOUND,
            error_body("user_not_found", "no such identity"),
        )
            .into_response();
    }
    Json(TokenGrant {
        access_token: format!("token-{}", request.user_id),
        expires_in: 86_400,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ListRoomsParams {
    joinable: Option<String>,
}

async fn list_rooms(
    Path(user_id): Path<String>,
    Query(params): Query<ListRoomsParams>,
    State(state): State<Arc<MockState>>,
) -> Json<Vec<Room>> {
    let joined = state.joined.lock().unwrap();
    let member_of = joined.get(&user_id).cloned().unwrap_or_default();

    let rooms = if params.joinable.as_deref() == Some("true") {
        state
            .catalog
            .iter()
            .filter(|room| !member_of.contains(&room.id))
            .cloned()
            .collect()
    } else {
        member_of
            .iter()
            .filter_map(|id| state.catalog.iter().find(|room| &room.id == id))
            .cloned()
            .collect()
    };
    Json(rooms)
}

async fn join_room(
    Path((user_id, room_id)): Path<(String, String)>,
    State(state): State<Arc<MockState>>,
) -> Response {
    let Some(room) = state.catalog.iter().find(|room| room.id == room_id) else {
        return (StatusCode::NOT_FOUND, error_body("room_not_found", "no such room")).into_response();
    };

    let mut joined = state.joined.lock().unwrap();
    let member_of = joined.entry(user_id).or_default();
    if !member_of.contains(&room.id) {
        member_of.push(room.id.clone());
    }
    Json(room.clone()).into_response()
}

async fn post_message(
    Path(room_id): Path<String>,
    State(state): State<Arc<MockState>>,
    Json(message): Json<ChatMessage>,
) -> Response {
    let Some(feed) = state.feeds.get(&room_id) else {
        return (StatusCode::NOT_FOUND, error_body("room_not_found", "no such room")).into_response();
    };

    {
        let mut history = state.history.lock().unwrap();
        history.entry(room_id).or_default().push(message.clone());
    }
    // No subscribers is fine; the message is still recorded.
    let _ = feed.send(message);
    StatusCode::CREATED.into_response()
}

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    #[serde(default)]
    message_limit: usize,
    token: Option<String>,
}

async fn subscribe(
    Path(room_id): Path<String>,
    Query(params): Query<SubscribeParams>,
    State(state): State<Arc<MockState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(feed) = state.feeds.get(&room_id) else {
        return (StatusCode::NOT_FOUND, error_body("room_not_found", "no such room")).into_response();
    };

    let backlog: Vec<ChatMessage> = {
        let history = state.history.lock().unwrap();
        let messages = history.get(&room_id).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(params.message_limit);
        messages[skip..].to_vec()
    };
    let receiver = feed.subscribe();
    let quiesce = state.quiesce.subscribe();

    ws.on_upgrade(move |socket| stream_room(socket, backlog, receiver, quiesce))
}

async fn stream_room(
    mut socket: WebSocket,
    backlog: Vec<ChatMessage>,
    mut receiver: broadcast::Receiver<ChatMessage>,
    mut quiesce: broadcast::Receiver<()>,
) {
    for message in backlog {
        if send_frame(&mut socket, &message).await.is_err() {
            return;
        }
    }
    loop {
        tokio::select! {
            message = receiver.recv() => {
                let Ok(message) = message else { return };
                if send_frame(&mut socket, &message).await.is_err() {
                    return;
                }
            }
            _ = quiesce.recv() => return,
        }
    }
}

async fn send_frame(socket: &mut WebSocket, message: &ChatMessage) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).expect("serialize message frame");
    socket.send(WsMessage::Text(payload)).await
}

pub struct ProxyHandle {
    pub url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

pub async fn spawn_proxy(backend_url: &str) -> Result<ProxyHandle> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let proxy = Proxy::new(listener, backend_url.to_string());
    let addr = proxy.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = proxy.run_until(shutdown).await;
    });

    Ok(ProxyHandle {
        url: format!("http://{addr}"),
        shutdown: Some(shutdown_tx),
        task,
    })
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}
