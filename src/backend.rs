//! Client-side handle for the hosted chat backend: room listing, joining,
//! sending, and the realtime room subscription. Inbound delivery is modeled
//! as a channel rather than a callback: a reader task consumes the WebSocket
//! and feeds an mpsc queue in arrival order, and dropping the subscription
//! aborts the task.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::{
    api::{ChatMessage, Room},
    token::TokenProvider,
};

/// Options for a room subscription. `message_limit` is the number of
/// historical messages the backend replays before live delivery starts;
/// the session client always asks for zero.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    pub message_limit: u32,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self { message_limit: 0 }
    }
}

/// A connected backend session for one identity.
pub struct BackendSession {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    token: String,
}

impl BackendSession {
    /// Fetches a token through the provider and builds a session handle.
    /// Token rejection here is fatal for the caller; there are no retries.
    pub async fn connect(
        http: reqwest::Client,
        base_url: &str,
        user_id: &str,
        tokens: &TokenProvider,
    ) -> Result<Self> {
        let grant = tokens
            .fetch(user_id)
            .await
            .context("failed to obtain an access token")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            token: grant.access_token,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Rooms the identity already belongs to, in backend order.
    pub async fn joined_rooms(&self) -> Result<Vec<Room>> {
        self.fetch_rooms(false).await
    }

    /// Rooms the identity may join but has not.
    pub async fn joinable_rooms(&self) -> Result<Vec<Room>> {
        self.fetch_rooms(true).await
    }

    /// The enumerated list shown to the user: joined rooms first, then
    /// joinable ones. Selection indexes into this list.
    pub async fn available_rooms(&self) -> Result<Vec<Room>> {
        let mut rooms = self.joined_rooms().await?;
        rooms.extend(self.joinable_rooms().await?);
        Ok(rooms)
    }

    pub async fn join_room(&self, room_id: &str) -> Result<Room> {
        let url = format!("{}/users/{}/rooms/{}/join", self.base_url, self.user_id, room_id);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed to reach the backend at {}", self.base_url))?;
        let response = expect_success(response, "joining the room").await?;
        response
            .json::<Room>()
            .await
            .context("backend returned an unexpected join payload")
    }

    pub async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/rooms/{room_id}/messages", self.base_url);
        let message = ChatMessage {
            sender_id: self.user_id.clone(),
            text: text.to_string(),
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&message)
            .send()
            .await
            .with_context(|| format!("failed to reach the backend at {}", self.base_url))?;
        expect_success(response, "sending the message").await?;
        Ok(())
    }

    /// Opens the realtime subscription for a room and spawns the reader
    /// task that feeds the message channel.
    pub async fn subscribe(
        &self,
        room_id: &str,
        options: SubscribeOptions,
    ) -> Result<RoomSubscription> {
        let url = format!(
            "{}/rooms/{}/subscribe?message_limit={}&token={}",
            websocket_base(&self.base_url),
            room_id,
            options.message_limit,
            self.token,
        );
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to subscribe to room {room_id}"))?;

        let (tx, rx) = mpsc::channel(64);
        let reader = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(frame) = stream.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(error) => {
                        debug!(?error, "subscription stream error");
                        break;
                    }
                };
                match frame {
                    Message::Text(payload) => match serde_json::from_str::<ChatMessage>(&payload) {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => debug!(?error, "discarding malformed message frame"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        Ok(RoomSubscription { messages: rx, reader })
    }

    async fn fetch_rooms(&self, joinable: bool) -> Result<Vec<Room>> {
        let url = format!("{}/users/{}/rooms", self.base_url, self.user_id);
        let mut request = self.http.get(url).bearer_auth(&self.token);
        if joinable {
            request = request.query(&[("joinable", "true")]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach the backend at {}", self.base_url))?;
        let response = expect_success(response, "listing rooms").await?;
        response
            .json::<Vec<Room>>()
            .await
            .context("backend returned an unexpected room list")
    }
}

/// One room's realtime feed. Messages arrive in the order the backend
/// pushed them; the channel closes when the backend hangs up. Dropping the
/// subscription cancels the reader task, i.e. leaves the room.
pub struct RoomSubscription {
    messages: mpsc::Receiver<ChatMessage>,
    reader: JoinHandle<()>,
}

impl RoomSubscription {
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.messages.recv().await
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{what} failed with {status}: {body}")
}

fn websocket_base(base_url: &str) -> String {
    match base_url.strip_prefix("https://") {
        Some(rest) => format!("wss://{rest}"),
        None => match base_url.strip_prefix("http://") {
            Some(rest) => format!("ws://{rest}"),
            None => base_url.to_string(),
        },
    }
}
