//! JSON payload types shared by the proxy, the client, and the tests' mock
//! backend. The backend boundary is external; these types pin down the shape
//! both processes rely on.

use serde::{Deserialize, Serialize};

/// Error code the backend reports when a user id is already registered.
/// The proxy normalizes this one case to success.
pub const ERR_USER_ALREADY_EXISTS: &str = "user_already_exists";

/// Body of `POST {proxy}/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

/// Body the proxy forwards to `POST {backend}/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub name: String,
}

/// Body the proxy forwards to `POST {backend}/tokens`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub user_id: String,
}

/// Token material minted by the backend, relayed verbatim by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

/// A room as enumerated from the backend. Never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// One chat message, in both transport directions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_id: String,
    pub text: String,
}

/// Error payload shape used by the backend (and by the proxy when the
/// backend is unreachable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
