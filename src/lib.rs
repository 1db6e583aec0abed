//! Two-process chat demo built on a hosted messaging backend.
//!
//! The `proxy` subcommand runs a small directory/auth service that forwards
//! user creation and token minting to the backend; the `client` subcommand
//! runs an interactive terminal session that registers through the proxy,
//! connects to the backend, and relays messages for one chosen room. Each
//! module focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for proxy and client modes.
//! - [`api`] holds the JSON payload types spoken on both HTTP boundaries.
//! - [`proxy`] serves the two directory/auth endpoints and relays backend
//!   responses verbatim, save for the duplicate-identity case.
//! - [`token`] fetches token material from the proxy on the client's behalf.
//! - [`backend`] is the client-side handle for the hosted backend: room
//!   listing, joining, sending, and the realtime room subscription.
//! - [`client`] drives the sequential session flow and the relay loop.
//!
//! Integration tests use this crate directly against a mock backend to
//! exercise the proxy pass-through rules and the subscription semantics.

pub mod api;
pub mod backend;
pub mod cli;
pub mod client;
pub mod proxy;
pub mod token;
