//! The interactive session: prompt, register, connect, enumerate, select,
//! join, then relay messages until the process is terminated. The flow is
//! strictly sequential; any failure after input validation aborts the
//! process with a printed error and exit status 1.

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
    sync::mpsc,
};
use tracing::warn;

use crate::{
    api::{ChatMessage, RegisterRequest, Room},
    backend::{BackendSession, RoomSubscription, SubscribeOptions},
    cli::ClientArgs,
    token::TokenProvider,
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let http = reqwest::Client::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    let username = prompt_username(&mut stdin).await?;

    register(&http, &args.proxy, &username).await?;
    write_stdout(&format!("Authenticated as {username}")).await?;

    let tokens = TokenProvider::new(format!("{}/authenticate", args.proxy), http.clone());
    let session = BackendSession::connect(http, &args.backend, &username, &tokens).await?;
    write_stdout("Connected").await?;

    let rooms = session.available_rooms().await?;
    write_stdout("Fetched rooms").await?;
    anyhow::ensure!(!rooms.is_empty(), "no rooms available to join");

    write_stdout("Available rooms:").await?;
    for (index, room) in rooms.iter().enumerate() {
        write_stdout(&format!("{index} - {}", room.name)).await?;
    }

    let index = prompt_room_selection(&mut stdin, rooms.len()).await?;
    let room = session.join_room(&rooms[index].id).await?;
    let mut subscription = session
        .subscribe(&room.id, SubscribeOptions { message_limit: 0 })
        .await?;
    write_stdout(&format!("Joined {}", room.name)).await?;

    let mut lines = spawn_line_reader(stdin);
    run_relay_loop(&session, &room, &mut subscription, &mut lines).await
}

async fn register(http: &reqwest::Client, proxy_url: &str, username: &str) -> Result<()> {
    let response = http
        .post(format!("{proxy_url}/users"))
        .json(&RegisterRequest {
            username: username.to_string(),
        })
        .send()
        .await
        .with_context(|| format!("failed to reach the directory proxy at {proxy_url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("failed to create a user: {status}: {body}");
    }
    Ok(())
}

async fn prompt_username<R>(input: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        write_stdout("Enter your username").await?;
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            anyhow::bail!("stdin closed before a username was entered");
        }
        let username = line.trim();
        if !username.is_empty() {
            return Ok(username.to_string());
        }
    }
}

async fn prompt_room_selection<R>(input: &mut R, room_count: usize) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        write_stdout("Select a room").await?;
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            anyhow::bail!("stdin closed before a room was selected");
        }
        match parse_room_selection(&line, room_count) {
            Some(index) => return Ok(index),
            None => {
                write_stdout(&format!(
                    "*** enter a number between 0 and {}",
                    room_count - 1
                ))
                .await?;
            }
        }
    }
}

/// Accepts only an unsigned integer within the enumerated list's bounds.
/// Negative and non-numeric input is rejected outright rather than coerced.
fn parse_room_selection(input: &str, room_count: usize) -> Option<usize> {
    let index: usize = input.trim().parse().ok()?;
    (index < room_count).then_some(index)
}

/// Console lines get their own reader task: `read_line` is not cancel-safe,
/// so a line pending while an inbound frame arrives must not be dropped by
/// the relay loop's `select!`. The channel closes on stdin EOF.
fn spawn_line_reader<R>(mut input: R) -> mpsc::Receiver<String>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match input.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line.clone()).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(?error, "console input failed");
                    break;
                }
            }
        }
    });
    rx
}

async fn run_relay_loop(
    session: &BackendSession,
    room: &Room,
    subscription: &mut RoomSubscription,
    lines: &mut mpsc::Receiver<String>,
) -> Result<()> {
    loop {
        select! {
            inbound = subscription.recv() => {
                match inbound {
                    Some(message) => {
                        if let Some(rendered) = render_inbound(session.user_id(), &message) {
                            write_stdout(&rendered).await?;
                        }
                    }
                    None => anyhow::bail!("lost the subscription to {}", room.name),
                }
            }
            line = lines.recv() => {
                match line {
                    Some(line) => {
                        let text = line.trim_end();
                        if !text.is_empty() {
                            session
                                .send_message(&room.id, text)
                                .await
                                .context("failed to send message")?;
                        }
                    }
                    None => {
                        write_stdout("*** leaving chat").await?;
                        break;
                    }
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

/// Formats an inbound message for the console, or `None` when the sender is
/// the local identity (echo suppression).
fn render_inbound(local_id: &str, message: &ChatMessage) -> Option<String> {
    if message.sender_id == local_id {
        return None;
    }
    Some(format!("{}: {}", message.sender_id, message.text))
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
