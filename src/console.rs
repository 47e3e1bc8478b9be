use anyhow::Context as _;
use dialoguer::{Input, Password};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{http::LoginResponse, render::help_text, session::SessionId};

const MAX_LOGIN_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct CommandReply {
    output: String,
    closed: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: ErrorReplyBody,
}

#[derive(Debug, Deserialize)]
struct ErrorReplyBody {
    message: String,
}

/// Thin HTTP client for the front door.
pub struct FrontDoorClient {
    client: reqwest::Client,
    base_url: String,
}

impl FrontDoorClient {
    pub fn try_new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The inner `Err` carries the front door's reason for refusing the login.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Result<SessionId, String>> {
        let resp = self
            .client
            .post(format!("{}/api/login", self.base_url))
            .json(&json!({"username": username, "password": password}))
            .send()
            .await
            .context("send login request")?;
        if resp.status().is_success() {
            let body = resp
                .json::<LoginResponse>()
                .await
                .context("parse login response")?;
            return Ok(Ok(body.session_id));
        }
        Ok(Err(error_message(resp).await))
    }

    /// Sends one line and returns `(output, closed)`.
    pub async fn send(&self, session_id: SessionId, line: &str) -> anyhow::Result<(String, bool)> {
        let resp = self
            .client
            .post(format!(
                "{}/api/sessions/{session_id}/commands",
                self.base_url
            ))
            .json(&json!({ "line": line }))
            .send()
            .await
            .context("send command")?;
        if !resp.status().is_success() {
            return Ok((format!("✗ {}", error_message(resp).await), true));
        }
        let reply = resp
            .json::<CommandReply>()
            .await
            .context("parse command reply")?;
        Ok((reply.output, reply.closed))
    }
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorReply>().await {
        Ok(body) => body.error.message,
        Err(_) => format!("request failed with status {status}"),
    }
}

/// Interactive login followed by a read-eval-print loop until the session is closed.
pub async fn run(server: &str) -> anyhow::Result<()> {
    let client = FrontDoorClient::try_new(server)?;

    let mut session_id = None;
    for _ in 0..MAX_LOGIN_ATTEMPTS {
        let username: String = Input::new().with_prompt("username").interact_text()?;
        let password = Password::new().with_prompt("password").interact()?;
        match client.login(&username, &password).await? {
            Ok(id) => {
                session_id = Some(id);
                break;
            }
            Err(reason) => println!("✗ login failed: {reason}"),
        }
    }
    let Some(session_id) = session_id else {
        anyhow::bail!("too many failed login attempts");
    };
    println!("logged in as client {session_id}; type HELP for the command list");

    loop {
        let line: String = Input::new()
            .with_prompt(">")
            .allow_empty(true)
            .interact_text()?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("help") {
            println!("{}", help_text());
            continue;
        }
        debug!(session_id, line = trimmed, "sending command");
        let (output, closed) = client.send(session_id, trimmed).await?;
        println!("{output}");
        if closed {
            return Ok(());
        }
    }
}
