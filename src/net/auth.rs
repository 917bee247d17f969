//! Auth service client
//!
//! Thin client for the external authentication service: one line-framed
//! JSON request/response exchange per login attempt, on a fresh TCP
//! connection. Login sits outside the datagram dispatch path; nothing in
//! the game loop ever waits on this.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Auth service I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Auth service protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("Auth service closed the connection")]
    ConnectionClosed,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    action: &'a str,
    username: &'a str,
    password: &'a str,
}

/// Outcome of a login attempt as reported by the auth service
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AuthResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

pub struct AuthClient {
    server_addr: String,
}

impl AuthClient {
    pub fn new(server_addr: String) -> Self {
        Self { server_addr }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let stream = TcpStream::connect(&self.server_addr).await?;
        debug!("Auth exchange with {} for user {}", self.server_addr, username);

        let request = LoginRequest {
            action: "login",
            username,
            password,
        };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');

        let mut stream = BufReader::new(stream);
        stream.get_mut().write_all(&line).await?;

        let mut response_line = String::new();
        let read = stream.read_line(&mut response_line).await?;
        if read == 0 {
            return Err(AuthError::ConnectionClosed);
        }
        Ok(serde_json::from_str(&response_line)?)
    }
}
