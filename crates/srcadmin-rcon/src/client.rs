//! Single-connection RCON client
//!
//! One TCP session per client. All request/response rounds are serialized by
//! the client's own mutex; the protocol has no in-flight pipelining. Long
//! responses arrive as several VALUE fragments, so `execute` follows each
//! command with an empty VALUE "sentinel" frame: the server processes
//! requests in order and echoes the sentinel back once the real response has
//! been fully written, which terminates reassembly deterministically.

use srcadmin_core::constants::RCON_TIMEOUT;
use srcadmin_core::{Error, Result};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::packet::{read_packet, write_packet, Packet, TYPE_AUTH, TYPE_EXEC, TYPE_VALUE};

struct Session {
    conn: Option<TcpStream>,
    next_request_id: i32,
}

impl Session {
    /// Request ids start at 1 and wrap back to 1, never emitting 0 or
    /// negative numbers (-1 is the server's auth-failure marker).
    fn next_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        if self.next_request_id < 1 {
            self.next_request_id = 1;
        }
        id
    }
}

/// A single authenticated admin-channel session.
pub struct RconClient {
    addr: String,
    password: String,
    session: Mutex<Session>,
}

impl RconClient {
    /// Create a new client. Call `connect` to establish the session.
    pub fn new(addr: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: password.into(),
            session: Mutex::new(Session {
                conn: None,
                next_request_id: 1,
            }),
        }
    }

    /// Dial and authenticate. A second call on a connected client is a no-op.
    ///
    /// The server signals auth failure by responding with request id -1; on
    /// success it echoes the request id back.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.conn.is_some() {
            return Ok(());
        }

        let mut conn = timeout(RCON_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| Error::timeout(format!("dial {}", self.addr)))??;

        let auth_id = session.next_request_id();
        let auth = Packet::new(auth_id, TYPE_AUTH, self.password.clone());
        send(&mut conn, &auth).await?;

        let resp = recv(&mut conn).await?;
        if resp.request_id == -1 {
            debug!(addr = %self.addr, "rcon: server rejected credentials");
            return Err(Error::AuthFailed);
        }

        session.conn = Some(conn);
        info!(addr = %self.addr, "rcon: connected and authenticated");
        Ok(())
    }

    /// Execute a command and return the complete response body.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let mut session = self.session.lock().await;

        let exec_id = session.next_request_id();
        let sentinel_id = session.next_request_id();
        let conn = session
            .conn
            .as_mut()
            .ok_or_else(|| Error::NotConnected(self.addr.clone()))?;

        send(conn, &Packet::new(exec_id, TYPE_EXEC, command)).await?;
        // Empty VALUE frame; the server echoes it after the real response
        send(conn, &Packet::new(sentinel_id, TYPE_VALUE, "")).await?;

        let mut out = String::new();
        loop {
            let resp = match recv(conn).await {
                Ok(resp) => resp,
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            if resp.is_sentinel(sentinel_id) {
                break;
            }
            if resp.request_id == exec_id && resp.packet_type == TYPE_VALUE {
                out.push_str(&resp.body);
            }
        }

        Ok(out)
    }

    /// Close the session. Idempotent.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut conn) = session.conn.take() {
            use tokio::io::AsyncWriteExt;
            let _ = conn.shutdown().await;
            info!(addr = %self.addr, "rcon: disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.conn.is_some()
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

async fn send(conn: &mut TcpStream, packet: &Packet) -> Result<()> {
    timeout(RCON_TIMEOUT, write_packet(conn, packet))
        .await
        .map_err(|_| Error::timeout("rcon write"))?
}

async fn recv(conn: &mut TcpStream) -> Result<Packet> {
    timeout(RCON_TIMEOUT, read_packet(conn))
        .await
        .map_err(|_| Error::timeout("rcon read"))?
}
