//! Connection pool: instance id -> at most one connected client

use parking_lot::RwLock;
use srcadmin_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::RconClient;

/// Pool of admin-channel clients keyed by instance id.
///
/// Lookups are concurrent; insert and remove are exclusive. Serialization of
/// request/response rounds is each client's own concern.
#[derive(Default)]
pub struct RconPool {
    clients: RwLock<HashMap<Uuid, Arc<RconClient>>>,
}

impl RconPool {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Existing client for the instance, if any.
    pub fn get(&self, instance_id: Uuid) -> Option<Arc<RconClient>> {
        self.clients.read().get(&instance_id).cloned()
    }

    /// Dial, authenticate, and register a client for the instance.
    /// On dial or auth failure no entry is inserted.
    pub async fn connect(
        &self,
        instance_id: Uuid,
        addr: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<()> {
        if self.clients.read().contains_key(&instance_id) {
            return Err(Error::AlreadyConnected(instance_id.to_string()));
        }

        let client = Arc::new(RconClient::new(addr, password));
        client.connect().await.map_err(|e| {
            debug!(instance = %instance_id, error = %e, "rcon: pool connect failed");
            e
        })?;

        // Re-check under the write lock: a concurrent connect may have won
        {
            let mut clients = self.clients.write();
            if clients.contains_key(&instance_id) {
                drop(clients);
                let racer = client;
                tokio::spawn(async move { racer.close().await });
                return Err(Error::AlreadyConnected(instance_id.to_string()));
            }
            clients.insert(instance_id, client);
        }

        info!(instance = %instance_id, "rcon: pool added connection");
        Ok(())
    }

    /// Run a command on the instance's client.
    pub async fn execute(&self, instance_id: Uuid, command: &str) -> Result<String> {
        let client = self
            .get(instance_id)
            .ok_or_else(|| Error::NotConnected(instance_id.to_string()))?;

        client.execute(command).await.map_err(|e| {
            debug!(instance = %instance_id, command, error = %e, "rcon: execute failed");
            e
        })
    }

    /// Close and remove the instance's client. Missing id is a no-op.
    pub async fn disconnect(&self, instance_id: Uuid) {
        let client = self.clients.write().remove(&instance_id);
        if let Some(client) = client {
            client.close().await;
            info!(instance = %instance_id, "rcon: pool disconnected");
        }
    }

    /// Close every client in the pool.
    pub async fn disconnect_all(&self) {
        let clients: Vec<Arc<RconClient>> = self.clients.write().drain().map(|(_, c)| c).collect();
        for client in clients {
            client.close().await;
        }
        info!("rcon: pool disconnected all");
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
