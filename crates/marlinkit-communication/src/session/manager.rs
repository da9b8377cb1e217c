//! Multi-printer session management
//!
//! Sessions are independent; the manager only tracks them and guarantees a
//! port is never attached twice.

use super::{Session, SessionConfig, SessionId};
use crate::communication::serial::SerialTransport;
use crate::communication::{ConnectionParams, Transport};
use marlinkit_core::{ConnectionError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every session of a process
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    /// Create a manager whose sessions use `config`
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Configuration given to new sessions
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a detached session so callers can subscribe before
    /// connecting it.
    ///
    /// Fails if another live session already uses the port.
    pub fn create(
        &self,
        transport: Box<dyn Transport>,
        params: ConnectionParams,
    ) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write();
        claim_port(&mut sessions, &params.port)?;
        let session = Arc::new(Session::new(transport, params, self.config.clone()));
        sessions.insert(session.id(), session.clone());
        tracing::debug!("Session {} created for {}", session.id(), session.port());
        Ok(session)
    }

    /// Create and connect a session in one step
    pub async fn attach(
        &self,
        transport: Box<dyn Transport>,
        params: ConnectionParams,
    ) -> Result<Arc<Session>> {
        let session = self.create(transport, params)?;
        if let Err(e) = session.connect().await {
            self.sessions.write().remove(&session.id());
            return Err(e);
        }
        Ok(session)
    }

    /// Attach to a serial port
    pub async fn attach_serial(&self, params: ConnectionParams) -> Result<Arc<Session>> {
        let transport = SerialTransport::new(params.port.clone());
        self.attach(Box::new(transport), params).await
    }

    /// Disconnect and forget a session
    pub async fn detach(&self, id: SessionId) -> Result<()> {
        let session = self.sessions.write().remove(&id);
        match session {
            Some(session) => session.disconnect().await,
            None => Err(ConnectionError::NotConnected.into()),
        }
    }

    /// Disconnect and forget every session
    pub async fn detach_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            if let Err(e) = session.disconnect().await {
                tracing::warn!("Failed to detach {}: {}", session.port(), e);
            }
        }
    }

    /// Look up a session by id
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Look up a session by port
    pub fn find_by_port(&self, port: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .find(|s| s.port() == port)
            .cloned()
    }

    /// All sessions
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True when no sessions exist
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Check a port is free; sessions whose link failed give their port up
fn claim_port(sessions: &mut HashMap<SessionId, Arc<Session>>, port: &str) -> Result<()> {
    let stale: Vec<SessionId> = sessions
        .values()
        .filter(|s| s.port() == port && !s.is_attached() && s.last_error().is_some())
        .map(|s| s.id())
        .collect();
    for id in stale {
        tracing::debug!("Dropping failed session {} on {}", id, port);
        sessions.remove(&id);
    }

    if sessions.values().any(|s| s.port() == port) {
        tracing::warn!("Port {} is already attached", port);
        return Err(ConnectionError::AlreadyAttached {
            port: port.to_string(),
        }
        .into());
    }
    Ok(())
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
