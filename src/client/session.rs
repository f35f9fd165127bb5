//! Query sessions over a transport.
//!
//! A session owns its transport and walks a small lifecycle: ready once the
//! transport is built, introspected after the schema arrives, executing
//! thereafter, and closed exactly once. Closing is the only transition
//! that sticks; a fault leaves the session in `Failed` but a later
//! successful call moves it forward again, which is what lets the retry
//! policies re-drive the same session.

use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;

use super::query::QueryDocument;
use super::schema::{SchemaIndex, INTROSPECTION_QUERY};
use super::transport::{BlockingTransport, HttpTransport, QueryTransport};
use super::{ClientError, ClientResult};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    TransportReady,
    SchemaIntrospected,
    QueryExecuted,
    Closed,
    Failed,
}

/// An async session; generic over the transport so tests can script one.
pub struct Session<T: QueryTransport = HttpTransport> {
    transport: T,
    state: Mutex<SessionState>,
    schema: Mutex<Option<SchemaIndex>>,
}

impl Session<HttpTransport> {
    /// Build the transport from config. A config or TLS problem here means
    /// the session never leaves `Unconfigured`.
    pub fn open(config: &ClientConfig) -> ClientResult<Self> {
        let transport = HttpTransport::new(config)?;
        info!(endpoint = transport.endpoint(), "session transport ready");
        Ok(Self::with_transport(transport))
    }
}

impl<T: QueryTransport> Session<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState::TransportReady),
            schema: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.state() == SessionState::Closed {
            return Err(ClientError::SessionClosed);
        }
        Ok(())
    }

    /// Fetch and index the schema. Runs the wire introspection at most
    /// once; later calls are free.
    pub async fn introspect(&self) -> ClientResult<()> {
        self.ensure_open()?;
        if self
            .schema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
        {
            return Ok(());
        }
        let data = match self.transport.post(INTROSPECTION_QUERY).await {
            Ok(envelope) => envelope.into_data(),
            Err(err) => Err(err),
        };
        let index = match data.and_then(|data| SchemaIndex::from_introspection(&data)) {
            Ok(index) => index,
            Err(err) => {
                self.set_state(SessionState::Failed);
                return Err(err);
            }
        };
        debug!(query_type = index.query_type(), "schema introspected");
        *self.schema.lock().unwrap_or_else(|e| e.into_inner()) = Some(index);
        self.set_state(SessionState::SchemaIntrospected);
        Ok(())
    }

    /// The introspected schema, for building queries against.
    pub fn schema(&self) -> ClientResult<SchemaIndex> {
        self.schema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ClientError::SchemaMissing)
    }

    /// Execute one operation and return its `data`. Application errors come
    /// back as [`ClientError::Query`]; transport faults mark the session
    /// failed without closing it.
    pub async fn execute(&self, document: &QueryDocument) -> ClientResult<Value> {
        self.ensure_open()?;
        if self
            .schema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
        {
            return Err(ClientError::SchemaMissing);
        }
        let query = document.render();
        debug!(%query, "executing query");
        match self.transport.post(&query).await {
            Ok(envelope) => {
                let data = envelope.into_data()?;
                self.set_state(SessionState::QueryExecuted);
                Ok(data)
            }
            Err(err) => {
                self.set_state(SessionState::Failed);
                Err(err)
            }
        }
    }

    /// Close the session. Safe to call any number of times; only the first
    /// call performs the transition.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Closed {
            return;
        }
        *state = SessionState::Closed;
        info!("session closed");
    }
}

/// Blocking counterpart built on [`BlockingTransport`], whose `post`
/// carries its own bounded retry.
pub struct BlockingSession {
    transport: BlockingTransport,
    state: Mutex<SessionState>,
    schema: Mutex<Option<SchemaIndex>>,
}

impl BlockingSession {
    pub fn open(config: &ClientConfig) -> ClientResult<Self> {
        let transport = BlockingTransport::new(config)?;
        info!("blocking session transport ready");
        Ok(Self {
            transport,
            state: Mutex::new(SessionState::TransportReady),
            schema: Mutex::new(None),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.state() == SessionState::Closed {
            return Err(ClientError::SessionClosed);
        }
        Ok(())
    }

    pub fn introspect(&self) -> ClientResult<()> {
        self.ensure_open()?;
        if self
            .schema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
        {
            return Ok(());
        }
        let index = self
            .transport
            .post(INTROSPECTION_QUERY)
            .and_then(|envelope| envelope.into_data())
            .and_then(|data| SchemaIndex::from_introspection(&data));
        let index = match index {
            Ok(index) => index,
            Err(err) => {
                self.set_state(SessionState::Failed);
                return Err(err);
            }
        };
        *self.schema.lock().unwrap_or_else(|e| e.into_inner()) = Some(index);
        self.set_state(SessionState::SchemaIntrospected);
        Ok(())
    }

    pub fn schema(&self) -> ClientResult<SchemaIndex> {
        self.schema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ClientError::SchemaMissing)
    }

    pub fn execute(&self, document: &QueryDocument) -> ClientResult<Value> {
        self.ensure_open()?;
        if self
            .schema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
        {
            return Err(ClientError::SchemaMissing);
        }
        let query = document.render();
        debug!(%query, "executing query");
        match self.transport.post(&query) {
            Ok(envelope) => {
                let data = envelope.into_data()?;
                self.set_state(SessionState::QueryExecuted);
                Ok(data)
            }
            Err(err) => {
                self.set_state(SessionState::Failed);
                Err(err)
            }
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Closed {
            return;
        }
        *state = SessionState::Closed;
        info!("session closed");
    }
}
