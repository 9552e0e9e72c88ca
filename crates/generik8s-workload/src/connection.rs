//! PostgreSQL connection state tracking
//!
//! The database publishes its connection details asynchronously. A peer may
//! exist long before it has published a usable master endpoint, and a
//! published record may be incomplete. Only a complete record counts as a
//! connection state; anything less is treated as unavailable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stand-in for credentials in logged output
pub const REDACTED: &str = "<redacted>";

/// Connection parameters of the database master endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Database name
    pub database: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
    /// Full connection URI (includes credentials)
    pub uri: String,
}

impl ConnectionState {
    /// Build a state from a published record.
    ///
    /// Returns `None` unless every field is present, non-empty, and the port
    /// is a valid TCP port.
    pub fn from_record(record: &MasterRecord) -> Option<Self> {
        let field = |v: &Option<String>| v.as_ref().filter(|s| !s.is_empty()).cloned();
        let port = field(&record.port)?.parse::<u16>().ok().filter(|p| *p > 0)?;
        Some(Self {
            host: field(&record.host)?,
            port,
            database: field(&record.dbname)?,
            user: field(&record.user)?,
            password: field(&record.password)?,
            uri: field(&record.uri)?,
        })
    }

    /// Copy safe to render into logs: the password is masked and the URI
    /// is replaced by its credential-free form
    pub fn redacted(&self) -> Self {
        Self {
            password: REDACTED.to_string(),
            uri: self.to_string(),
            ..self.clone()
        }
    }
}

// Credentials never reach logs through Debug or Display.
impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("uri", &REDACTED)
            .finish()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Master endpoint record as published by the database, fields possibly missing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRecord {
    /// Host name or address
    pub host: Option<String>,
    /// Database name
    pub dbname: Option<String>,
    /// TCP port, as text
    pub port: Option<String>,
    /// User name
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Full connection URI
    pub uri: Option<String>,
}

impl MasterRecord {
    /// Build a record from string data keyed by field name
    pub fn from_data(data: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| data.get(key).cloned();
        Self {
            host: get("host"),
            dbname: get("dbname"),
            port: get("port"),
            user: get("user"),
            password: get("password"),
            uri: get("uri"),
        }
    }
}

/// Connection lifecycle notifications from the database dependency
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationEvent {
    /// A peer exists; no connection data is guaranteed yet
    Connected,
    /// The peer published (or republished) its master endpoint
    MasterAvailable(MasterRecord),
    /// The peer went away
    Departed,
}

/// Current view of the database connection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTracker {
    connected: bool,
    master: Option<ConnectionState>,
}

impl ConnectionTracker {
    /// Create a tracker with no connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into the tracker.
    ///
    /// Returns true when the connection state value changed, which means any
    /// spec resolved from the previous value is stale.
    pub fn apply(&mut self, event: &RelationEvent) -> bool {
        let previous = self.master.clone();
        match event {
            RelationEvent::Connected => {
                self.connected = true;
            }
            RelationEvent::MasterAvailable(record) => {
                self.connected = true;
                self.master = ConnectionState::from_record(record);
                if self.master.is_none() {
                    warn!("database published an incomplete master record, treating as unavailable");
                }
            }
            RelationEvent::Departed => {
                self.connected = false;
                self.master = None;
            }
        }
        let changed = previous != self.master;
        if changed {
            debug!(
                available = self.master.is_some(),
                "database connection state changed"
            );
        }
        changed
    }

    /// True while a database peer exists
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// True when a complete master endpoint is known
    pub fn is_available(&self) -> bool {
        self.master.is_some()
    }

    /// Snapshot of the current connection state
    pub fn current(&self) -> Option<&ConnectionState> {
        self.master.as_ref()
    }
}
