//! # Browse Sessions
//!
//! A [`BrowseSession`] serves browse requests arriving as lines of text and
//! answers each with one JSON [`BrowseResponse`] line. It stands in for the
//! media-session transport that normally carries requests to the catalog.
//!
//! The session reports its connection lifecycle as a stream of
//! [`ConnectionState`]s. Subscribers iterate [`ConnectionEvents`], which ends
//! after the first terminal state (`Disconnected` or `Failed`).
//!
//! ## Protocol
//!
//! ```text
//! > ALBUMS
//! < {"items":[{"id":"ALBUMS/2","title":"Reise, Reise",...}]}
//! > item MUSIC|1
//! < {"items":[{"id":"MUSIC|1","title":"Amerika",...}]}
//! > ALBUMS|1
//! < {"error":{"kind":"decode","message":"..."}}
//! ```

use crate::browse::BrowseResponse;
use crate::repository::CatalogRepository;
use anyhow::{Context, Result};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Lifecycle of a browsing client's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "reason")]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Connected, but not being served for now.
    Suspended,
    Disconnected,
    Failed(String),
}

impl ConnectionState {
    /// No state follows a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Suspended => f.write_str("suspended"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection already ended ({0})")]
pub struct ConnectionClosed(pub ConnectionState);

#[derive(Debug, Default)]
struct MonitorState {
    current: Option<ConnectionState>,
    subscribers: Vec<Sender<ConnectionState>>,
}

/// Publishes connection states to any number of subscribers.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    state: Mutex<MonitorState>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<ConnectionState> {
        self.lock().current.clone()
    }

    /// Stream of states from now on, starting with the current one if any.
    pub fn subscribe(&self) -> ConnectionEvents {
        let (sender, receiver) = mpsc::channel();
        let mut state = self.lock();
        let terminal = match &state.current {
            Some(current) => {
                // The receiver is alive, so this cannot fail.
                let _ = sender.send(current.clone());
                current.is_terminal()
            }
            None => false,
        };
        if !terminal {
            state.subscribers.push(sender);
        }
        ConnectionEvents {
            receiver,
            finished: false,
        }
    }

    /// Publishes `next`. Rejected once a terminal state has been published.
    pub fn publish(&self, next: ConnectionState) -> Result<(), ConnectionClosed> {
        let mut state = self.lock();
        if let Some(current) = state.current.as_ref().filter(|s| s.is_terminal()) {
            return Err(ConnectionClosed(current.clone()));
        }

        trace!("Connection state -> {next}");
        state
            .subscribers
            .retain(|subscriber| subscriber.send(next.clone()).is_ok());
        if next.is_terminal() {
            state.subscribers.clear();
        }
        state.current = Some(next);
        Ok(())
    }
}

/// Blocking iterator over published [`ConnectionState`]s.
#[derive(Debug)]
pub struct ConnectionEvents {
    receiver: Receiver<ConnectionState>,
    finished: bool,
}

impl Iterator for ConnectionEvents {
    type Item = ConnectionState;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.receiver.recv() {
            Ok(state) => {
                self.finished = state.is_terminal();
                Some(state)
            }
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}

/// Line-oriented browse server over any reader and writer.
pub struct BrowseSession {
    repository: Arc<CatalogRepository>,
    monitor: ConnectionMonitor,
}

impl BrowseSession {
    pub fn new(repository: Arc<CatalogRepository>) -> Self {
        Self {
            repository,
            monitor: ConnectionMonitor::new(),
        }
    }

    pub fn events(&self) -> ConnectionEvents {
        self.monitor.subscribe()
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    /// Answers one request line.
    pub fn respond(&self, line: &str) -> BrowseResponse {
        let result = match line.strip_prefix("item ") {
            Some(id) => self.repository.get_item(id.trim()).map(|item| vec![item]),
            None => self.repository.get_children(line),
        };
        BrowseResponse::from(result)
    }

    /// Serves requests from `input` until it ends. Returns how many requests
    /// were answered.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<usize> {
        self.announce(ConnectionState::Connecting);
        self.announce(ConnectionState::Connected);

        let mut served = 0;
        for line in input.lines() {
            let line = match line.context("Failed to read browse request") {
                Ok(line) => line,
                Err(err) => return Err(self.fail(err)),
            };
            let request = line.trim();
            if request.is_empty() {
                continue;
            }

            debug!("Browse request `{request}`");
            let response = self.respond(request);
            if let Err(err) = write_response(&mut output, &response) {
                return Err(self.fail(err));
            }
            served += 1;
        }

        self.announce(ConnectionState::Disconnected);
        Ok(served)
    }

    fn announce(&self, state: ConnectionState) {
        if let Err(err) = self.monitor.publish(state) {
            warn!("Dropping connection event: {err}");
        }
    }

    fn fail(&self, err: anyhow::Error) -> anyhow::Error {
        self.announce(ConnectionState::Failed(format!("{err:#}")));
        err
    }
}

fn write_response<W: Write>(output: &mut W, response: &BrowseResponse) -> Result<()> {
    serde_json::to_writer(&mut *output, response).context("Failed to encode browse response")?;
    writeln!(output).context("Failed to write browse response")?;
    output.flush().context("Failed to flush browse response")?;
    Ok(())
}
