//! Transport-independent connection state machine.
//!
//! Every opened transport is tagged with an epoch. Events carrying an older
//! epoch come from a transport that was superseded or torn down and are
//! ignored, which keeps exactly one reconnect per close.

use serde::{Deserialize, Serialize};

/// Message shown to the user whenever the transport reports an error.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error. Retrying...";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting)
    }
}

#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    error: Option<String>,
    epoch: u64,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start opening a transport unless one is already opening or open.
    /// Returns the epoch the new transport must report with.
    pub fn begin_connect(&mut self) -> Option<u64> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return None;
        }
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        Some(self.epoch)
    }

    pub fn opened(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.error = None;
        true
    }

    /// Transport error. Never schedules a reconnect by itself; the close
    /// that follows does.
    pub fn failed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.state = ConnectionState::Error;
        self.error = Some(CONNECTION_ERROR_MESSAGE.to_string());
        true
    }

    /// Transport closed. Returns `true` exactly once per transport, meaning a
    /// reconnect has to be scheduled.
    pub fn closed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.epoch += 1;
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Forget the current transport entirely.
    pub fn disconnect(&mut self) {
        self.epoch += 1;
        self.state = ConnectionState::Disconnected;
    }

    pub const fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = ConnectionMachine::new();
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_happy_path() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert!(machine.opened(epoch));
        assert!(machine.state().is_connected());
    }

    #[test]
    fn test_connect_is_noop_while_connecting_or_connected() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        assert!(machine.begin_connect().is_none());
        machine.opened(epoch);
        assert!(machine.begin_connect().is_none());
        assert_eq!(machine.epoch(), epoch);
    }

    #[test]
    fn test_error_then_close() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        machine.opened(epoch);

        assert!(machine.failed(epoch));
        assert_eq!(machine.state(), ConnectionState::Error);
        assert_eq!(machine.error(), Some(CONNECTION_ERROR_MESSAGE));

        assert!(machine.closed(epoch));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_open_clears_error() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        machine.failed(epoch);
        machine.closed(epoch);

        let epoch = machine.begin_connect().unwrap();
        machine.opened(epoch);
        assert!(machine.error().is_none());
    }

    #[test]
    fn test_close_reports_once() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        machine.opened(epoch);
        assert!(machine.closed(epoch));
        assert!(!machine.closed(epoch));
    }

    #[test]
    fn test_disconnect_invalidates_transport() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        machine.opened(epoch);
        machine.disconnect();

        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(!machine.is_current(epoch));
        assert!(!machine.failed(epoch));
        assert!(!machine.closed(epoch));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stale_open_is_ignored() {
        let mut machine = ConnectionMachine::new();
        let epoch = machine.begin_connect().unwrap();
        machine.disconnect();
        assert!(!machine.opened(epoch));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_from_error_state() {
        let mut machine = ConnectionMachine::new();
        let first = machine.begin_connect().unwrap();
        machine.failed(first);

        let second = machine.begin_connect().unwrap();
        assert_ne!(first, second);
        // Late close of the failed transport does not disturb the new one
        assert!(!machine.closed(first));
        assert_eq!(machine.state(), ConnectionState::Connecting);
    }
}
