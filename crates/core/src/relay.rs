// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay state machine data (spec.md §3 "Relay state", §4.5).

use serde::{Deserialize, Serialize};

/// Connection status of the Cloud Relay Client.
///
/// Only `Registered` authorizes sending any non-control frame (spec.md
/// §4.5 "send-while-not-registered rule").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Disconnected,
    Connecting,
    Connected,
    Registered,
}

impl RelayStatus {
    pub fn can_send(self) -> bool {
        matches!(self, RelayStatus::Registered)
    }
}

/// `{status, connection_id, machine_id, last_heartbeat, reconnect_attempts, error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayState {
    pub status: RelayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    pub machine_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub reconnect_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayState {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            status: RelayStatus::Disconnected,
            connection_id: None,
            machine_id: machine_id.into(),
            last_heartbeat: None,
            reconnect_attempts: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_registered_can_send() {
        assert!(!RelayStatus::Disconnected.can_send());
        assert!(!RelayStatus::Connecting.can_send());
        assert!(!RelayStatus::Connected.can_send());
        assert!(RelayStatus::Registered.can_send());
    }
}
