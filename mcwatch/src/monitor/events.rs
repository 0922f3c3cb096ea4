//! Events produced by one monitor cycle.

use onebot_client::PlayerChange;

use crate::domain::ServerId;

/// Which binding toggle gates an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ServerStatus,
    PlayerChanges,
}

/// Transitions detected for a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The server stopped answering after being online.
    ServerOffline {
        server_id: ServerId,
        server_name: String,
    },
    /// The server answers again after being offline.
    ServerOnline {
        server_id: ServerId,
        server_name: String,
    },
    /// Players joined or left, including a mass leave when the count drops to zero.
    PlayersChanged {
        server_id: ServerId,
        change: PlayerChange,
    },
    /// The count just dropped to zero.
    NoPlayersOnline {
        server_id: ServerId,
        server_name: String,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ServerOffline { .. } | Self::ServerOnline { .. } => EventKind::ServerStatus,
            Self::PlayersChanged { .. } | Self::NoPlayersOnline { .. } => EventKind::PlayerChanges,
        }
    }

    /// Plain text notice for the event. Player changes render through [`PlayerChange::render`].
    pub fn description(&self) -> Option<String> {
        match self {
            Self::ServerOffline { server_name, .. } => {
                Some(format!("[{server_name}] Server is offline"))
            }
            Self::ServerOnline { server_name, .. } => {
                Some(format!("[{server_name}] Server is back online"))
            }
            Self::NoPlayersOnline { server_name, .. } => {
                Some(format!("[{server_name}] Nobody is online right now"))
            }
            Self::PlayersChanged { change, .. } => change.render(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions() {
        let offline = MonitorEvent::ServerOffline {
            server_id: 1,
            server_name: "S".into(),
        };
        assert_eq!(offline.kind(), EventKind::ServerStatus);
        assert_eq!(offline.description().as_deref(), Some("[S] Server is offline"));

        let empty = MonitorEvent::NoPlayersOnline {
            server_id: 1,
            server_name: "S".into(),
        };
        assert_eq!(empty.kind(), EventKind::PlayerChanges);
        assert_eq!(
            empty.description().as_deref(),
            Some("[S] Nobody is online right now")
        );
    }
}
