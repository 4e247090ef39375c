use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a client connection.
///
/// `Login -> Configuration <-> Play`; versions without a configuration phase
/// go from Login straight to Play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Login,
    Configuration,
    Play,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Login => "login",
            ConnectionState::Configuration => "configuration",
            ConnectionState::Play => "play",
        };
        f.write_str(name)
    }
}
