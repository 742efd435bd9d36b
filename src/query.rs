//! Seam to the separate server-info query protocol. Implementations live
//! outside this crate; the client only hands them the host and query port.
use std::{fmt, future::Future, net::IpAddr};

use crate::error::BoxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub map: String,
    pub current_players: u32,
    pub max_players: u32,
}

impl ServerInfo {
    pub fn player_count(&self) -> PlayerCount {
        PlayerCount {
            current: self.current_players,
            max: self.max_players,
        }
    }
}

/// Displays as `current/max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerCount {
    pub current: u32,
    pub max: u32,
}

impl fmt::Display for PlayerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.max)
    }
}

pub trait ServerQuery {
    fn query(
        &self,
        host: IpAddr,
        query_port: u16,
    ) -> impl Future<Output = Result<ServerInfo, BoxError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_count_reads_like_a_scoreboard() {
        let info = ServerInfo {
            name: "Squad Server".into(),
            map: "Narva_AAS_v1".into(),
            current_players: 72,
            max_players: 100,
        };
        assert_eq!(info.player_count().to_string(), "72/100");
    }
}
