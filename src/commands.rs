use std::fmt;

/// Administrative commands understood by the server. `Display` renders the
/// exact text sent in an exec packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ChangeMap(String),
    SetNextMap(String),
    EndMatch,
    RestartMatch,
    Kick { steam_id: String, reason: String },
    Ban { steam_id: String, reason: String },
    Broadcast(String),
    ForceTeamChange { steam_id: String },
    ListPlayers,
    /// Anything typed by hand.
    Raw(String),
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminCommand::ChangeMap(map) => write!(f, "AdminChangeMap {}", map),
            AdminCommand::SetNextMap(map) => write!(f, "AdminSetNextMap {}", map),
            AdminCommand::EndMatch => f.write_str("AdminEndMatch"),
            AdminCommand::RestartMatch => f.write_str("AdminRestartMatch"),
            AdminCommand::Kick { steam_id, reason } => write!(f, "AdminKick {} {}", steam_id, reason),
            AdminCommand::Ban { steam_id, reason } => write!(f, "AdminBan {} {}", steam_id, reason),
            AdminCommand::Broadcast(text) => write!(f, "AdminBroadcast {}", text),
            AdminCommand::ForceTeamChange { steam_id } => {
                write!(f, "AdminForceTeamChange {}", steam_id)
            }
            AdminCommand::ListPlayers => f.write_str("ListPlayers"),
            AdminCommand::Raw(text) => f.write_str(text.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_command_text() {
        let steam_id = "76561198000000001".to_string();
        let cases = [
            (AdminCommand::ChangeMap("Narva_AAS_v1".into()), "AdminChangeMap Narva_AAS_v1"),
            (AdminCommand::SetNextMap("Gorodok_RAAS_v2".into()), "AdminSetNextMap Gorodok_RAAS_v2"),
            (AdminCommand::EndMatch, "AdminEndMatch"),
            (AdminCommand::RestartMatch, "AdminRestartMatch"),
            (
                AdminCommand::Kick {
                    steam_id: steam_id.clone(),
                    reason: "Teamkilling".into(),
                },
                "AdminKick 76561198000000001 Teamkilling",
            ),
            (
                AdminCommand::Ban {
                    steam_id: steam_id.clone(),
                    reason: "Cheating, appeal on discord".into(),
                },
                "AdminBan 76561198000000001 Cheating, appeal on discord",
            ),
            (
                AdminCommand::Broadcast("Server restart in 5 minutes".into()),
                "AdminBroadcast Server restart in 5 minutes",
            ),
            (
                AdminCommand::ForceTeamChange { steam_id },
                "AdminForceTeamChange 76561198000000001",
            ),
            (AdminCommand::ListPlayers, "ListPlayers"),
            (AdminCommand::Raw("  ShowNextMap \n".into()), "ShowNextMap"),
        ];

        for (command, text) in cases {
            assert_eq!(command.to_string(), text);
        }
    }
}
