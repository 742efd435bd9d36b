//! Parsing of the `ListPlayers` response.
//!
//! ```text
//! ----- Active Players -----
//! ID: 0 | SteamID: 76561198000000001 | Name: Alice
//! ----- Recently Disconnected Players [Max of 15] -----
//! ID: 1 | SteamID: 76561198000000002 | Since: 00:05:12 | Name: Bob
//! ```
use log::{debug, warn};
use thiserror::Error;

pub const ACTIVE_HEADER: &str = "----- Active Players -----";
pub const DISCONNECTED_HEADER: &str = "----- Recently Disconnected Players [Max of 15] -----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub slot: u32,
    pub name: String,
    /// 64-bit steam id, kept as the decimal text the server sent.
    pub steam_id: String,
    pub status: PlayerStatus,
    /// How long ago the player left, as printed by the server.
    pub disconnected_for: Option<String>,
}

/// A player line that could not be read. Never fatal: the line is skipped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedLine {
    #[error("expected {expected} fields, found {found}")]
    MissingFields { expected: usize, found: usize },
    #[error("field {0} has no `key: value` form")]
    UnlabelledField(usize),
    #[error("slot {0:?} is not a number")]
    BadSlot(String),
    #[error("steam id {0:?} is not a 64-bit number")]
    BadSteamId(String),
    #[error("player name is empty")]
    EmptyName,
}

/// Turn the raw `ListPlayers` response into player records, in the order
/// the server listed them. Lines outside of a known section and malformed
/// lines are skipped.
pub fn parse_players(text: &str) -> Vec<PlayerRecord> {
    let mut section = None;
    let mut players = Vec::new();

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match line {
            ACTIVE_HEADER => section = Some(PlayerStatus::Connected),
            DISCONNECTED_HEADER => section = Some(PlayerStatus::Disconnected),
            _ => match section {
                Some(status) => match parse_line(line, status) {
                    Ok(player) => players.push(player),
                    Err(err) => warn!("skipping player line {:?}: {}", line, err),
                },
                None => debug!("ignoring line outside of a player section: {:?}", line),
            },
        }
    }

    players
}

/// Parse a single data line of the given section.
///
/// Fields are separated by `|` and labelled `Key: value`. Values are cut at
/// the first `:` only, so durations like `00:05:12` survive. The name is
/// always the last field and takes the rest of the line verbatim.
pub fn parse_line(line: &str, status: PlayerStatus) -> Result<PlayerRecord, MalformedLine> {
    let expected = match status {
        PlayerStatus::Connected => 3,
        PlayerStatus::Disconnected => 4,
    };

    let fields: Vec<&str> = line.splitn(expected, '|').collect();
    if fields.len() < expected {
        return Err(MalformedLine::MissingFields {
            expected,
            found: fields.len(),
        });
    }

    let value = |index: usize| {
        fields[index]
            .split_once(':')
            .map(|(_, value)| value.trim())
            .ok_or(MalformedLine::UnlabelledField(index))
    };

    let slot = value(0)?;
    let slot = slot
        .parse::<u32>()
        .map_err(|_| MalformedLine::BadSlot(slot.to_string()))?;

    let steam_id = value(1)?;
    if steam_id.parse::<u64>().is_err() {
        return Err(MalformedLine::BadSteamId(steam_id.to_string()));
    }

    let disconnected_for = match status {
        PlayerStatus::Connected => None,
        PlayerStatus::Disconnected => Some(value(2)?.to_string()),
    };

    let name = value(expected - 1)?;
    if name.is_empty() {
        return Err(MalformedLine::EmptyName);
    }

    Ok(PlayerRecord {
        slot,
        name: name.to_string(),
        steam_id: steam_id.to_string(),
        status,
        disconnected_for,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sections_in_order() {
        let text = "----- Active Players -----\n\
                    ID: 0 | SteamID: 76561198000000001 | Name: Alice\n\
                    ----- Recently Disconnected Players [Max of 15] -----\n\
                    ID: 1 | SteamID: 76561198000000002 | Since: 00:05:12 | Name: Bob\n";

        let players = parse_players(text);

        assert_eq!(
            players,
            vec![
                PlayerRecord {
                    slot: 0,
                    name: "Alice".to_string(),
                    steam_id: "76561198000000001".to_string(),
                    status: PlayerStatus::Connected,
                    disconnected_for: None,
                },
                PlayerRecord {
                    slot: 1,
                    name: "Bob".to_string(),
                    steam_id: "76561198000000002".to_string(),
                    status: PlayerStatus::Disconnected,
                    disconnected_for: Some("00:05:12".to_string()),
                },
            ]
        );
    }

    #[test]
    fn short_lines_are_skipped() {
        let text = "----- Active Players -----\r\n\
                    ID: 0 | SteamID: 76561198000000001 | Name: Alice\r\n\
                    ID: 1 | SteamID: 76561198000000003\r\n\
                    ID: 2 | SteamID: 76561198000000004 | Name: Carol\r\n\
                    ----- Recently Disconnected Players [Max of 15] -----\r\n\
                    ID: 3 | SteamID: 76561198000000005 | Name: Dave\r\n";

        let names: Vec<_> = parse_players(text).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Alice", "Carol"]);
    }

    #[test]
    fn names_keep_delimiters() {
        let player = parse_line(
            "ID: 7 | SteamID: 76561198000000007 | Name: [TAG] a|b: c",
            PlayerStatus::Connected,
        )
        .unwrap();
        assert_eq!(player.name, "[TAG] a|b: c");
        assert_eq!(player.slot, 7);
    }

    #[test]
    fn reports_why_a_line_is_malformed() {
        assert_eq!(
            parse_line("ID: 1 | SteamID: 7", PlayerStatus::Connected),
            Err(MalformedLine::MissingFields {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            parse_line("ID: x | SteamID: 7 | Name: A", PlayerStatus::Connected),
            Err(MalformedLine::BadSlot("x".to_string()))
        );
        assert_eq!(
            parse_line("ID: 1 | SteamID: N/A | Name: A", PlayerStatus::Connected),
            Err(MalformedLine::BadSteamId("N/A".to_string()))
        );
        assert_eq!(
            parse_line("ID: 1 | 765 | Name: A", PlayerStatus::Connected),
            Err(MalformedLine::UnlabelledField(1))
        );
        assert_eq!(
            parse_line("ID: 1 | SteamID: 765 | Name:  ", PlayerStatus::Connected),
            Err(MalformedLine::EmptyName)
        );
    }

    #[test]
    fn lines_before_any_header_are_ignored() {
        let text = "ID: 0 | SteamID: 76561198000000001 | Name: Alice\n\n   \n";
        assert!(parse_players(text).is_empty());
    }

    #[test]
    fn headers_must_match_exactly() {
        let text = "----- Active Players -----\n\
                    ----- Active Players ----\n\
                    ID: 0 | SteamID: 76561198000000001 | Name: Alice\n";
        let players = parse_players(text);
        assert_eq!(players.len(), 1);
    }
}
