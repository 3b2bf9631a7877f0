//! Expansion of an assembled payload into fields, players and objectives

use super::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const OBJECTIVE_PREFIX: &str = "obj_";

/// Wire format variant of a query response, ordered by richness
///
/// A response in a higher ranked dialect carries a superset of the fields of a
/// lower ranked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Vanilla,
    AdminMod,
    Gs1,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Vanilla => write!(f, "vanilla"),
            Dialect::AdminMod => write!(f, "adminmod"),
            Dialect::Gs1 => write!(f, "gs1"),
        }
    }
}

pub type Record = BTreeMap<String, String>;

/// A complete, decoded query response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub fields: Record,
    /// Players ordered by their numeric id
    pub players: Vec<Record>,
    pub objectives: Vec<Record>,
    pub dialect: Dialect,
}

impl QueryResponse {
    /// Expands a backslash delimited `\key\value` payload.
    ///
    /// `obj_<name>` keys become objectives, `<field>_<id>` keys become fields of
    /// player `id` and everything else is a top level field.
    pub fn parse(payload: &[u8], dialect: Dialect) -> Result<Self, QueryError> {
        let mut fields = Record::new();
        let mut players: BTreeMap<usize, Record> = BTreeMap::new();
        let mut objectives = Vec::new();

        let payload = payload.strip_prefix(b"\\").unwrap_or(payload);
        let mut tokens = payload.split(|b| *b == b'\\');

        while let Some(key) = tokens.next() {
            let value = tokens.next().unwrap_or_default();
            if key.is_empty() {
                continue;
            }
            let key = String::from_utf8_lossy(key);

            if let Some(name) = key.strip_prefix(OBJECTIVE_PREFIX) {
                if name.is_empty() {
                    continue;
                }
                let mut objective = Record::new();
                objective.insert("name".to_string(), name.to_string());
                objective.insert(
                    "status".to_string(),
                    String::from_utf8_lossy(value).into_owned(),
                );
                objectives.push(objective);
            } else if let Some((field, id)) = key.rsplit_once('_') {
                let id = id.parse::<usize>().map_err(|_| {
                    QueryError::Malformed(format!("invalid player field '{}'", key))
                })?;
                players
                    .entry(id)
                    .or_default()
                    .insert(field.to_string(), decode_latin1(value));
            } else {
                fields.insert(
                    key.into_owned(),
                    String::from_utf8_lossy(value).into_owned(),
                );
            }
        }

        Ok(Self {
            fields,
            players: players.into_values().collect(),
            objectives,
            dialect,
        })
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Player names are sent in the game's single byte codepage.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_top_level_fields() {
        let response =
            QueryResponse::parse(b"\\hostname\\Swat 4 Server\\numplayers\\2", Dialect::Gs1)
                .unwrap();

        assert_eq!(response.field("hostname"), Some("Swat 4 Server"));
        assert_eq!(response.field("numplayers"), Some("2"));
        assert!(response.players.is_empty());
        assert!(response.objectives.is_empty());
    }

    #[test]
    fn test_players_grouped_and_sorted_by_id() {
        let response = QueryResponse::parse(
            b"\\player_7\\Seven\\score_7\\10\\player_2\\Two\\score_2\\-3",
            Dialect::Gs1,
        )
        .unwrap();

        assert_eq!(response.players.len(), 2);
        assert_eq!(response.players[0]["player"], "Two");
        assert_eq!(response.players[0]["score"], "-3");
        assert_eq!(response.players[1]["player"], "Seven");
        assert_eq!(response.players[1]["score"], "10");
    }

    #[test]
    fn test_player_values_are_latin1() {
        let response =
            QueryResponse::parse(b"\\player_0\\J\xf6rg\\hostname\\x", Dialect::Vanilla).unwrap();
        assert_eq!(response.players[0]["player"], "Jörg");
    }

    #[test]
    fn test_objectives() {
        let response = QueryResponse::parse(
            b"\\obj_Rescue_All_Hostages\\1\\obj_\\0\\obj_Arrest_Suspect\\0",
            Dialect::AdminMod,
        )
        .unwrap();

        assert_eq!(response.objectives.len(), 2);
        assert_eq!(response.objectives[0]["name"], "Rescue_All_Hostages");
        assert_eq!(response.objectives[0]["status"], "1");
        assert_eq!(response.objectives[1]["name"], "Arrest_Suspect");
        assert!(response.players.is_empty());
    }

    #[test]
    fn test_non_numeric_player_suffix_is_malformed() {
        let result = QueryResponse::parse(b"\\hostname\\x\\score_abc\\1", Dialect::Gs1);
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }

    #[test]
    fn test_dangling_key_has_empty_value() {
        let response = QueryResponse::parse(b"\\hostname\\x\\password", Dialect::Gs1).unwrap();
        assert_eq!(response.field("password"), Some(""));
    }

    #[test]
    fn test_dialect_rank() {
        assert!(Dialect::Gs1 > Dialect::AdminMod);
        assert!(Dialect::AdminMod > Dialect::Vanilla);
    }
}
