//! Structured server details built from a query response
//!
//! Response fields are mapped through a static table of field setters; unknown
//! fields are ignored and every field is optional until `validate` is called.

use crate::gs1::{QueryResponse, Record};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailsError {
    #[error("field '{field}' has invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("required field '{0}' is missing")]
    Missing(&'static str),
    #[error("{numplayers} players exceed the limit of {maxplayers}")]
    TooManyPlayers { numplayers: u32, maxplayers: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub hostname: String,
    pub hostport: u16,
    pub gamevariant: String,
    pub gamever: String,
    pub gametype: String,
    pub mapname: String,
    pub numplayers: u32,
    pub maxplayers: u32,
    pub password: bool,
    pub statsenabled: bool,
    pub round: u32,
    pub numrounds: u32,
    pub timeleft: u32,
    pub swatscore: i32,
    pub suspectsscore: i32,
    pub players: Vec<Record>,
    pub objectives: Vec<Record>,
}

type Setter = fn(&mut ServerDetails, &str) -> Result<(), DetailsError>;

const FIELDS: &[(&str, Setter)] = &[
    ("hostname", |d, v| set_text(&mut d.hostname, v)),
    ("hostport", |d, v| set_number(&mut d.hostport, "hostport", v)),
    ("gamevariant", |d, v| set_text(&mut d.gamevariant, v)),
    ("gamever", |d, v| set_text(&mut d.gamever, v)),
    ("gametype", |d, v| set_text(&mut d.gametype, v)),
    ("mapname", |d, v| set_text(&mut d.mapname, v)),
    ("numplayers", |d, v| set_number(&mut d.numplayers, "numplayers", v)),
    ("maxplayers", |d, v| set_number(&mut d.maxplayers, "maxplayers", v)),
    ("password", |d, v| set_flag(&mut d.password, "password", v)),
    ("statsenabled", |d, v| set_flag(&mut d.statsenabled, "statsenabled", v)),
    ("round", |d, v| set_number(&mut d.round, "round", v)),
    ("numrounds", |d, v| set_number(&mut d.numrounds, "numrounds", v)),
    ("timeleft", |d, v| set_number(&mut d.timeleft, "timeleft", v)),
    ("swatscore", |d, v| set_number(&mut d.swatscore, "swatscore", v)),
    ("suspectsscore", |d, v| set_number(&mut d.suspectsscore, "suspectsscore", v)),
];

fn set_text(target: &mut String, value: &str) -> Result<(), DetailsError> {
    *target = value.to_string();
    Ok(())
}

fn set_number<T: std::str::FromStr>(
    target: &mut T,
    field: &'static str,
    value: &str,
) -> Result<(), DetailsError> {
    // Empty means "not reported"
    if value.is_empty() {
        return Ok(());
    }
    *target = value.parse().map_err(|_| DetailsError::InvalidValue {
        field,
        value: value.to_string(),
    })?;
    Ok(())
}

fn set_flag(target: &mut bool, field: &'static str, value: &str) -> Result<(), DetailsError> {
    *target = match value {
        "" | "0" | "false" => false,
        "1" | "true" => true,
        _ => {
            return Err(DetailsError::InvalidValue {
                field,
                value: value.to_string(),
            })
        }
    };
    Ok(())
}

impl ServerDetails {
    pub fn from_response(response: &QueryResponse) -> Result<Self, DetailsError> {
        let mut details = ServerDetails::default();
        for (name, setter) in FIELDS {
            if let Some(value) = response.field(name) {
                setter(&mut details, value)?;
            }
        }
        details.players = response.players.clone();
        details.objectives = response.objectives.clone();
        Ok(details)
    }

    /// Checks that the details describe a listable server.
    pub fn validate(&self) -> Result<(), DetailsError> {
        let required = [
            ("hostname", &self.hostname),
            ("gamevariant", &self.gamevariant),
            ("gamever", &self.gamever),
            ("gametype", &self.gametype),
            ("mapname", &self.mapname),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(DetailsError::Missing(field));
            }
        }
        if self.hostport == 0 {
            return Err(DetailsError::Missing("hostport"));
        }
        if self.maxplayers == 0 {
            return Err(DetailsError::Missing("maxplayers"));
        }
        if self.numplayers > self.maxplayers {
            return Err(DetailsError::TooManyPlayers {
                numplayers: self.numplayers,
                maxplayers: self.maxplayers,
            });
        }
        Ok(())
    }

    /// Parses and validates in one go.
    pub fn from_valid_response(response: &QueryResponse) -> Result<Self, DetailsError> {
        let details = Self::from_response(response)?;
        details.validate()?;
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gs1::Dialect;

    fn response(payload: &[u8]) -> QueryResponse {
        QueryResponse::parse(payload, Dialect::Gs1).unwrap()
    }

    const VALID: &[u8] = b"\\hostname\\Swat4 Server\\hostport\\10480\\password\\0\
\\gamevariant\\SWAT 4\\gamever\\1.1\\gametype\\VIP Escort\\mapname\\A-Bomb Nightclub\
\\numplayers\\1\\maxplayers\\16\\round\\2\\numrounds\\5\\swatscore\\-10\\player_0\\Bob";

    #[test]
    fn test_from_response() {
        let details = ServerDetails::from_valid_response(&response(VALID)).unwrap();

        assert_eq!(details.hostname, "Swat4 Server");
        assert_eq!(details.hostport, 10480);
        assert_eq!(details.gametype, "VIP Escort");
        assert_eq!(details.numplayers, 1);
        assert_eq!(details.maxplayers, 16);
        assert_eq!(details.round, 2);
        assert_eq!(details.swatscore, -10);
        assert!(!details.password);
        assert_eq!(details.players.len(), 1);
        assert_eq!(details.players[0]["player"], "Bob");
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let mut payload = VALID.to_vec();
        payload.extend_from_slice(b"\\tocreports\\3/5\\weirdfield\\x");
        assert!(ServerDetails::from_valid_response(&response(&payload)).is_ok());
    }

    #[test]
    fn test_invalid_number() {
        let result = ServerDetails::from_response(&response(b"\\numplayers\\lots"));
        assert_eq!(
            result,
            Err(DetailsError::InvalidValue {
                field: "numplayers",
                value: "lots".to_string()
            })
        );
    }

    #[test]
    fn test_validate_missing_fields() {
        let details =
            ServerDetails::from_response(&response(b"\\hostname\\x\\numplayers\\1")).unwrap();
        assert_eq!(details.validate(), Err(DetailsError::Missing("gamevariant")));
    }

    #[test]
    fn test_validate_player_limit() {
        let mut details = ServerDetails::from_valid_response(&response(VALID)).unwrap();
        details.numplayers = 17;
        assert!(matches!(
            details.validate(),
            Err(DetailsError::TooManyPlayers { .. })
        ));
    }
}
