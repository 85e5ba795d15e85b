//! Run and orchestrator configuration.
//!
//! `SimConfig` is what a caller hands to `run`; it is validated before any
//! state changes. `OrchestratorConfig` holds process-level knobs with
//! documented defaults.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::status::Mode;

/// Conservative upper bound for map identifiers.
pub const MAX_MAP_ID_LEN: usize = 128;

/// Default episode budget for a run.
pub const DEFAULT_MAX_EPISODES: u64 = 99;

fn map_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.\-]*$").expect("map id pattern is a valid regex")
    })
}

/// One participant in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    /// Environment-defined race/faction code.
    pub race: u32,
    /// Agent endpoint. Players without one are environment-controlled.
    #[serde(default)]
    pub uri: Option<String>,
    /// Bearer token sent to the agent.
    #[serde(default)]
    pub token: Option<String>,
}

impl PlayerConfig {
    /// A player driven by the agent at `uri`.
    #[must_use]
    pub fn agent(race: u32, uri: impl Into<String>) -> Self {
        Self {
            race,
            uri: Some(uri.into()),
            token: None,
        }
    }

    /// A player controlled by the environment itself.
    #[must_use]
    pub const fn builtin(race: u32) -> Self {
        Self {
            race,
            uri: None,
            token: None,
        }
    }

    /// Attaches a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Configuration for a single `run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimConfig {
    /// Map id, looked up in the catalog.
    pub map: String,
    /// Carried on every status of the run.
    pub mode: Mode,
    /// Participants; at least one must have an agent uri.
    pub players: Vec<PlayerConfig>,
}

impl SimConfig {
    /// Unvalidated config; `run` validates it.
    #[must_use]
    pub fn new(map: impl Into<String>, mode: Mode, players: Vec<PlayerConfig>) -> Self {
        Self {
            map: map.into(),
            mode,
            players,
        }
    }

    /// Checks everything that can be checked without the map catalog.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let map = self.map.trim();
        if map.is_empty() {
            return Err(ConfigError::MissingField {
                field: "map".to_string(),
            });
        }
        if map.len() > MAX_MAP_ID_LEN || !map_id_pattern().is_match(map) {
            return Err(ConfigError::InvalidMapId {
                map: self.map.clone(),
            });
        }
        if self.players.is_empty() {
            return Err(ConfigError::MissingField {
                field: "players".to_string(),
            });
        }

        for (index, player) in self.players.iter().enumerate() {
            match (&player.uri, &player.token) {
                (None, Some(_)) => return Err(ConfigError::TokenWithoutUri { index }),
                (Some(uri), _) => validate_agent_uri(index, uri)?,
                (None, None) => {}
            }
        }

        if self.agent_player().is_none() {
            return Err(ConfigError::NoAgent);
        }
        Ok(())
    }

    /// The player whose agent drives the run: the first one with a uri.
    #[must_use]
    pub fn agent_player(&self) -> Option<(usize, &PlayerConfig)> {
        self.players
            .iter()
            .enumerate()
            .find(|(_, p)| p.uri.is_some())
    }
}

fn validate_agent_uri(index: usize, uri: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAgentUri {
        index,
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let parsed = reqwest::Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

/// Process-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Episodes per run before the run is considered `Ended`.
    pub max_episodes: u64,
    /// Timeout for a single agent request.
    #[serde(with = "duration_ms")]
    pub agent_timeout: Duration,
    /// Name given to the runner thread.
    pub runner_thread_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_episodes: DEFAULT_MAX_EPISODES,
            agent_timeout: Duration::from_secs(30),
            runner_thread_name: "simrelay-runner".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by `SIMRELAY_MAX_EPISODES` and
    /// `SIMRELAY_AGENT_TIMEOUT_MS` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("SIMRELAY_MAX_EPISODES") {
            config.max_episodes = parse_setting("SIMRELAY_MAX_EPISODES", &raw)?;
        }
        if let Ok(raw) = std::env::var("SIMRELAY_AGENT_TIMEOUT_MS") {
            config.agent_timeout =
                Duration::from_millis(parse_setting("SIMRELAY_AGENT_TIMEOUT_MS", &raw)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON document; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ConfigError::Load {
            message: format!("{}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| ConfigError::Load {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_episodes == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_episodes".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                field: "agent_timeout".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.runner_thread_name.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "runner_thread_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_setting(field: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
        field: field.to_string(),
        reason: format!("'{raw}' is not a non-negative integer"),
    })
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SimConfig {
        SimConfig::new(
            "Corridor",
            Mode::Training,
            vec![
                PlayerConfig::agent(2, "http://127.0.0.1:4000/graphql").with_token("t"),
                PlayerConfig::builtin(3),
            ],
        )
    }

    #[test]
    fn valid_config_passes() {
        let config = valid();
        config.validate().unwrap();
        assert_eq!(config.agent_player().map(|(i, _)| i), Some(0));
    }

    #[test]
    fn empty_map_is_missing() {
        let mut config = valid();
        config.map = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "map"
        ));
    }

    #[test]
    fn bad_map_characters_rejected() {
        let mut config = valid();
        config.map = "../etc/passwd".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMapId { .. })));
    }

    #[test]
    fn token_without_uri_rejected() {
        let mut config = valid();
        config.players.push(PlayerConfig::builtin(1).with_token("secret"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TokenWithoutUri { index: 2 })
        ));
    }

    #[test]
    fn non_http_uri_rejected() {
        let mut config = valid();
        config.players[0].uri = Some("ftp://agent.local/".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAgentUri { index: 0, .. })
        ));
    }

    #[test]
    fn run_needs_an_agent() {
        let config = SimConfig::new("Corridor", Mode::Performing, vec![PlayerConfig::builtin(1)]);
        assert!(matches!(config.validate(), Err(ConfigError::NoAgent)));

        let empty = SimConfig::new("Corridor", Mode::Performing, Vec::new());
        assert!(matches!(empty.validate(), Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn sim_config_uses_camel_case_wire_names() {
        let json = r#"{"map":"Corridor","mode":"Performing","players":[{"race":1,"uri":"http://a/"}]}"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, Mode::Performing);
        assert_eq!(config.players[0].token, None);
        config.validate().unwrap();
    }

    #[test]
    fn orchestrator_defaults_validate() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_episodes, DEFAULT_MAX_EPISODES);
        config.validate().unwrap();

        let zero = OrchestratorConfig {
            max_episodes: 0,
            ..OrchestratorConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn orchestrator_loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simrelay.json");
        std::fs::write(&path, r#"{"max_episodes": 3, "agent_timeout": 1500}"#).unwrap();

        let config = OrchestratorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_episodes, 3);
        assert_eq!(config.agent_timeout, Duration::from_millis(1500));
        assert_eq!(config.runner_thread_name, "simrelay-runner");
    }

    #[test]
    fn orchestrator_file_errors_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            OrchestratorConfig::from_json_file(&missing),
            Err(ConfigError::Load { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"max_episodes": 0}"#).unwrap();
        assert!(matches!(
            OrchestratorConfig::from_json_file(&bad),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }
}
