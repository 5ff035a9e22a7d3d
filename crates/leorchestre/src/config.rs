//! Orchestrator configuration from TOML or environment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Default remote engine endpoint
pub const DEFAULT_ENGINE_ENDPOINT: &str = "http://localhost:9501/graphql";

/// Default registration service endpoint
pub const DEFAULT_REGISTRATION_ENDPOINT: &str = "http://localhost:8081/register-tournament";

/// Default tournament name
pub const DEFAULT_TOURNAMENT_NAME: &str = "Sunday tournament";

/// Default starting chips per entrant
pub const DEFAULT_STARTING_CHIPS: i64 = 5000;

/// Default seats per table
pub const DEFAULT_MAX_ENTRANTS_PER_TABLE: i64 = 6;

/// Default number of entrants to register
pub const DEFAULT_ENTRANT_COUNT: i64 = 30;

/// Default wait between staging and kickoff in milliseconds
pub const DEFAULT_PRE_KICKOFF_WAIT_MS: u64 = 5_000;

/// Default status poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default maximum time to wait for the tournament to end (2 hours)
pub const DEFAULT_MAX_MONITOR_WAIT_MS: u64 = 2 * 60 * 60 * 1_000;

/// Whether kickoff is preceded by an about-to-start staging phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KickoffMode {
    /// Trigger about-to-start, wait, then kick off.
    #[default]
    Staged,
    /// Kick off right after registration.
    Direct,
}

/// Per-call timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTimeouts {
    /// Schedule, stage and kickoff calls.
    pub control_ms: u64,
    /// Registration call. Longer: the entrant pool may be cold-starting.
    pub registration_ms: u64,
    /// Single status poll.
    pub status_poll_ms: u64,
    /// End call returning entrant stats.
    pub end_ms: u64,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            control_ms: 10_000,
            registration_ms: 120_000,
            status_poll_ms: 5_000,
            end_ms: 30_000,
        }
    }
}

impl CallTimeouts {
    /// Schedule/stage/kickoff timeout.
    pub fn control(&self) -> Duration {
        Duration::from_millis(self.control_ms)
    }

    /// Registration timeout.
    pub fn registration(&self) -> Duration {
        Duration::from_millis(self.registration_ms)
    }

    /// Status poll timeout.
    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }

    /// End call timeout.
    pub fn end(&self) -> Duration {
        Duration::from_millis(self.end_ms)
    }
}

/// Tournament parameters as supplied by the operator.
///
/// Counts are signed so that negative values reach validation instead of
/// failing inside the deserializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    /// Display name.
    pub name: String,
    /// Chips each entrant starts with.
    pub starting_chips: i64,
    /// Seats per table, at least 2.
    pub max_entrants_per_table: i64,
    /// Scheduled start, RFC 3339.
    pub start_time: DateTime<Utc>,
    /// Entrants to register.
    pub entrant_count: i64,
    /// Delay between staging and kickoff in milliseconds.
    pub pre_kickoff_wait_ms: u64,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_TOURNAMENT_NAME.to_string(),
            starting_chips: DEFAULT_STARTING_CHIPS,
            max_entrants_per_table: DEFAULT_MAX_ENTRANTS_PER_TABLE,
            start_time: Utc::now() + chrono::Duration::seconds(60),
            entrant_count: DEFAULT_ENTRANT_COUNT,
            pre_kickoff_wait_ms: DEFAULT_PRE_KICKOFF_WAIT_MS,
        }
    }
}

impl TournamentConfig {
    /// Validate against `now` and produce the typed plan the orchestrator runs.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<TournamentPlan, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }

        let starting_chips = positive("starting_chips", self.starting_chips)?;
        let entrant_count = positive("entrant_count", self.entrant_count)?;
        let max_entrants_per_table = positive("max_entrants_per_table", self.max_entrants_per_table)?;
        if max_entrants_per_table < 2 {
            return Err(ConfigError::invalid(
                "max_entrants_per_table",
                format!("must be at least 2, got {max_entrants_per_table}"),
            ));
        }

        if self.start_time < now {
            return Err(ConfigError::invalid(
                "start_time",
                format!("{} is in the past", self.start_time.to_rfc3339()),
            ));
        }

        let entrant_count = u32::try_from(entrant_count)
            .map_err(|_| ConfigError::invalid("entrant_count", "too large"))?;
        let max_entrants_per_table = u32::try_from(max_entrants_per_table)
            .map_err(|_| ConfigError::invalid("max_entrants_per_table", "too large"))?;

        Ok(TournamentPlan {
            name: self.name.clone(),
            starting_chips,
            max_entrants_per_table,
            start_time: self.start_time,
            entrant_count,
            pre_kickoff_wait: Duration::from_millis(self.pre_kickoff_wait_ms),
        })
    }
}

fn positive(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::invalid(field, format!("must be positive, got {value}")))
}

/// Validated tournament parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentPlan {
    /// Display name.
    pub name: String,
    /// Chips each entrant starts with.
    pub starting_chips: u64,
    /// Seats per table.
    pub max_entrants_per_table: u32,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Entrants to register.
    pub entrant_count: u32,
    /// Delay between staging and kickoff.
    pub pre_kickoff_wait: Duration,
}

/// Full orchestrator configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Remote engine endpoint handed to the transport.
    pub engine_endpoint: String,

    /// Registration service endpoint handed to the transport.
    pub registration_endpoint: String,

    /// Bearer credential for both services.
    pub auth_token: Option<String>,

    /// Per-call timeouts.
    pub timeouts: CallTimeouts,

    /// Delay between status polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Longest time to wait for the tournament to end in milliseconds.
    pub max_monitor_wait_ms: u64,

    /// Retry budget and backoff.
    pub retry: RetryPolicy,

    /// Staged or direct kickoff.
    pub kickoff_mode: KickoffMode,

    /// Read status after stage and kickoff and require the expected value.
    pub confirm_transitions: bool,

    /// Tournament parameters.
    pub tournament: TournamentConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            engine_endpoint: DEFAULT_ENGINE_ENDPOINT.to_string(),
            registration_endpoint: DEFAULT_REGISTRATION_ENDPOINT.to_string(),
            auth_token: None,
            timeouts: CallTimeouts::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_monitor_wait_ms: DEFAULT_MAX_MONITOR_WAIT_MS,
            retry: RetryPolicy::default(),
            kickoff_mode: KickoffMode::default(),
            confirm_transitions: true,
            tournament: TournamentConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing keys fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply environment overrides.
    ///
    /// Environment variables:
    /// - `LETOURNOI_ENGINE_URL` - Remote engine endpoint
    /// - `LETOURNOI_REGISTRATION_URL` - Registration service endpoint
    /// - `LETOURNOI_AUTH_TOKEN` - Bearer credential
    /// - `LETOURNOI_POLL_INTERVAL_MS` - Status poll interval
    /// - `LETOURNOI_MAX_WAIT_MS` - Maximum monitor wait
    /// - `LETOURNOI_RETRY_ATTEMPTS` - Attempts per remote call
    /// - `LETOURNOI_ENTRANT_COUNT` - Entrants to register
    ///
    /// Unparseable numeric values are ignored.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("LETOURNOI_ENGINE_URL") {
            self.engine_endpoint = url;
        }

        if let Ok(url) = std::env::var("LETOURNOI_REGISTRATION_URL") {
            self.registration_endpoint = url;
        }

        if let Ok(token) = std::env::var("LETOURNOI_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }

        if let Some(ms) = env_parse::<u64>("LETOURNOI_POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms;
        }

        if let Some(ms) = env_parse::<u64>("LETOURNOI_MAX_WAIT_MS") {
            self.max_monitor_wait_ms = ms;
        }

        if let Some(attempts) = env_parse::<u32>("LETOURNOI_RETRY_ATTEMPTS") {
            self.retry.max_attempts = attempts;
        }

        if let Some(count) = env_parse::<i64>("LETOURNOI_ENTRANT_COUNT") {
            self.tournament.entrant_count = count;
        }

        self
    }

    /// Validate the runtime knobs. Tournament parameters are validated per run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_endpoint.is_empty() {
            return Err(ConfigError::invalid("engine_endpoint", "must not be empty"));
        }

        if self.registration_endpoint.is_empty() {
            return Err(ConfigError::invalid("registration_endpoint", "must not be empty"));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be greater than zero"));
        }

        if self.max_monitor_wait_ms == 0 {
            return Err(ConfigError::invalid("max_monitor_wait_ms", "must be greater than zero"));
        }

        let t = &self.timeouts;
        for (field, value) in [
            ("timeouts.control_ms", t.control_ms),
            ("timeouts.registration_ms", t.registration_ms),
            ("timeouts.status_poll_ms", t.status_poll_ms),
            ("timeouts.end_ms", t.end_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }

        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::invalid(
                "retry.multiplier",
                format!("must be at least 1.0, got {}", self.retry.multiplier),
            ));
        }

        Ok(())
    }

    /// Status poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maximum monitor wait.
    pub fn max_monitor_wait(&self) -> Duration {
        Duration::from_millis(self.max_monitor_wait_ms)
    }

    /// Copy safe to print: the credential is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.auth_token.is_some() {
            copy.auth_token = Some("***".to_string());
        }
        copy
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn valid_tournament() -> TournamentConfig {
        TournamentConfig {
            start_time: Utc::now() + chrono::Duration::hours(1),
            ..TournamentConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.engine_endpoint, DEFAULT_ENGINE_ENDPOINT);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.kickoff_mode, KickoffMode::Staged);
        assert_eq!(config.tournament.entrant_count, 30);
        assert_eq!(config.tournament.pre_kickoff_wait_ms, 5_000);
        assert!(config.timeouts.registration() > config.timeouts.status_poll());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_tournament_produces_plan() {
        let plan = valid_tournament().validate(Utc::now()).expect("valid");
        assert_eq!(plan.name, DEFAULT_TOURNAMENT_NAME);
        assert_eq!(plan.starting_chips, 5000);
        assert_eq!(plan.max_entrants_per_table, 6);
        assert_eq!(plan.entrant_count, 30);
        assert_eq!(plan.pre_kickoff_wait, Duration::from_secs(5));
    }

    #[rstest]
    #[case::zero_entrants(|c: &mut TournamentConfig| c.entrant_count = 0, "entrant_count")]
    #[case::negative_entrants(|c: &mut TournamentConfig| c.entrant_count = -4, "entrant_count")]
    #[case::zero_chips(|c: &mut TournamentConfig| c.starting_chips = 0, "starting_chips")]
    #[case::single_seat_tables(|c: &mut TournamentConfig| c.max_entrants_per_table = 1, "max_entrants_per_table")]
    #[case::negative_seats(|c: &mut TournamentConfig| c.max_entrants_per_table = -6, "max_entrants_per_table")]
    #[case::empty_name(|c: &mut TournamentConfig| c.name = "  ".to_string(), "name")]
    #[case::past_start(|c: &mut TournamentConfig| c.start_time = Utc::now() - chrono::Duration::minutes(1), "start_time")]
    fn test_invalid_tournament_is_rejected(
        #[case] mutate: fn(&mut TournamentConfig),
        #[case] expected_field: &str,
    ) {
        let mut config = valid_tournament();
        mutate(&mut config);
        match config.validate(Utc::now()) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid {expected_field}, got {other:?}"),
        }
    }

    #[test]
    fn test_config_validate_zero_poll_interval() {
        let config = OrchestratorConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_zero_retry_attempts() {
        let mut config = OrchestratorConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_shrinking_backoff() {
        let mut config = OrchestratorConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
engine_endpoint = "http://engine:9501/graphql"
kickoff_mode = "direct"
poll_interval_ms = 250

[retry]
max_attempts = 5

[tournament]
name = "Friday turbo"
entrant_count = 12
start_time = "2099-06-01T00:00:00Z"
"#
        )
        .expect("write");

        let config = OrchestratorConfig::load(file.path()).expect("load");
        assert_eq!(config.engine_endpoint, "http://engine:9501/graphql");
        assert_eq!(config.kickoff_mode, KickoffMode::Direct);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 250);
        assert_eq!(config.tournament.name, "Friday turbo");
        assert_eq!(config.tournament.entrant_count, 12);
        assert_eq!(config.tournament.starting_chips, DEFAULT_STARTING_CHIPS);
        assert_eq!(config.registration_endpoint, DEFAULT_REGISTRATION_ENDPOINT);
    }

    #[test]
    fn test_config_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = OrchestratorConfig::load(dir.path().join("absent.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_config_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "poll_interval_ms = \"soon\"").expect("write");
        let err = OrchestratorConfig::load(file.path()).expect_err("bad type");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("LETOURNOI_ENGINE_URL", "http://10.0.0.5:9501/graphql");
        std::env::set_var("LETOURNOI_RETRY_ATTEMPTS", "7");
        std::env::set_var("LETOURNOI_ENTRANT_COUNT", "9");
        std::env::set_var("LETOURNOI_POLL_INTERVAL_MS", "not-a-number");

        let config = OrchestratorConfig::from_env();

        assert_eq!(config.engine_endpoint, "http://10.0.0.5:9501/graphql");
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.tournament.entrant_count, 9);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);

        // Clean up
        std::env::remove_var("LETOURNOI_ENGINE_URL");
        std::env::remove_var("LETOURNOI_RETRY_ATTEMPTS");
        std::env::remove_var("LETOURNOI_ENTRANT_COUNT");
        std::env::remove_var("LETOURNOI_POLL_INTERVAL_MS");
    }

    #[test]
    fn test_redacted_masks_token() {
        let config = OrchestratorConfig {
            auth_token: Some("46e290db".to_string()),
            ..Default::default()
        };
        assert_eq!(config.redacted().auth_token.as_deref(), Some("***"));
        assert_eq!(OrchestratorConfig::default().redacted().auth_token, None);
    }
}
