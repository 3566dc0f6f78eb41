//! Configuration file management for parley.
//!
//! Provides a TOML-based config file at `~/.config/parley/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use parley_core::backend::{BackendId, CallOptions, Credentials, Endpoints};
use parley_core::negotiation::{ArbiterChoice, NegotiationConfig, Participants};
use parley_db::config::DbConfig;
use parley_db::models::RunMode;

/// Environment variables read for each backend's key, in priority order.
pub const CREDENTIAL_ENV: [(BackendId, &[&str]); 5] = [
    (BackendId::Anthropic, &["ANTHROPIC_API_KEY"]),
    (BackendId::Google, &["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
    (BackendId::Groq, &["GROQ_API_KEY"]),
    (BackendId::Openai, &["OPENAI_API_KEY"]),
    (BackendId::Openrouter, &["OPENROUTER_API_KEY"]),
];

pub const DEFAULT_OUTPUT_DIR: &str = "output";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Backend id (`anthropic`, `google`, ...) to API key.
    pub credentials: BTreeMap<String, String>,
    pub negotiation: NegotiationSection,
    pub transport: TransportSection,
    pub output: OutputSection,
    pub database: DatabaseSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NegotiationSection {
    pub rounds: Option<u32>,
    pub mode: Option<String>,
    pub agent_a: Option<String>,
    pub agent_b: Option<String>,
    /// Critic profile id; an empty string disables the stress test.
    pub critic: Option<String>,
    pub arbiter_persona: Option<String>,
    /// Backend for the arbiter; defaults to agent A's.
    pub arbiter_backend: Option<String>,
    /// Extra profile directory searched before the built-ins.
    pub profile_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    /// Backends served by the out-of-process (`curl`) transport.
    pub process_backends: Vec<String>,
    /// Program used by the process transport.
    pub program: Option<String>,
    /// Backend id to base URL.
    pub base_urls: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the parley config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/parley` or `~/.config/parley`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("parley");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("parley")
}

/// Return the path to the parley config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Load the config file if it exists. A file that exists but does not parse
/// is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    load_config_from(&path).map(Some)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub rounds: Option<u32>,
    pub mode: Option<RunMode>,
    pub agent_a: Option<String>,
    pub agent_b: Option<String>,
    pub critic: Option<String>,
    pub no_critic: bool,
    pub arbiter: Option<BackendId>,
    pub output: Option<PathBuf>,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub process_backends: BTreeSet<BackendId>,
    pub program: Option<String>,
    pub endpoints: Endpoints,
    pub options: CallOptions,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct ParleyConfig {
    pub credentials: Credentials,
    pub negotiation: NegotiationConfig,
    pub participants: Participants,
    pub profile_dir: Option<PathBuf>,
    pub transport: TransportSettings,
    pub output_dir: PathBuf,
    /// `None` when no database URL was given anywhere.
    pub database_url: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_backend(value: &str, what: &str) -> Result<BackendId> {
    value
        .parse::<BackendId>()
        .with_context(|| format!("invalid {what}"))
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name}={raw:?} is invalid: {e}")),
    }
}

impl ParleyConfig {
    /// Resolve against the config file at the default XDG location.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_config()?.unwrap_or_default();
        Self::resolve_with(cli, file)
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    pub fn resolve_with(cli: &CliOverrides, file: ConfigFile) -> Result<Self> {
        let mut credentials = Credentials::new();
        for (backend, names) in CREDENTIAL_ENV {
            if let Some(key) = names.iter().find_map(|name| env_var(name)) {
                credentials.insert(backend, key);
            }
        }
        for (name, key) in &file.credentials {
            let backend = parse_backend(name, "backend in [credentials]")?;
            credentials.insert_if_absent(backend, key.as_str());
        }

        let neg = file.negotiation;
        let defaults = NegotiationConfig::default();

        let rounds = match cli.rounds {
            Some(n) => n,
            None => parse_env("PARLEY_ROUNDS")?
                .or(neg.rounds)
                .unwrap_or(defaults.rounds),
        };
        if rounds == 0 {
            bail!("rounds must be at least 1");
        }

        let mode = match cli.mode {
            Some(mode) => mode,
            None => match parse_env::<RunMode>("PARLEY_MODE")? {
                Some(mode) => mode,
                None => match neg.mode.as_deref() {
                    Some(raw) => raw
                        .parse()
                        .map_err(|e| anyhow::anyhow!("invalid negotiation.mode: {e}"))?,
                    None => defaults.mode,
                },
            },
        };

        let arbiter_backend = match cli.arbiter {
            Some(b) => Some(b),
            None => match env_var("PARLEY_ARBITER").or(neg.arbiter_backend) {
                Some(raw) => Some(parse_backend(&raw, "arbiter backend")?),
                None => None,
            },
        };

        let base = Participants::default();
        let pick = |cli_value: &Option<String>, env: &str, file_value: Option<String>| {
            cli_value.clone().or_else(|| env_var(env)).or(file_value)
        };
        let critic = if cli.no_critic {
            None
        } else {
            match pick(&cli.critic, "PARLEY_CRITIC", neg.critic) {
                Some(id) if id.trim().is_empty() => None,
                Some(id) => Some(id),
                None => base.critic,
            }
        };
        let arbiter_persona = match neg.arbiter_persona {
            Some(id) if id.trim().is_empty() => None,
            Some(id) => Some(id),
            None => base.arbiter_persona,
        };
        let participants = Participants {
            agent_a: pick(&cli.agent_a, "PARLEY_AGENT_A", neg.agent_a).unwrap_or(base.agent_a),
            agent_b: pick(&cli.agent_b, "PARLEY_AGENT_B", neg.agent_b).unwrap_or(base.agent_b),
            arbiter_persona,
            critic,
        };

        let negotiation = NegotiationConfig {
            rounds,
            mode,
            arbiter: arbiter_backend.map_or(ArbiterChoice::FirstPrincipal, ArbiterChoice::Backend),
            ..defaults
        };

        let profile_dir = env_var("PARLEY_PROFILE_DIR")
            .map(PathBuf::from)
            .or(neg.profile_dir);

        let transport = resolve_transport(file.transport)?;

        let output_dir = cli
            .output
            .clone()
            .or_else(|| env_var("PARLEY_OUTPUT_DIR").map(PathBuf::from))
            .or(file.output.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let database_url = cli
            .database_url
            .clone()
            .or_else(|| env_var("PARLEY_DATABASE_URL"))
            .or(file.database.url);

        Ok(Self {
            credentials,
            negotiation,
            participants,
            profile_dir,
            transport,
            output_dir,
            database_url,
        })
    }

    /// The configured database, or the default local one.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::or_default(self.database_url.clone())
    }
}

fn resolve_transport(section: TransportSection) -> Result<TransportSettings> {
    let mut process_backends = BTreeSet::new();
    for name in &section.process_backends {
        process_backends.insert(parse_backend(name, "backend in transport.process_backends")?);
    }

    let mut endpoints = Endpoints::new();
    for (name, url) in &section.base_urls {
        endpoints.set(parse_backend(name, "backend in transport.base_urls")?, url.as_str());
    }

    let defaults = CallOptions::default();
    let timeout_secs = parse_env::<u64>("PARLEY_TIMEOUT_SECS")?.or(section.timeout_secs);
    let options = CallOptions {
        max_output_tokens: section.max_output_tokens.unwrap_or(defaults.max_output_tokens),
        timeout: timeout_secs.map_or(defaults.timeout, Duration::from_secs),
    };

    Ok(TransportSettings {
        process_backends,
        program: section.program,
        endpoints,
        options,
    })
}

/// Starter config written by `parley init`.
pub fn starter_config() -> ConfigFile {
    let defaults = NegotiationConfig::default();
    let participants = Participants::default();
    ConfigFile {
        credentials: BTreeMap::new(),
        negotiation: NegotiationSection {
            rounds: Some(defaults.rounds),
            mode: Some(defaults.mode.to_string()),
            agent_a: Some(participants.agent_a),
            agent_b: Some(participants.agent_b),
            critic: participants.critic,
            arbiter_persona: participants.arbiter_persona,
            arbiter_backend: None,
            profile_dir: None,
        },
        transport: TransportSection {
            timeout_secs: Some(CallOptions::default().timeout.as_secs()),
            max_output_tokens: Some(CallOptions::default().max_output_tokens),
            ..TransportSection::default()
        },
        output: OutputSection {
            dir: Some(PathBuf::from(DEFAULT_OUTPUT_DIR)),
        },
        database: DatabaseSection::default(),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{clear_parley_env, lock_env};

    fn file_from(text: &str) -> ConfigFile {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn empty_file_resolves_to_defaults() {
        let _lock = lock_env();
        clear_parley_env();

        let cfg = ParleyConfig::resolve_with(&CliOverrides::default(), ConfigFile::default()).unwrap();
        assert_eq!(cfg.negotiation.rounds, 3);
        assert_eq!(cfg.negotiation.mode, RunMode::Parallel);
        assert_eq!(cfg.negotiation.arbiter, ArbiterChoice::FirstPrincipal);
        assert_eq!(cfg.participants, Participants::default());
        assert_eq!(cfg.output_dir, PathBuf::from("output"));
        assert!(cfg.credentials.is_empty());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.db_config().database_url, DbConfig::DEFAULT_URL);
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let _lock = lock_env();
        clear_parley_env();

        let file = file_from(
            r#"
            [negotiation]
            rounds = 5
            mode = "sequential"
            agent_a = "file-a"
            agent_b = "file-b"
            "#,
        );
        unsafe { std::env::set_var("PARLEY_ROUNDS", "4") };
        unsafe { std::env::set_var("PARLEY_AGENT_A", "env-a") };

        let cli = CliOverrides {
            agent_a: Some("cli-a".into()),
            ..CliOverrides::default()
        };
        let cfg = ParleyConfig::resolve_with(&cli, file).unwrap();
        clear_parley_env();

        assert_eq!(cfg.participants.agent_a, "cli-a");
        assert_eq!(cfg.participants.agent_b, "file-b");
        assert_eq!(cfg.negotiation.rounds, 4);
        assert_eq!(cfg.negotiation.mode, RunMode::Sequential);
    }

    #[test]
    fn env_credentials_win_over_file_and_blank_keys_are_absent() {
        let _lock = lock_env();
        clear_parley_env();

        let file = file_from(
            r#"
            [credentials]
            anthropic = "file-anthropic-key"
            groq = "file-groq-key-000"
            openai = "   "
            "#,
        );
        unsafe { std::env::set_var("ANTHROPIC_API_KEY", "env-anthropic-key") };
        unsafe { std::env::set_var("GEMINI_API_KEY", "env-gemini-key-00") };
        unsafe { std::env::set_var("GROQ_API_KEY", "") };

        let cfg = ParleyConfig::resolve_with(&CliOverrides::default(), file).unwrap();
        clear_parley_env();

        let creds = &cfg.credentials;
        assert_eq!(creds.get(BackendId::Anthropic), Some("env-anthropic-key"));
        assert_eq!(creds.get(BackendId::Google), Some("env-gemini-key-00"));
        assert_eq!(creds.get(BackendId::Groq), Some("file-groq-key-000"));
        assert!(!creds.contains(BackendId::Openai));
    }

    #[test]
    fn no_critic_flag_and_empty_critic_disable_stress_test() {
        let _lock = lock_env();
        clear_parley_env();

        let cli = CliOverrides {
            no_critic: true,
            ..CliOverrides::default()
        };
        let cfg = ParleyConfig::resolve_with(&cli, ConfigFile::default()).unwrap();
        assert!(cfg.participants.critic.is_none());

        let file = file_from("[negotiation]\ncritic = \"\"\n");
        let cfg = ParleyConfig::resolve_with(&CliOverrides::default(), file).unwrap();
        assert!(cfg.participants.critic.is_none());
    }

    #[test]
    fn transport_section_is_parsed() {
        let _lock = lock_env();
        clear_parley_env();

        let file = file_from(
            r#"
            [transport]
            process_backends = ["google"]
            timeout_secs = 30
            max_output_tokens = 512

            [transport.base_urls]
            groq = "http://localhost:9999"

            [negotiation]
            arbiter_backend = "groq"
            "#,
        );
        let cfg = ParleyConfig::resolve_with(&CliOverrides::default(), file).unwrap();
        let t = &cfg.transport;
        assert!(t.process_backends.contains(&BackendId::Google));
        assert_eq!(t.options.timeout, Duration::from_secs(30));
        assert_eq!(t.options.max_output_tokens, 512);
        assert_eq!(t.endpoints.base_url(BackendId::Groq), "http://localhost:9999");
        assert_eq!(cfg.negotiation.arbiter, ArbiterChoice::Backend(BackendId::Groq));
    }

    #[test]
    fn invalid_values_are_reported() {
        let _lock = lock_env();
        clear_parley_env();

        let file = file_from("[credentials]\nclaude = \"x\"\n");
        let err = ParleyConfig::resolve_with(&CliOverrides::default(), file).unwrap_err();
        assert!(format!("{err:#}").contains("[credentials]"));

        unsafe { std::env::set_var("PARLEY_ROUNDS", "many") };
        let err = ParleyConfig::resolve_with(&CliOverrides::default(), ConfigFile::default())
            .unwrap_err();
        clear_parley_env();
        assert!(err.to_string().contains("PARLEY_ROUNDS"));

        assert!(toml::from_str::<ConfigFile>("[negotiation]\nspeed = 1\n").is_err());
    }

    #[test]
    fn save_config_round_trips_with_private_permissions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("parley").join("config.toml");

        save_config_to(&path, &starter_config()).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.negotiation.agent_a.as_deref(), Some("boolean"));
        assert_eq!(loaded.negotiation.critic.as_deref(), Some("seer"));
        assert_eq!(loaded.transport.timeout_secs, Some(120));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(&path).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("parley/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
