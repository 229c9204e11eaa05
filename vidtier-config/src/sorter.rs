use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::Context;
use tracing::debug;
use vidtier_core::SorterConfig;

use crate::error::ConfigLoadError;

pub const ENV_CONFIG_PATH: &str = "VIDTIER_CONFIG_PATH";
pub const ENV_CONFIG_JSON: &str = "VIDTIER_CONFIG_JSON";
pub const ENV_FFPROBE: &str = "VIDTIER_FFPROBE";
pub const ENV_WORKERS: &str = "VIDTIER_WORKERS";
pub const ENV_PROBE_TIMEOUT: &str = "VIDTIER_PROBE_TIMEOUT";

/// Looked up relative to the working directory, first match wins.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "vidtier.toml",
    "vidtier.json",
    "config/vidtier.toml",
    "config/vidtier.json",
];

/// Source that produced the sorter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// File named on the command line.
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("built-in defaults"),
            ConfigSource::Explicit(path) => write!(f, "{}", path.display()),
            ConfigSource::EnvPath(path) => write!(f, "{} (via {ENV_CONFIG_PATH})", path.display()),
            ConfigSource::EnvInline => f.write_str(ENV_CONFIG_JSON),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Load configuration from the process environment and working directory.
/// Evaluation order:
/// 1) `$VIDTIER_CONFIG_PATH` (TOML or JSON file),
/// 2) `$VIDTIER_CONFIG_JSON` (inline JSON),
/// 3) the first of [`DEFAULT_CONFIG_FILES`] that exists,
/// 4) defaults.
///
/// `VIDTIER_FFPROBE`, `VIDTIER_WORKERS` and `VIDTIER_PROBE_TIMEOUT` are then
/// applied on top.
pub fn load_from_env() -> anyhow::Result<(SorterConfig, ConfigSource)> {
    load(None)
}

/// Like [`load_from_env`], but an `explicit` file takes precedence over every
/// other source. Per-field env overrides still apply.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<(SorterConfig, ConfigSource)> {
    let cwd = env::current_dir().context("failed to resolve working directory")?;
    let vars: HashMap<String, String> = env::vars().collect();
    load_with(explicit, &cwd, |name| vars.get(name).cloned())
}

/// Resolution with the environment and working directory supplied by the
/// caller.
pub fn load_with<F>(
    explicit: Option<&Path>,
    base_dir: &Path,
    lookup: F,
) -> anyhow::Result<(SorterConfig, ConfigSource)>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut config, source) = load_base(explicit, base_dir, &lookup)?;
    apply_env_overrides_with(&mut config, &lookup)?;
    validate(&config).with_context(|| format!("invalid configuration from {source}"))?;
    debug!(%source, ?config, "configuration loaded");
    Ok((config, source))
}

fn load_base<F>(
    explicit: Option<&Path>,
    base_dir: &Path,
    lookup: &F,
) -> anyhow::Result<(SorterConfig, ConfigSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        let config = load_from_file(path)?;
        return Ok((config, ConfigSource::Explicit(path.to_path_buf())));
    }

    if let Some(path_str) = lookup(ENV_CONFIG_PATH)
        && !path_str.trim().is_empty()
    {
        let path = PathBuf::from(path_str.trim());
        let config = load_from_file(&path)?;
        return Ok((config, ConfigSource::EnvPath(path)));
    }

    if let Some(raw) = lookup(ENV_CONFIG_JSON)
        && !raw.trim().is_empty()
    {
        let config = parse_json(&raw).with_context(|| format!("failed to parse {ENV_CONFIG_JSON}"))?;
        return Ok((config, ConfigSource::EnvInline));
    }

    if let Some(path) = find_default_file(base_dir) {
        let config = load_from_file(&path)?;
        return Ok((config, ConfigSource::File(path)));
    }

    Ok((SorterConfig::default(), ConfigSource::Default))
}

pub fn load_from_file(path: &Path) -> Result<SorterConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .map_err(|source| ConfigLoadError::Json { origin, source }),
        Some("toml") | Some("tml") => {
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Toml { origin, source })
        }
        _ => parse_from_str(&contents, &origin),
    }
}

/// Parse a config of unknown format: TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> Result<SorterConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Unrecognized {
            origin: origin.to_string(),
            toml: toml_err.to_string(),
            json: json_err.to_string(),
        })
    })
}

pub fn parse_json(raw: &str) -> Result<SorterConfig, ConfigLoadError> {
    serde_json::from_str(raw).map_err(|source| ConfigLoadError::Json {
        origin: "inline json".to_string(),
        source,
    })
}

pub fn find_default_file(base_dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|candidate| base_dir.join(candidate))
        .find(|path| path.is_file())
}

/// Apply `VIDTIER_*` field overrides from the process environment.
pub fn apply_env_overrides(config: &mut SorterConfig) -> Result<(), ConfigLoadError> {
    apply_env_overrides_with(config, |name| env::var(name).ok())
}

pub fn apply_env_overrides_with<F>(config: &mut SorterConfig, lookup: F) -> Result<(), ConfigLoadError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(path) = get(ENV_FFPROBE) {
        config.ffprobe_path = PathBuf::from(path.trim());
    }

    if let Some(raw) = get(ENV_WORKERS) {
        let workers = raw
            .trim()
            .parse::<usize>()
            .map_err(|err| ConfigLoadError::InvalidOverride {
                var: ENV_WORKERS,
                value: raw.clone(),
                reason: err.to_string(),
            })?;
        config.workers = Some(workers);
    }

    if let Some(raw) = get(ENV_PROBE_TIMEOUT) {
        let invalid = |reason: String| ConfigLoadError::InvalidOverride {
            var: ENV_PROBE_TIMEOUT,
            value: raw.clone(),
            reason,
        };
        let timeout = humantime::parse_duration(raw.trim()).map_err(|err| invalid(err.to_string()))?;
        config.probe_timeout_ms =
            u64::try_from(timeout.as_millis()).map_err(|_| invalid("duration too large".into()))?;
    }

    Ok(())
}

/// Reject settings that parse but cannot drive a run.
pub fn validate(config: &SorterConfig) -> Result<(), ConfigLoadError> {
    if config.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigLoadError::Invalid {
            field: "ffprobe_path",
            reason: "must not be empty".into(),
        });
    }
    if config.workers == Some(0) {
        return Err(ConfigLoadError::Invalid {
            field: "workers",
            reason: "must be at least 1".into(),
        });
    }
    if config.probe_timeout_ms == 0 {
        return Err(ConfigLoadError::Invalid {
            field: "probe_timeout_ms",
            reason: "must be greater than zero".into(),
        });
    }
    if config.video_extensions.is_empty() {
        return Err(ConfigLoadError::Invalid {
            field: "video_extensions",
            reason: "at least one extension is required".into(),
        });
    }
    if let Some(blank) = config
        .video_extensions
        .iter()
        .find(|ext| ext.trim().trim_start_matches('.').is_empty())
    {
        return Err(ConfigLoadError::Invalid {
            field: "video_extensions",
            reason: format!("blank extension {blank:?}"),
        });
    }
    Ok(())
}
