//! Configuration loading for vidtier.
//!
//! [`load_from_env`] resolves a [`SorterConfig`](vidtier_core::SorterConfig)
//! from, in order, `$VIDTIER_CONFIG_PATH`, `$VIDTIER_CONFIG_JSON`, a default
//! config file in the working directory, or built-in defaults. Individual
//! `VIDTIER_*` variables are applied on top, and the result is validated
//! before it is handed out.
#![allow(missing_docs)]

pub mod error;
pub mod sorter;

pub use error::ConfigLoadError;
pub use sorter::{
    ConfigSource, DEFAULT_CONFIG_FILES, ENV_CONFIG_JSON, ENV_CONFIG_PATH, ENV_FFPROBE,
    ENV_PROBE_TIMEOUT, ENV_WORKERS, apply_env_overrides, apply_env_overrides_with,
    find_default_file, load, load_from_env, load_from_file, load_with, parse_from_str, parse_json,
    validate,
};
