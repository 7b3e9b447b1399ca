//! Run configuration.
//!
//! A run is configured once at startup and read-only afterwards. Each value
//! is taken from the first source that sets it: CLI flag, JSON config file,
//! environment, built-in default.

use crate::cli::RunArgs;
use crate::enrich::LoopSettings;
use crate::inference::http::DEFAULT_BASE_URL;
use crate::inference::RetryPolicy;
use crate::run_log::RunLog;
use crate::schema::TargetSchema;
use crate::store::Encoding;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_DELAY_SECONDS: f64 = 0.5;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: f64 = 60.0;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_LM_COMMAND: &str = "BOOKRICH_LM_COMMAND";

/// Optional settings loaded from `--config <file>`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub model: Option<String>,
    pub delay_seconds: Option<f64>,
    pub max_retries: Option<u32>,
    pub retry_base_seconds: Option<f64>,
    pub retry_max_seconds: Option<f64>,
    pub request_timeout_seconds: Option<f64>,
    pub schema: Option<TargetSchema>,
    pub delimiter: Option<char>,
    pub encoding: Option<Encoding>,
    pub lm_command: Option<String>,
    pub base_url: Option<String>,
    pub log_file: Option<PathBuf>,
    pub backup: Option<bool>,
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

/// Which completion backend serves the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceSelection {
    Command(String),
    Http {
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input_path: PathBuf,
    pub model_identifier: String,
    pub start_offset: usize,
    pub delay: Duration,
    pub backup_requested: bool,
    pub discard_abandoned: bool,
    pub retry: RetryPolicy,
    pub schema: TargetSchema,
    pub delimiter: char,
    pub encoding: Encoding,
    pub log_path: PathBuf,
    pub service: ServiceSelection,
}

impl RunConfig {
    /// Resolve flags, config file and environment into one configuration.
    pub fn resolve(
        args: &RunArgs,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let model_identifier = args
            .model
            .clone()
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let delay = seconds(
            "delay",
            args.delay.or(file.delay_seconds).unwrap_or(DEFAULT_DELAY_SECONDS),
        )?;
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries),
            base_delay: match args.retry_delay.or(file.retry_base_seconds) {
                Some(value) => seconds("retry delay", value)?,
                None => defaults.base_delay,
            },
            max_delay: match file.retry_max_seconds {
                Some(value) => seconds("retry max delay", value)?,
                None => defaults.max_delay,
            },
        };
        let timeout = seconds(
            "request timeout",
            file.request_timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        )?;

        let delimiter = args.delimiter.or(file.delimiter).unwrap_or(',');
        if delimiter == '"' || delimiter == '\n' || delimiter == '\r' {
            return Err(anyhow!("delimiter cannot be a quote or line break"));
        }

        let lm_command = args
            .lm_command
            .clone()
            .or(file.lm_command)
            .or_else(|| env(ENV_LM_COMMAND))
            .filter(|command| !command.trim().is_empty());
        let service = match lm_command {
            Some(command) => ServiceSelection::Command(command),
            None => {
                let api_key = env(ENV_API_KEY)
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| {
                        anyhow!("{ENV_API_KEY} is not set (or pass --lm-command / set {ENV_LM_COMMAND})")
                    })?;
                let base_url = args
                    .base_url
                    .clone()
                    .or(file.base_url)
                    .or_else(|| env(ENV_BASE_URL))
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
                ServiceSelection::Http {
                    base_url,
                    api_key,
                    model: model_identifier.clone(),
                    timeout,
                }
            }
        };

        let log_path = args
            .log_file
            .clone()
            .or(file.log_file)
            .unwrap_or_else(|| RunLog::for_input(&args.input).path().to_path_buf());

        Ok(Self {
            input_path: args.input.clone(),
            model_identifier,
            start_offset: args.start.unwrap_or(1).max(1),
            delay,
            backup_requested: args.backup || file.backup.unwrap_or(false),
            discard_abandoned: args.discard_scratch,
            retry,
            schema: args.schema.or(file.schema).unwrap_or_default(),
            delimiter,
            encoding: args.encoding.or(file.encoding).unwrap_or_default(),
            log_path,
            service,
        })
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            start_offset: self.start_offset,
            delay: self.delay,
            backup: self.backup_requested,
            discard_abandoned: self.discard_abandoned,
        }
    }
}

fn seconds(label: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|err| anyhow!("{label} must be a non-negative number of seconds, got {value}: {err}"))
}
