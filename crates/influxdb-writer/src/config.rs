// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchOptions;
use crate::client::ClientOptions;
use crate::constants::{
    DEFAULT_AUTH_TOKEN, DEFAULT_BATCH_SIZE, DEFAULT_BUCKET, DEFAULT_ENTRIES_LIMIT,
    DEFAULT_HTTP_TIMEOUT, DEFAULT_SEND_INTERVAL, DEFAULT_SEND_TIMEOUT, DEFAULT_SERVER_URL,
};
use crate::errors::ConfigError;
use crate::writer::{FlushTrigger, WriterOptions};

/// Timestamp precision of the written points, sent as the `precision` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl Precision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ns" => Ok(Self::Nanoseconds),
            "us" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            other => Err(format!("unknown precision '{other}', expected ns, us, ms or s")),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server_url: String,
    pub auth_token: String,
    pub bucket: String,
    pub precision: Option<Precision>,
    /// Timeout of the underlying HTTP client.
    pub http_timeout: Duration,
    pub https_proxy: Option<String>,
    /// Byte limit of a batch, separators included.
    pub batch_size: usize,
    pub entries_limit: usize,
    /// how often the batch is flushed
    pub send_interval: Duration,
    /// upper bound of a single flush
    pub send_timeout: Duration,
    pub flush_trigger: FlushTrigger,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            auth_token: DEFAULT_AUTH_TOKEN.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            precision: Some(Precision::Nanoseconds),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            https_proxy: None,
            batch_size: DEFAULT_BATCH_SIZE,
            entries_limit: DEFAULT_ENTRIES_LIMIT,
            send_interval: DEFAULT_SEND_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            flush_trigger: FlushTrigger::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from `INFLUXDB_*` environment variables.
    ///
    /// Unset variables keep their default value. An empty `INFLUXDB_BUCKET` or
    /// `INFLUXDB_PRECISION` drops the query parameter.
    pub fn from_env() -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let precision = match env::var("INFLUXDB_PRECISION") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(parse_var("INFLUXDB_PRECISION", &value)?),
            Err(_) => defaults.precision,
        };

        let send_interval =
            duration_var("INFLUXDB_SEND_INTERVAL_MS")?.unwrap_or(defaults.send_interval);
        if send_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "INFLUXDB_SEND_INTERVAL_MS",
                value: send_interval.as_millis().to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Config {
            server_url: env::var("INFLUXDB_URL").unwrap_or(defaults.server_url),
            auth_token: env::var("INFLUXDB_TOKEN").unwrap_or(defaults.auth_token),
            bucket: env::var("INFLUXDB_BUCKET").unwrap_or(defaults.bucket),
            precision,
            http_timeout: duration_var("INFLUXDB_HTTP_TIMEOUT_MS")?.unwrap_or(defaults.http_timeout),
            https_proxy: env::var("INFLUXDB_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            batch_size: number_var("INFLUXDB_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            entries_limit: number_var("INFLUXDB_ENTRIES_LIMIT")?.unwrap_or(defaults.entries_limit),
            send_interval,
            send_timeout: duration_var("INFLUXDB_SEND_TIMEOUT_MS")?
                .unwrap_or(defaults.send_timeout),
            flush_trigger: match env::var("INFLUXDB_FLUSH_TRIGGER") {
                Ok(value) => parse_var("INFLUXDB_FLUSH_TRIGGER", &value)?,
                Err(_) => defaults.flush_trigger,
            },
        })
    }

    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            server_url: self.server_url.clone(),
            auth_token: self.auth_token.clone(),
            bucket: self.bucket.clone(),
            precision: self.precision,
            http_timeout: self.http_timeout,
            https_proxy: self.https_proxy.clone(),
        }
    }

    #[must_use]
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            size_limit: self.batch_size,
            entries_limit: self.entries_limit,
        }
    }

    #[must_use]
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            send_interval: self.send_interval,
            send_timeout: self.send_timeout,
            flush_trigger: self.flush_trigger,
        }
    }
}

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn number_var(name: &'static str) -> Result<Option<usize>, ConfigError> {
    env::var(name)
        .ok()
        .map(|value| parse_var::<usize>(name, &value))
        .transpose()
}

fn duration_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env::var(name)
        .ok()
        .map(|value| parse_var::<u64>(name, &value))
        .transpose()?
        .map(Duration::from_millis))
}
