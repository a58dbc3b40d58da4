// Copyright 2024 Golem Cloud
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Test-friendly `tracing` setup: one layer per enabled output, each with its own filter.

use std::fs::File;
use std::io::stdout;
use std::sync::Arc;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Filter, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

pub enum Output {
    Stdout,
    File,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    pub enabled: bool,
    pub json: bool,
    pub json_flatten: bool,
    pub ansi: bool,
    pub without_time: bool,
    pub span_active: bool,
    pub span_full: bool,
}

impl OutputConfig {
    pub fn text() -> Self {
        Self {
            enabled: true,
            json: false,
            json_flatten: false,
            ansi: true,
            without_time: false,
            span_active: false,
            span_full: false,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::text()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    pub stdout: OutputConfig,
    pub file: OutputConfig,
    pub file_path: Option<String>,
}

impl TracingConfig {
    pub const ENV_PREFIX: &'static str = "TESTCONTAINERS_DEX_TRACING__";

    pub fn test(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            stdout: OutputConfig::text(),
            file: OutputConfig::disabled(),
            file_path: None,
        }
    }

    pub fn test_pretty_without_time(service_name: &str) -> Self {
        let mut config = Self::test(service_name);
        config.stdout.without_time = true;
        config.stdout.span_active = true;
        config
    }

    /// Applies `TESTCONTAINERS_DEX_TRACING__*` overrides, for example
    /// `TESTCONTAINERS_DEX_TRACING__STDOUT__JSON=true`. Fails on values that do not parse.
    pub fn with_env_overrides(self) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(&self))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingInitError {
    #[error("cannot create log file {path}: {source}")]
    LogFile {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    AlreadyInitialized(#[from] TryInitError),
}

pub fn init_tracing<F>(config: &TracingConfig, make_filter: F) -> Result<(), TracingInitError>
where
    F: Fn(Output) -> Box<dyn Filter<Registry> + 'static + Send + Sync>,
{
    let mut layers = Vec::new();

    if config.stdout.enabled {
        layers.push(make_layer(&config.stdout, make_filter(Output::Stdout), stdout))
    }

    match config.file_path {
        Some(ref file_path) if config.file.enabled => {
            let file = File::create(file_path).map_err(|source| TracingInitError::LogFile {
                path: file_path.clone(),
                source,
            })?;
            layers.push(make_layer(
                &config.file,
                make_filter(Output::File),
                Arc::new(file),
            ))
        }
        _ => {}
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    debug!(
        service_name = %config.service_name,
        tracing_config = %serde_json::to_string(&config).unwrap_or_default(),
        "Tracing initialized"
    );

    Ok(())
}

/// `RUST_LOG` when set, `default_level` otherwise.
pub fn init_tracing_with_default_env_filter(
    config: &TracingConfig,
    default_level: Level,
) -> Result<(), TracingInitError> {
    init_tracing(config, |_| {
        Box::new(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(default_level).into())
                .from_env_lossy(),
        )
    })
}

pub fn init_tracing_with_default_debug_env_filter(
    config: &TracingConfig,
) -> Result<(), TracingInitError> {
    init_tracing_with_default_env_filter(config, Level::DEBUG)
}

fn make_layer<W>(
    config: &OutputConfig,
    filter: Box<dyn Filter<Registry> + 'static + Send + Sync>,
    writer: W,
) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + 'static + Send + Sync,
{
    let span_events = {
        if config.span_full {
            FmtSpan::FULL
        } else if config.span_active {
            FmtSpan::ACTIVE
        } else {
            FmtSpan::NONE
        }
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_writer(writer);

    match (config.json, config.without_time) {
        (true, true) => layer
            .json()
            .flatten_event(config.json_flatten)
            .without_time()
            .with_filter(filter)
            .boxed(),
        (true, false) => layer
            .json()
            .flatten_event(config.json_flatten)
            .with_filter(filter)
            .boxed(),
        (false, true) => layer
            .with_ansi(config.ansi)
            .without_time()
            .with_filter(filter)
            .boxed(),
        (false, false) => layer.with_ansi(config.ansi).with_filter(filter).boxed(),
    }
}
