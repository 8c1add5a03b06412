/*-
 * ========================LICENSE_START=================================
 * Steward
 * %%
 * Copyright (C) 2024 - 2026 The Steward Authors
 * %%
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
 * THE SOFTWARE.
 * =========================LICENSE_END==================================
 */

use crate::supervisor::ReconcileSettings;
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::value::{Dict, Map, Tag, Value};
use figment::{Metadata, Profile};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Default, Parser)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Sets a custom config file
    #[clap(short, long, value_parser, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path of the persisted target state document
    #[clap(short, long, value_name = "FILE")]
    target_state: Option<PathBuf>,

    /// Unix socket of the container engine
    #[clap(long, value_name = "SOCKET")]
    engine_socket: Option<PathBuf>,

    /// Keeps apps and images that are unknown to the target state
    #[clap(long)]
    local_mode: bool,
}

impl figment::Provider for CliArgs {
    fn metadata(&self) -> Metadata {
        Metadata::named("cli arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        let mut dict = Dict::new();

        if let Some(target_state) = &self.target_state {
            dict.insert(
                String::from("targetStateFile"),
                Value::String(Tag::Default, target_state.display().to_string()),
            );
        }

        if let Some(engine_socket) = &self.engine_socket {
            dict.insert(
                String::from("engine"),
                figment::util::nest(
                    "socket",
                    Value::String(Tag::Default, engine_socket.display().to_string()),
                ),
            );
        }

        if self.local_mode {
            dict.insert(String::from("localMode"), Value::from(true));
        }

        let mut data = Map::new();
        data.insert(Profile::Default, dict);

        Ok(data)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    reconcile: ReconcileConfig,
    #[serde(default)]
    local_mode: bool,
    #[serde(default = "default_target_state_file")]
    target_state_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            reconcile: ReconcileConfig::default(),
            local_mode: false,
            target_state_file: default_target_state_file(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_engine_socket")]
    socket: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket: default_engine_socket(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    #[serde(default = "default_interval_seconds")]
    interval_seconds: u64,
    #[serde(default = "default_backoff_min_seconds")]
    backoff_min_seconds: u64,
    #[serde(default = "default_backoff_max_seconds")]
    backoff_max_seconds: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            backoff_min_seconds: default_backoff_min_seconds(),
            backoff_max_seconds: default_backoff_max_seconds(),
        }
    }
}

fn default_engine_socket() -> PathBuf {
    PathBuf::from_str("/var/run/docker.sock").unwrap()
}

fn default_target_state_file() -> PathBuf {
    PathBuf::from_str("/var/lib/steward/target-state.json").unwrap()
}

fn default_interval_seconds() -> u64 {
    15
}

fn default_backoff_min_seconds() -> u64 {
    1
}

fn default_backoff_max_seconds() -> u64 {
    300
}

impl Config {
    pub fn from_figment(cli: &CliArgs) -> Result<Self, figment::Error> {
        figment::Figment::new()
            .merge(Toml::file(
                cli.config
                    .as_ref()
                    .unwrap_or(&PathBuf::from_str("steward.toml").unwrap()),
            ))
            .merge(Env::prefixed("STEWARD_").split("_"))
            .merge(cli)
            .extract::<Config>()
    }

    pub fn engine_socket(&self) -> &PathBuf {
        &self.engine.socket
    }

    pub fn target_state_file(&self) -> &PathBuf {
        &self.target_state_file
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            interval: Duration::from_secs(self.reconcile.interval_seconds),
            backoff_min: Duration::from_secs(self.reconcile.backoff_min_seconds),
            backoff_max: Duration::from_secs(self.reconcile.backoff_max_seconds),
            local_mode: self.local_mode,
            ..ReconcileSettings::default()
        }
    }
}
