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

use crate::models::{Network, Service, Volume};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::str::FromStr;

/// Numeric identifier of an app. App id `0` is reserved for host-scope
/// objects such as the supervising bridge network, which serialize to the
/// engine without the `<appId>_` prefix.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct AppId(u32);

impl AppId {
    pub const HOST: AppId = AppId(0);

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_host_scope(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for AppId {
    fn from(id: u32) -> Self {
        AppId(id)
    }
}

impl FromStr for AppId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.parse::<u32>() {
            Ok(id) if id > 0 => Ok(AppId(id)),
            _ => Err(AppError::InvalidAppId {
                value: value.to_string(),
            }),
        }
    }
}

impl Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

lazy_static! {
    static ref SCOPED_NAME_REGEX: Regex = Regex::new(r"^([0-9]+)_(.+)$").unwrap();
}

/// Splits an engine object name of the form `<appId>_<name>` into its parts.
/// Networks and volumes created by this agent round-trip through this parser.
pub fn parse_scoped_name(engine_name: &str) -> Option<(AppId, String)> {
    let captures = SCOPED_NAME_REGEX.captures(engine_name)?;
    let app_id = AppId::from_str(captures.get(1)?.as_str()).ok()?;
    Some((app_id, captures.get(2)?.as_str().to_string()))
}

/// The unit of deployment: the services, networks, and volumes under one app
/// id. An `App` is an immutable snapshot, either of the observed engine state
/// or of the declared target state, discriminated by `is_target`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct App {
    app_id: AppId,
    app_uuid: Option<String>,
    services: Vec<Service>,
    networks: BTreeMap<String, Network>,
    volumes: BTreeMap<String, Volume>,
    is_target: bool,
}

impl App {
    pub fn current(
        app_id: AppId,
        app_uuid: Option<String>,
        services: Vec<Service>,
        networks: BTreeMap<String, Network>,
        volumes: BTreeMap<String, Volume>,
    ) -> Self {
        Self::new(app_id, app_uuid, services, networks, volumes, false)
    }

    /// Builds a target-state app and validates the declared composition:
    /// service names must be unique and `depends_on` references must resolve
    /// to siblings without forming a cycle. A cyclic target is rejected here
    /// rather than being allowed to stall reconciliation forever.
    pub fn target(
        app_id: AppId,
        app_uuid: Option<String>,
        services: Vec<Service>,
        networks: BTreeMap<String, Network>,
        volumes: BTreeMap<String, Volume>,
    ) -> Result<Self, AppError> {
        let mut seen = HashSet::new();
        for service in &services {
            if !seen.insert(service.service_name.as_str()) {
                return Err(AppError::DuplicateServiceName {
                    app_id,
                    service_name: service.service_name.clone(),
                });
            }
        }

        for service in &services {
            for dependency in service.depends_on() {
                if !seen.contains(dependency.as_str()) {
                    return Err(AppError::UnresolvedDependency {
                        app_id,
                        service_name: service.service_name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        assert_acyclic(app_id, &services)?;

        Ok(Self::new(app_id, app_uuid, services, networks, volumes, true))
    }

    fn new(
        app_id: AppId,
        app_uuid: Option<String>,
        services: Vec<Service>,
        networks: BTreeMap<String, Network>,
        volumes: BTreeMap<String, Volume>,
        is_target: bool,
    ) -> Self {
        let mut services = services;
        services.sort_by(|service1, service2| {
            service1
                .service_name
                .cmp(&service2.service_name)
                .then(service1.release_id.cmp(&service2.release_id))
        });

        Self {
            app_id,
            app_uuid,
            services,
            networks,
            volumes,
            is_target,
        }
    }

    /// An observed app with no services or resources yet, used as the diff
    /// counterpart when a target app has no current-state twin.
    pub fn none_observed(target: &App) -> Self {
        Self {
            app_id: target.app_id,
            app_uuid: target.app_uuid.clone(),
            services: Vec::new(),
            networks: BTreeMap::new(),
            volumes: BTreeMap::new(),
            is_target: false,
        }
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn app_uuid(&self) -> Option<&String> {
        self.app_uuid.as_ref()
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn networks(&self) -> &BTreeMap<String, Network> {
        &self.networks
    }

    pub fn volumes(&self) -> &BTreeMap<String, Volume> {
        &self.volumes
    }

    pub fn is_target(&self) -> bool {
        self.is_target
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.networks.is_empty() && self.volumes.is_empty()
    }

    /// All services with the given name. During a hand-over window two
    /// releases of the same service legitimately coexist in current state, so
    /// this returns an iterator rather than an `Option`.
    pub fn services_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Service> {
        self.services
            .iter()
            .filter(move |service| service.service_name == name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        let mut names = self
            .services
            .iter()
            .map(|service| service.service_name.as_str())
            .collect::<Vec<_>>();
        names.dedup();
        names
    }
}

fn assert_acyclic(app_id: AppId, services: &[Service]) -> Result<(), AppError> {
    let mut remaining: BTreeMap<&str, &[String]> = services
        .iter()
        .map(|service| (service.service_name.as_str(), service.depends_on()))
        .collect();

    loop {
        let resolvable = remaining
            .iter()
            .filter(|(_, deps)| {
                deps.iter()
                    .all(|dependency| !remaining.contains_key(dependency.as_str()))
            })
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();

        if resolvable.is_empty() {
            break;
        }
        for name in resolvable {
            remaining.remove(name);
        }
    }

    if remaining.is_empty() {
        Ok(())
    } else {
        let mut cycle = remaining
            .keys()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        cycle.sort();
        Err(AppError::DependencyCycle { app_id, cycle })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AppError {
    #[error("Invalid app id: {value:?} is not a positive integer.")]
    InvalidAppId { value: String },
    #[error("Service {service_name} appears more than once in app {app_id}.")]
    DuplicateServiceName {
        app_id: AppId,
        service_name: String,
    },
    #[error(
        "Service {service_name} of app {app_id} depends on {dependency} which is not part of the app."
    )]
    UnresolvedDependency {
        app_id: AppId,
        service_name: String,
        dependency: String,
    },
    #[error("The services {cycle:?} of app {app_id} form a dependency cycle.")]
    DependencyCycle { app_id: AppId, cycle: Vec<String> },
}
