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

use crate::models::{labels, parse_scoped_name, AppId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_NETWORK: &str = "default";
pub const SUPERVISOR_NETWORK: &str = "supervisor0";

/// A named bridge owned by one app. On the engine the network is named
/// `<appId>_<name>`; the host-scope supervising bridge is the one exception
/// and keeps its bare name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub app_id: AppId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_uuid: Option<String>,
    pub name: String,
    pub config: NetworkConfig,
}

impl Network {
    /// Validates and adopts a compose network entry for the given app.
    pub fn from_compose_object(
        app_id: AppId,
        app_uuid: Option<String>,
        name: String,
        config: NetworkConfig,
    ) -> Result<Self, NetworkError> {
        config.validate(&name)?;
        Ok(Self {
            app_id,
            app_uuid,
            name,
            config,
        })
    }

    /// The `default` network every app with services is guaranteed to have.
    pub fn default_for_app(app_id: AppId, app_uuid: Option<String>) -> Self {
        Self {
            app_id,
            app_uuid,
            name: String::from(DEFAULT_NETWORK),
            config: NetworkConfig::default(),
        }
    }

    /// The host-scope bridge this agent keeps alive for its own containers.
    pub fn supervisor_bridge() -> Self {
        Self {
            app_id: AppId::HOST,
            app_uuid: None,
            name: String::from(SUPERVISOR_NETWORK),
            config: NetworkConfig {
                ipam: IpamConfig {
                    driver: None,
                    configs: vec![IpamPool {
                        subnet: Some(String::from("10.114.104.0/25")),
                        gateway: Some(String::from("10.114.104.1")),
                        ip_range: None,
                        aux_addresses: BTreeMap::new(),
                    }],
                    options: BTreeMap::new(),
                },
                ..NetworkConfig::default()
            },
        }
    }

    pub fn parse_engine_name(engine_name: &str) -> Result<(AppId, String), NetworkError> {
        parse_scoped_name(engine_name).ok_or_else(|| NetworkError::InvalidNetworkName {
            name: engine_name.to_string(),
        })
    }

    pub fn engine_name(&self) -> String {
        if self.app_id.is_host_scope() {
            self.name.clone()
        } else {
            format!("{}_{}", self.app_id, self.name)
        }
    }

    /// The labels written to the engine object: the user's labels plus the
    /// ownership markers.
    pub fn engine_labels(&self) -> BTreeMap<String, String> {
        let mut engine_labels = self.config.labels.clone();
        engine_labels.insert(String::from(labels::SUPERVISED), String::from("true"));
        if let Some(app_uuid) = &self.app_uuid {
            engine_labels.insert(String::from(labels::APP_UUID), app_uuid.clone());
        }
        engine_labels
    }

    /// Config equality with `self` being the observed network and `declared`
    /// the target one. Details the declaration leaves open and the engine
    /// fills in on its own (ipam driver, address pools, driver options) are
    /// not compared.
    pub fn is_equal_config(&self, declared: &Self) -> bool {
        let mut observed = self.config.comparable();
        let target = declared.config.comparable();

        if target.ipam.driver.is_none() {
            observed.ipam.driver = None;
        }
        if target.ipam.configs.is_empty() {
            observed.ipam.configs.clear();
        }
        if target.ipam.options.is_empty() {
            observed.ipam.options.clear();
        }
        observed.options = observed
            .options
            .into_iter()
            .filter(|(key, _)| target.options.contains_key(key))
            .collect();
        observed.labels = observed
            .labels
            .into_iter()
            .filter(|(key, _)| target.labels.contains_key(key))
            .collect();

        observed == target
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub ipam: IpamConfig,
    #[serde(default)]
    pub enable_ipv6: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_driver() -> String {
    String::from("bridge")
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            ipam: IpamConfig::default(),
            enable_ipv6: false,
            internal: false,
            labels: BTreeMap::new(),
            options: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    fn validate(&self, name: &str) -> Result<(), NetworkError> {
        for pool in &self.ipam.configs {
            if pool.subnet.is_none() || pool.gateway.is_none() {
                return Err(NetworkError::InvalidNetworkConfiguration {
                    name: name.to_string(),
                    reason: String::from("every ipam entry needs both subnet and gateway"),
                });
            }
        }
        Ok(())
    }

    fn comparable(&self) -> Self {
        let mut config = self.clone();
        config.labels = labels::without_supervised_labels(&self.labels);
        config
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default)]
    pub configs: Vec<IpamPool>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamPool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    #[serde(default)]
    pub aux_addresses: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NetworkError {
    #[error("Network name {name:?} does not match the <appId>_<name> form.")]
    InvalidNetworkName { name: String },
    #[error("Invalid configuration of network {name}: {reason}")]
    InvalidNetworkConfiguration { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_scope_engine_name_by_app_id() {
        let network = Network::default_for_app(AppId::from(1013), None);

        assert_eq!(network.engine_name(), "1013_default");
        assert_eq!(
            Network::parse_engine_name("1013_default").unwrap(),
            (AppId::from(1013), String::from("default"))
        );
    }

    #[test]
    fn should_keep_bare_name_for_supervisor_bridge() {
        assert_eq!(Network::supervisor_bridge().engine_name(), "supervisor0");
    }

    #[test]
    fn should_reject_unscoped_engine_name() {
        assert_eq!(
            Network::parse_engine_name("backend").unwrap_err(),
            NetworkError::InvalidNetworkName {
                name: String::from("backend")
            }
        );
    }

    #[test]
    fn should_reject_ipam_pool_without_gateway() {
        let config = NetworkConfig {
            ipam: IpamConfig {
                configs: vec![IpamPool {
                    subnet: Some(String::from("172.20.0.0/16")),
                    gateway: None,
                    ip_range: None,
                    aux_addresses: BTreeMap::new(),
                }],
                ..IpamConfig::default()
            },
            ..NetworkConfig::default()
        };

        let result =
            Network::from_compose_object(AppId::from(1013), None, String::from("backend"), config);

        assert_eq!(
            result.unwrap_err(),
            NetworkError::InvalidNetworkConfiguration {
                name: String::from("backend"),
                reason: String::from("every ipam entry needs both subnet and gateway"),
            }
        );
    }

    #[test]
    fn should_mark_engine_objects_as_supervised() {
        let network = Network::default_for_app(
            AppId::from(1013),
            Some(String::from("deadbeef")),
        );

        let engine_labels = network.engine_labels();

        assert_eq!(
            engine_labels.get(labels::SUPERVISED),
            Some(&String::from("true"))
        );
        assert_eq!(
            engine_labels.get(labels::APP_UUID),
            Some(&String::from("deadbeef"))
        );
    }

    #[test]
    fn should_ignore_supervised_labels_when_comparing_configs() {
        let mut observed = Network::default_for_app(AppId::from(1013), None);
        observed
            .config
            .labels
            .insert(String::from(labels::SUPERVISED), String::from("true"));
        let declared = Network::default_for_app(AppId::from(1013), None);

        assert!(observed.is_equal_config(&declared));
    }

    #[test]
    fn should_ignore_engine_assigned_ipam_details() {
        let mut observed = Network::default_for_app(AppId::from(1013), None);
        observed.config.ipam.driver = Some(String::from("default"));
        observed.config.ipam.configs.push(IpamPool {
            subnet: Some(String::from("172.17.32.0/24")),
            gateway: Some(String::from("172.17.32.1")),
            ip_range: None,
            aux_addresses: BTreeMap::new(),
        });
        let declared = Network::default_for_app(AppId::from(1013), None);

        assert!(observed.is_equal_config(&declared));
    }

    #[test]
    fn should_detect_config_change() {
        let mut declared = Network::default_for_app(AppId::from(1013), None);
        declared
            .config
            .labels
            .insert(String::from("com.example.zone"), String::from("dmz"));
        let observed = Network::default_for_app(AppId::from(1013), None);

        assert!(!observed.is_equal_config(&declared));
    }
}
