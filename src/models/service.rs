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

use crate::models::image::same_image_reference;
use crate::models::{labels, AppId};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

/// A single container definition belonging to an app, identified by
/// (`app_id`, `service_name`, `release_id`). Current-state services carry the
/// id of their engine container; target-state services do not.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub app_id: AppId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_uuid: Option<String>,
    pub service_id: u32,
    pub service_name: String,
    pub release_id: u32,
    pub image_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub status: ServiceStatus,
    #[serde(skip)]
    pub created_at: Option<DateTime<Utc>>,
    pub config: ServiceConfig,
}

impl Service {
    /// Adopts a compose service entry as a target-state service. The
    /// container comes later, once a `start` step has been executed.
    pub fn from_compose_object(
        app_id: AppId,
        app_uuid: Option<String>,
        service_name: String,
        service_id: u32,
        image_id: u32,
        release_id: u32,
        config: ServiceConfig,
    ) -> Self {
        Self {
            app_id,
            app_uuid,
            service_id,
            service_name,
            release_id,
            image_id,
            container_id: None,
            status: ServiceStatus::Installing,
            created_at: None,
            config,
        }
    }

    pub fn depends_on(&self) -> &[String] {
        &self.config.depends_on
    }

    pub fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::from_labels(&self.config.labels)
    }

    /// Upper bound on the old/new overlap during a hand-over, taken from the
    /// `io.balena.update.handover-timeout` label.
    pub fn handover_timeout(&self) -> Duration {
        self.config
            .labels
            .get(labels::HANDOVER_TIMEOUT)
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }

    /// Named volumes this service mounts. Bind mounts (host paths) are not
    /// volumes and do not participate in volume liveness rules.
    pub fn referenced_volumes(&self) -> Vec<&str> {
        self.config
            .volumes
            .iter()
            .filter_map(|entry| {
                let name = entry.split(':').next()?;
                if name.is_empty() || name.starts_with('/') || name.starts_with('.') {
                    None
                } else {
                    Some(name)
                }
            })
            .collect()
    }

    /// Networks this service joins. A service that declares none joins the
    /// app's `default` network.
    pub fn referenced_networks(&self) -> Vec<&str> {
        if self.config.networks.is_empty() {
            vec!["default"]
        } else {
            self.config.networks.keys().map(String::as_str).collect()
        }
    }

    pub fn references_volume(&self, name: &str) -> bool {
        self.referenced_volumes().contains(&name)
    }

    pub fn references_network(&self, name: &str) -> bool {
        self.referenced_networks().contains(&name)
    }
}

/// Declarative container configuration in the shape of a compose service
/// entry. This is the payload diffed by the planner.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub image: String,
    #[serde(default = "default_running")]
    pub running: bool,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkAttachment>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub restart: RestartPolicy,
}

fn default_running() -> bool {
    true
}

impl ServiceConfig {
    pub fn new(image: String) -> Self {
        Self {
            image,
            running: true,
            privileged: false,
            environment: BTreeMap::new(),
            labels: BTreeMap::new(),
            volumes: Vec::new(),
            networks: BTreeMap::new(),
            depends_on: Vec::new(),
            command: None,
            restart: RestartPolicy::default(),
        }
    }

    /// Structural equality of everything the engine would have to recreate a
    /// container for, with `self` being the observed config and `declared`
    /// the target one. Agent-owned labels, the `running` flag, and release
    /// metadata are ignored; images compare by reference equivalence so that
    /// `nginx:latest` and `docker.io/library/nginx:latest` do not register as
    /// a material change. Environment variables, labels, and the command are
    /// only compared where the declared config pins them, since the engine
    /// reports image-defined values on running containers as well.
    pub fn is_equal_except_for_running_and_release(&self, declared: &Self) -> bool {
        if !same_image_reference(&self.image, &declared.image) {
            return false;
        }

        let mut observed = self.comparable();
        let mut target = declared.comparable();
        observed.running = target.running;
        observed.image = String::new();
        target.image = String::new();

        observed.environment = observed
            .environment
            .into_iter()
            .filter(|(key, _)| target.environment.contains_key(key))
            .collect();
        observed.labels = observed
            .labels
            .into_iter()
            .filter(|(key, _)| target.labels.contains_key(key))
            .collect();
        if target.command.is_none() {
            observed.command = None;
        }

        observed == target
    }

    pub fn is_equal_config(&self, declared: &Self) -> bool {
        self.running == declared.running && self.is_equal_except_for_running_and_release(declared)
    }

    fn comparable(&self) -> Self {
        let mut config = self.clone();
        config.labels = labels::without_supervised_labels(&self.labels);
        config
    }
}

/// Per-network attachment options of a service.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachment {
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum RestartPolicy {
    #[serde(rename = "no")]
    No,
    #[default]
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "on-failure")]
    OnFailure,
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
}

impl FromStr for RestartPolicy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" | "" => Ok(RestartPolicy::No),
            "always" => Ok(RestartPolicy::Always),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            policy => Err(ServiceError::InvalidServiceConfiguration {
                reason: format!("unknown restart policy {policy:?}"),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
    Installing,
    Installed,
    Running,
    Stopping,
    Stopped,
    Dead,
    Handover,
}

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ServiceStatus::Installing => write!(f, "installing"),
            ServiceStatus::Installed => write!(f, "installed"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Stopping => write!(f, "stopping"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Dead => write!(f, "dead"),
            ServiceStatus::Handover => write!(f, "handover"),
        }
    }
}

/// Ordering of kill, fetch, and start when a service has a material config
/// change (see the `io.balena.update.strategy` label).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UpdateStrategy {
    #[default]
    DownloadThenKill,
    KillThenDownload,
    DeleteThenDownload,
    Handover,
}

impl UpdateStrategy {
    /// Reads the strategy label, falling back to the default for unknown
    /// values. Each unknown value is logged once per process.
    pub fn from_labels(service_labels: &BTreeMap<String, String>) -> Self {
        match service_labels.get(labels::UPDATE_STRATEGY) {
            None => UpdateStrategy::default(),
            Some(value) => match UpdateStrategy::from_str(value) {
                Ok(strategy) => strategy,
                Err(_) => {
                    lazy_static! {
                        static ref WARNED: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
                    }
                    if WARNED.lock().unwrap().insert(value.clone()) {
                        log::warn!(
                            "Unknown update strategy {value:?}, falling back to download-then-kill."
                        );
                    }
                    UpdateStrategy::default()
                }
            },
        }
    }
}

impl FromStr for UpdateStrategy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download-then-kill" => Ok(UpdateStrategy::DownloadThenKill),
            "kill-then-download" => Ok(UpdateStrategy::KillThenDownload),
            "delete-then-download" => Ok(UpdateStrategy::DeleteThenDownload),
            "hand-over" => Ok(UpdateStrategy::Handover),
            label => Err(ServiceError::UnknownUpdateStrategy {
                label: String::from(label),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ServiceError {
    #[error("Unknown update strategy label: {label}")]
    UnknownUpdateStrategy { label: String },
    #[error("Invalid service configuration: {reason}")]
    InvalidServiceConfiguration { reason: String },
}

/// Builds a target-state service fixture.
#[cfg(test)]
#[macro_export]
macro_rules! svc {
    ( $app_id:expr, $name:expr ) => {
        $crate::svc!($app_id, $name, image = concat!($name, "-image"))
    };

    ( $app_id:expr, $name:expr, image = $image:expr ) => {{
        use $crate::models::{AppId, Service, ServiceConfig, ServiceStatus};
        Service {
            app_id: AppId::from($app_id),
            app_uuid: None,
            service_id: 1,
            service_name: String::from($name),
            release_id: 1,
            image_id: 1,
            container_id: None,
            status: ServiceStatus::Installing,
            created_at: None,
            config: ServiceConfig::new(String::from($image)),
        }
    }};

    ( $app_id:expr, $name:expr, depends_on = [$($dependency:expr),*] ) => {{
        let mut service = $crate::svc!($app_id, $name);
        service.config.depends_on = vec![$(String::from($dependency)),*];
        service
    }};

    ( $app_id:expr, $name:expr, labels = ($($key:expr => $value:expr),*) ) => {{
        let mut service = $crate::svc!($app_id, $name);
        $( service.config.labels.insert(String::from($key), String::from($value)); )*
        service
    }};
}

#[cfg(test)]
impl Service {
    /// Turns a fixture into its observed current-state twin.
    pub fn observed(mut self, container_id: &str, status: ServiceStatus) -> Self {
        self.container_id = Some(String::from(container_id));
        self.status = status;
        self
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.config.image = String::from(image);
        self
    }

    pub fn with_release(mut self, release_id: u32, image_id: u32) -> Self {
        self.release_id = release_id;
        self.image_id = image_id;
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.config.labels.insert(String::from(key), String::from(value));
        self
    }

    pub fn with_volumes(mut self, volumes: &[&str]) -> Self {
        self.config.volumes = volumes.iter().map(|v| String::from(*v)).collect();
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.config.running = running;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_ignore_supervised_labels_in_config_comparison() {
        let plain = crate::svc!(1013, "api");
        let labelled = crate::svc!(1013, "api")
            .with_label(labels::SERVICE_NAME, "api")
            .with_label(labels::RELEASE_ID, "7");

        assert!(plain
            .config
            .is_equal_except_for_running_and_release(&labelled.config));
    }

    #[test]
    fn should_ignore_running_flag_in_material_comparison() {
        let running = crate::svc!(1013, "api");
        let stopped = crate::svc!(1013, "api").with_running(false);

        assert!(running
            .config
            .is_equal_except_for_running_and_release(&stopped.config));
        assert!(!running.config.is_equal_config(&stopped.config));
    }

    #[test]
    fn should_treat_normalized_image_references_as_equal() {
        let short = crate::svc!(1013, "api", image = "nginx");
        let qualified = crate::svc!(1013, "api", image = "docker.io/library/nginx:latest");

        assert!(short
            .config
            .is_equal_except_for_running_and_release(&qualified.config));
    }

    #[test]
    fn should_detect_material_image_change() {
        let one = crate::svc!(1013, "api", image = "api-image");
        let two = crate::svc!(1013, "api", image = "api-image-2");

        assert!(!one
            .config
            .is_equal_except_for_running_and_release(&two.config));
    }

    #[test]
    fn should_detect_material_environment_change() {
        let observed = crate::svc!(1013, "api");
        let mut declared = crate::svc!(1013, "api");
        declared
            .config
            .environment
            .insert(String::from("LOG_LEVEL"), String::from("info"));

        assert!(!observed
            .config
            .is_equal_except_for_running_and_release(&declared.config));
    }

    #[test]
    fn should_tolerate_image_defined_environment_on_observed_side() {
        let mut observed = crate::svc!(1013, "api");
        observed
            .config
            .environment
            .insert(String::from("NGINX_VERSION"), String::from("1.27.1"));
        let declared = crate::svc!(1013, "api");

        assert!(observed
            .config
            .is_equal_except_for_running_and_release(&declared.config));
    }

    #[test]
    fn should_detect_declared_environment_value_change() {
        let mut observed = crate::svc!(1013, "api");
        observed
            .config
            .environment
            .insert(String::from("LOG_LEVEL"), String::from("info"));
        let mut declared = crate::svc!(1013, "api");
        declared
            .config
            .environment
            .insert(String::from("LOG_LEVEL"), String::from("debug"));

        assert!(!observed
            .config
            .is_equal_except_for_running_and_release(&declared.config));
    }

    #[test]
    fn should_fall_back_to_default_strategy_for_unknown_label() {
        let service = crate::svc!(
            1013,
            "api",
            labels = (labels::UPDATE_STRATEGY => "blue-green")
        );

        assert_eq!(service.update_strategy(), UpdateStrategy::DownloadThenKill);
    }

    #[test]
    fn should_parse_recognized_strategies() {
        assert_eq!(
            UpdateStrategy::from_str("kill-then-download"),
            Ok(UpdateStrategy::KillThenDownload)
        );
        assert_eq!(
            UpdateStrategy::from_str("hand-over"),
            Ok(UpdateStrategy::Handover)
        );
        assert_eq!(
            UpdateStrategy::from_str("blue-green"),
            Err(ServiceError::UnknownUpdateStrategy {
                label: String::from("blue-green")
            })
        );
    }

    #[test]
    fn should_list_named_volumes_only() {
        let service =
            crate::svc!(1013, "api").with_volumes(&["data:/var/lib/data", "/etc/ssl:/ssl:ro"]);

        assert_eq!(service.referenced_volumes(), vec!["data"]);
        assert!(service.references_volume("data"));
        assert!(!service.references_volume("/etc/ssl"));
    }

    #[test]
    fn should_join_default_network_when_none_declared() {
        let service = crate::svc!(1013, "api");

        assert_eq!(service.referenced_networks(), vec!["default"]);
    }

    #[test]
    fn should_read_handover_timeout_label() {
        let service = crate::svc!(
            1013,
            "api",
            labels = (labels::HANDOVER_TIMEOUT => "120")
        );

        assert_eq!(service.handover_timeout(), Duration::from_secs(120));
    }
}
