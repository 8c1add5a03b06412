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

/// A named volume owned by one app, named `<appId>_<name>` on the engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub app_id: AppId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_uuid: Option<String>,
    pub name: String,
    pub config: VolumeConfig,
}

impl Volume {
    pub fn from_compose_object(
        app_id: AppId,
        app_uuid: Option<String>,
        name: String,
        config: VolumeConfig,
    ) -> Self {
        Self {
            app_id,
            app_uuid,
            name,
            config,
        }
    }

    pub fn parse_engine_name(engine_name: &str) -> Result<(AppId, String), VolumeError> {
        parse_scoped_name(engine_name).ok_or_else(|| VolumeError::InvalidVolumeName {
            name: engine_name.to_string(),
        })
    }

    pub fn engine_name(&self) -> String {
        format!("{}_{}", self.app_id, self.name)
    }

    pub fn engine_labels(&self) -> BTreeMap<String, String> {
        let mut engine_labels = self.config.labels.clone();
        engine_labels.insert(String::from(labels::SUPERVISED), String::from("true"));
        if let Some(app_uuid) = &self.app_uuid {
            engine_labels.insert(String::from(labels::APP_UUID), app_uuid.clone());
        }
        engine_labels
    }

    pub fn is_equal_config(&self, other: &Self) -> bool {
        self.config.comparable() == other.config.comparable()
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_driver() -> String {
    String::from("local")
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            driver_opts: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl VolumeConfig {
    fn comparable(&self) -> Self {
        let mut config = self.clone();
        config.labels = labels::without_supervised_labels(&self.labels);
        config
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VolumeError {
    #[error("Volume name {name:?} does not match the <appId>_<name> form.")]
    InvalidVolumeName { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_round_trip_engine_name() {
        let volume = Volume::from_compose_object(
            AppId::from(1013),
            None,
            String::from("data"),
            VolumeConfig::default(),
        );

        assert_eq!(volume.engine_name(), "1013_data");
        assert_eq!(
            Volume::parse_engine_name("1013_data").unwrap(),
            (AppId::from(1013), String::from("data"))
        );
    }

    #[test]
    fn should_reject_unscoped_engine_name() {
        assert_eq!(
            Volume::parse_engine_name("data").unwrap_err(),
            VolumeError::InvalidVolumeName {
                name: String::from("data")
            }
        );
    }

    #[test]
    fn should_detect_label_change_as_config_change() {
        let observed = Volume::from_compose_object(
            AppId::from(1013),
            None,
            String::from("data"),
            VolumeConfig::default(),
        );
        let mut declared = observed.clone();
        declared
            .config
            .labels
            .insert(String::from("com.example.backup"), String::from("daily"));

        assert!(!observed.is_equal_config(&declared));
    }

    #[test]
    fn should_ignore_supervised_labels_in_comparison() {
        let mut observed = Volume::from_compose_object(
            AppId::from(1013),
            None,
            String::from("data"),
            VolumeConfig::default(),
        );
        observed
            .config
            .labels
            .insert(String::from(labels::SUPERVISED), String::from("true"));
        let declared = Volume::from_compose_object(
            AppId::from(1013),
            None,
            String::from("data"),
            VolumeConfig::default(),
        );

        assert!(observed.is_equal_config(&declared));
    }
}
