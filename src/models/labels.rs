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

//! The label contract shared with the container engine. Objects carrying
//! [`SUPERVISED`]` = "true"` are owned by this agent; everything else on the
//! engine is ignored.

use std::collections::BTreeMap;

pub const SUPERVISED: &str = "io.balena.supervised";
pub const APP_ID: &str = "io.balena.app-id";
pub const APP_UUID: &str = "io.balena.app-uuid";
pub const SERVICE_NAME: &str = "io.balena.service-name";
pub const SERVICE_ID: &str = "io.balena.service-id";
pub const RELEASE_ID: &str = "io.balena.release-id";
pub const IMAGE_ID: &str = "io.balena.image-id";
pub const DEPENDS_ON: &str = "io.balena.depends-on";
pub const UPDATE_STRATEGY: &str = "io.balena.update.strategy";
pub const HANDOVER_TIMEOUT: &str = "io.balena.update.handover-timeout";

const OWNED_PREFIX: &str = "io.balena.";

pub fn is_supervised_label(key: &str) -> bool {
    key.starts_with(OWNED_PREFIX)
}

/// Strips all agent-owned labels. Every config equality predicate compares
/// labels through this one function so that the set of ignored keys cannot
/// drift between Service, Network, and Volume.
pub fn without_supervised_labels(
    labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    labels
        .iter()
        .filter(|(key, _)| !is_supervised_label(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
