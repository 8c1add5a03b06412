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

pub use app::{parse_scoped_name, App, AppError, AppId};
pub use image::{same_image_reference, Image, ImageError, ImageName, ImageStatus};
pub use network::{
    IpamConfig, IpamPool, Network, NetworkConfig, NetworkError, DEFAULT_NETWORK,
    SUPERVISOR_NETWORK,
};
pub use service::{
    NetworkAttachment, RestartPolicy, Service, ServiceConfig, ServiceError, ServiceStatus,
    UpdateStrategy,
};
pub use volume::{Volume, VolumeConfig, VolumeError};

mod app;
mod image;
pub mod labels;
mod network;
#[cfg_attr(test, macro_use)]
mod service;
mod volume;
