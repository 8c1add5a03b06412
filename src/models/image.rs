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

use crate::models::{AppId, Service};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One entry of the local image inventory: what has been (or is being)
/// fetched for which service of which release.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub image_id: u32,
    pub app_id: AppId,
    pub service_id: u32,
    pub service_name: String,
    pub release_id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image_id: Option<String>,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<u8>,
}

impl Image {
    /// Synthesizes the descriptor a `fetch` step carries for a target
    /// service.
    pub fn for_service(service: &Service) -> Result<Self, ImageError> {
        if service.config.image.is_empty() {
            return Err(ImageError::ImageNotFound {
                service_name: service.service_name.clone(),
            });
        }

        Ok(Self {
            image_id: service.image_id,
            app_id: service.app_id,
            service_id: service.service_id,
            service_name: service.service_name.clone(),
            release_id: service.release_id,
            name: service.config.image.clone(),
            docker_image_id: None,
            status: ImageStatus::Downloading,
            download_progress: None,
        })
    }

    /// Whether this inventory entry satisfies the image the given service is
    /// configured with, either by content digest or by reference equivalence.
    pub fn matches_service(&self, service: &Service) -> bool {
        if let Some(docker_image_id) = &self.docker_image_id {
            if digest_eq(docker_image_id, &service.config.image) {
                return true;
            }
        }
        same_image_reference(&self.name, &service.config.image)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageStatus {
    Downloading,
    Downloaded,
    Deleting,
}

/// A parsed registry reference. `Named` covers `repo`, `repo:tag`,
/// `registry/user/repo:tag`, and `repo@sha256:…` forms; `Id` covers bare
/// content digests as the engine reports them.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ImageName {
    Named {
        registry: Option<String>,
        repository: String,
        tag: Option<String>,
        digest: Option<String>,
    },
    Id {
        hash: String,
    },
}

impl ImageName {
    /// `repository:tag` with the registry prefix and the implicit `library/`
    /// namespace stripped and the default tag made explicit. Two named
    /// references to the same image compare equal on this form.
    pub fn canonical(&self) -> Option<String> {
        match self {
            ImageName::Id { .. } => None,
            ImageName::Named {
                repository, tag, ..
            } => {
                let repository = repository.strip_prefix("library/").unwrap_or(repository);
                Some(format!("{}:{}", repository, tag.as_deref().unwrap_or("latest")))
            }
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            ImageName::Id { hash } => Some(hash),
            ImageName::Named { digest, .. } => digest.as_deref(),
        }
    }

    /// Reference equivalence: canonical forms match, or either side's digest
    /// appears in the other.
    pub fn same_image(&self, other: &Self) -> bool {
        if let (Some(own), Some(others)) = (self.canonical(), other.canonical()) {
            if own == others {
                return true;
            }
        }

        match (self.digest(), other.digest()) {
            (Some(own), Some(others)) => digest_eq(own, others),
            _ => false,
        }
    }
}

lazy_static! {
    static ref IMAGE_ID_REGEX: Regex = Regex::new(r"^(sha256:)?(?P<id>[a-fA-F0-9]{12,64})$").unwrap();
}

impl FromStr for ImageName {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(captures) = IMAGE_ID_REGEX.captures(s) {
            return Ok(ImageName::Id {
                hash: captures.name("id").unwrap().as_str().to_string(),
            });
        }

        let (reference, digest) = match s.split_once('@') {
            Some((reference, digest)) => (reference, Some(digest.to_string())),
            None => (s, None),
        };

        let (registry, remainder) = match reference.split_once('/') {
            Some((head, rest))
                if head.contains('.') || head.contains(':') || head == "localhost" =>
            {
                (Some(head.to_string()), rest)
            }
            _ => (None, reference),
        };

        if remainder.is_empty() {
            return Err(ImageError::InvalidImageReference {
                reference: s.to_string(),
            });
        }

        // A colon in the last path component separates the tag.
        let (repository, tag) = match remainder.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') => {
                (repository.to_string(), Some(tag.to_string()))
            }
            _ => (remainder.to_string(), None),
        };

        if repository.is_empty() {
            return Err(ImageError::InvalidImageReference {
                reference: s.to_string(),
            });
        }

        Ok(ImageName::Named {
            registry,
            repository,
            tag,
            digest,
        })
    }
}

impl Display for ImageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageName::Id { hash } => write!(f, "sha256:{hash}"),
            ImageName::Named {
                registry,
                repository,
                tag,
                digest,
            } => {
                if let Some(registry) = registry {
                    write!(f, "{registry}/")?;
                }
                write!(f, "{repository}")?;
                if let Some(tag) = tag {
                    write!(f, ":{tag}")?;
                }
                if let Some(digest) = digest {
                    write!(f, "@{digest}")?;
                }
                Ok(())
            }
        }
    }
}

/// Reference equivalence on raw strings; unparsable references fall back to
/// literal comparison.
pub fn same_image_reference(a: &str, b: &str) -> bool {
    match (ImageName::from_str(a), ImageName::from_str(b)) {
        (Ok(own), Ok(others)) => own.same_image(&others),
        _ => a == b,
    }
}

fn digest_eq(a: &str, b: &str) -> bool {
    a.trim_start_matches("sha256:") == b.trim_start_matches("sha256:")
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ImageError {
    #[error("Service {service_name} has no image to fetch.")]
    ImageNotFound { service_name: String },
    #[error("Invalid image reference: {reference}")]
    InvalidImageReference { reference: String },
}
