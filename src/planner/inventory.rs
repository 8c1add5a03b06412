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

use crate::models::{ImageStatus, Service};
use crate::planner::Context;

/// Read-only view on the local image inventory that answers the two
/// questions the planner asks before starting a service.
pub struct ImageInventory<'a> {
    context: &'a Context,
}

impl<'a> ImageInventory<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self { context }
    }

    /// Whether the image the service is configured with is on disk, matched
    /// by content digest or by registry reference equivalence. Entries still
    /// downloading or queued for deletion do not count.
    pub fn is_available(&self, service: &Service) -> bool {
        self.context
            .available_images
            .iter()
            .filter(|image| image.status == ImageStatus::Downloaded)
            .any(|image| image.matches_service(service))
    }

    pub fn is_downloading(&self, service: &Service) -> bool {
        self.context.downloading.contains(&service.image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Image, ImageStatus};

    #[test]
    fn should_find_image_by_reference_equivalence() {
        let mut context = Context::default();
        let mut image =
            Image::for_service(&crate::svc!(1013, "api", image = "acme/api:21")).unwrap();
        image.status = ImageStatus::Downloaded;
        context.available_images.push(image);

        let inventory = ImageInventory::new(&context);

        assert!(inventory.is_available(&crate::svc!(
            1013,
            "api",
            image = "docker.io/acme/api:21"
        )));
        assert!(!inventory.is_available(&crate::svc!(1013, "api", image = "acme/api:22")));
    }

    #[test]
    fn should_track_in_flight_downloads_by_image_id() {
        let mut context = Context::default();
        context.downloading.insert(1);

        let inventory = ImageInventory::new(&context);

        assert!(inventory.is_downloading(&crate::svc!(1013, "api")));

        let mut other = crate::svc!(1013, "api");
        other.image_id = 2;
        assert!(!inventory.is_downloading(&other));
    }
}
