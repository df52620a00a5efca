// Travel listings
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! The `ListingImage` data type.

use crate::model::{ImageId, ListingId};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use travel_core::model::{ModelError, ModelResult};
use url::Url;

/// Maximum length of an image caption, in characters.
const MAX_CAPTION_LENGTH: usize = 255;

/// A request to attach a new image to a listing.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(try_from = "RawNewImage")]
pub struct NewImage {
    /// Listing to attach the image to.
    listing: ListingId,

    /// Location of the image file.
    image_url: Url,

    /// Optional text describing the image.
    caption: Option<String>,
}

/// Unvalidated version of `NewImage` as received from clients.
#[derive(Deserialize)]
struct RawNewImage {
    /// Listing to attach the image to.
    listing: ListingId,

    /// Location of the image file.
    image_url: Url,

    /// Optional text describing the image.
    #[serde(default)]
    caption: Option<String>,
}

impl TryFrom<RawNewImage> for NewImage {
    type Error = ModelError;

    fn try_from(raw: RawNewImage) -> ModelResult<Self> {
        NewImage::new(raw.listing, raw.image_url, raw.caption)
    }
}

impl NewImage {
    /// Creates a new image request, validating its fields.
    ///
    /// Only `http` and `https` URLs are accepted.  An empty caption is the same as no caption.
    pub fn new(listing: ListingId, image_url: Url, caption: Option<String>) -> ModelResult<Self> {
        if !matches!(image_url.scheme(), "http" | "https") {
            return Err(ModelError(format!("Unsupported image URL scheme in {}", image_url)));
        }
        let caption = caption.filter(|c| !c.trim().is_empty());
        if let Some(caption) = caption.as_ref() {
            if caption.chars().count() > MAX_CAPTION_LENGTH {
                return Err(ModelError(format!(
                    "Caption cannot be longer than {} characters",
                    MAX_CAPTION_LENGTH
                )));
            }
        }
        Ok(Self { listing, image_url, caption })
    }
}

/// An image attached to a listing.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct ListingImage {
    /// Identifier of the image.
    id: ImageId,

    /// Listing the image belongs to.
    listing: ListingId,

    /// Location of the image file.
    image_url: Url,

    /// Optional text describing the image.
    caption: Option<String>,

    /// Whether this is the image that represents the listing.
    is_primary: bool,

    /// When the image was attached.
    #[serde(with = "time::serde::rfc3339")]
    uploaded_at: OffsetDateTime,
}

impl ListingImage {
    /// Creates a new image from its parts.
    pub fn new(
        id: ImageId,
        image: NewImage,
        is_primary: bool,
        uploaded_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            listing: image.listing,
            image_url: image.image_url,
            caption: image.caption,
            is_primary,
            uploaded_at,
        }
    }
}
