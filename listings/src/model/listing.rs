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

//! The `Listing` data type and its companions.

use crate::model::{ListingId, Price};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use travel_core::model::{ModelError, ModelResult, Username};

/// Maximum length of a listing title, in characters.
const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of a city or country name, in characters.
const MAX_PLACE_LENGTH: usize = 100;

/// Validates that `value` is non-blank and at most `max_length` characters long.
fn validate_text(what: &str, value: &str, max_length: usize) -> ModelResult<()> {
    if value.trim().is_empty() {
        return Err(ModelError(format!("{} cannot be empty", what)));
    }
    if value.chars().count() > max_length {
        return Err(ModelError(format!("{} cannot be longer than {} characters", what, max_length)));
    }
    Ok(())
}

/// The user-editable fields of a listing.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(try_from = "RawListingFields")]
pub struct ListingFields {
    /// Short name of the listing.
    title: String,

    /// Free-form description of the listing.
    description: String,

    /// City where the property is.
    city: String,

    /// Country where the property is.
    country: String,

    /// Price of one night of stay.
    price_per_night: Price,

    /// Whether the listing accepts new bookings.
    available: bool,
}

/// Unvalidated version of `ListingFields` as received from clients.
#[derive(Deserialize)]
struct RawListingFields {
    /// Short name of the listing.
    title: String,

    /// Free-form description of the listing.
    #[serde(default)]
    description: String,

    /// City where the property is.
    city: String,

    /// Country where the property is.
    country: String,

    /// Price of one night of stay.
    price_per_night: Price,

    /// Whether the listing accepts new bookings.
    #[serde(default = "default_available")]
    available: bool,
}

/// Listings are open for bookings unless told otherwise.
fn default_available() -> bool {
    true
}

impl TryFrom<RawListingFields> for ListingFields {
    type Error = ModelError;

    fn try_from(raw: RawListingFields) -> ModelResult<Self> {
        ListingFields::new(
            raw.title,
            raw.description,
            raw.city,
            raw.country,
            raw.price_per_night,
            raw.available,
        )
    }
}

impl ListingFields {
    /// Creates a new set of listing fields, validating them.
    pub fn new<S1, S2, S3, S4>(
        title: S1,
        description: S2,
        city: S3,
        country: S4,
        price_per_night: Price,
        available: bool,
    ) -> ModelResult<Self>
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        let title = title.into();
        let city = city.into();
        let country = country.into();
        validate_text("Title", &title, MAX_TITLE_LENGTH)?;
        validate_text("City", &city, MAX_PLACE_LENGTH)?;
        validate_text("Country", &country, MAX_PLACE_LENGTH)?;
        let description = description.into();
        Ok(Self { title, description, city, country, price_per_night, available })
    }
}

/// A partial modification to the fields of a listing.  Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct ListingPatch {
    /// New title, if any.
    pub title: Option<String>,

    /// New description, if any.
    pub description: Option<String>,

    /// New city, if any.
    pub city: Option<String>,

    /// New country, if any.
    pub country: Option<String>,

    /// New nightly price, if any.
    pub price_per_night: Option<Price>,

    /// New availability, if any.
    pub available: Option<bool>,
}

impl ListingPatch {
    /// Applies this patch on top of `fields`, revalidating the result.
    pub fn apply(self, fields: ListingFields) -> ModelResult<ListingFields> {
        ListingFields::new(
            self.title.unwrap_or(fields.title),
            self.description.unwrap_or(fields.description),
            self.city.unwrap_or(fields.city),
            self.country.unwrap_or(fields.country),
            self.price_per_night.unwrap_or(fields.price_per_night),
            self.available.unwrap_or(fields.available),
        )
    }
}

/// A property offered for rent.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct Listing {
    /// Identifier of the listing.
    id: ListingId,

    /// User that owns the listing and is the only one allowed to modify it.
    owner: Username,

    /// User-editable details.
    #[serde(flatten)]
    fields: ListingFields,

    /// When the listing was created.
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    /// When the listing was last modified.
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Listing {
    /// Creates a new listing from its parts.
    pub fn new(
        id: ListingId,
        owner: Username,
        fields: ListingFields,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self { id, owner, fields, created_at, updated_at }
    }

    /// Replaces the user-editable fields of the listing as of `now`.
    pub fn with_fields(mut self, fields: ListingFields, now: OffsetDateTime) -> Self {
        self.fields = fields;
        self.updated_at = now;
        self
    }
}

/// Fields by which listings can be sorted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SortField {
    /// Sort by the price of one night.
    PricePerNight,

    /// Sort by the creation time.
    CreatedAt,
}

/// One component of the sort order of a listings query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SortKey {
    /// The field to sort by.
    pub field: SortField,

    /// Whether to sort in descending order.
    pub descending: bool,
}

/// Filters and sort order of a listings query, as given in the query string.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ListingsQuery {
    /// Restricts the results by availability: `true` (in any case) selects available listings
    /// and anything else selects unavailable ones.
    pub available: Option<String>,

    /// Restricts the results to the listings owned by this user.
    pub owner: Option<String>,

    /// Whitespace-separated terms that must all appear in the title, description, city or
    /// country of a listing.
    pub search: Option<String>,

    /// Comma-separated list of sort fields, each optionally prefixed with `-`.
    pub ordering: Option<String>,
}

impl ListingsQuery {
    /// Returns the availability to filter by, if any.
    pub fn available_filter(&self) -> Option<bool> {
        self.available.as_ref().map(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Returns the owner to filter by, if any, in the normalized form of usernames.
    pub fn owner_filter(&self) -> Option<String> {
        self.owner.as_ref().map(|v| v.to_lowercase())
    }

    /// Returns the search terms.
    pub fn search_terms(&self) -> Vec<&str> {
        match self.search.as_ref() {
            Some(search) => search.split_whitespace().collect(),
            None => vec![],
        }
    }

    /// Returns the sort order, skipping unknown fields, or sorting by creation time if no valid
    /// fields were given.
    pub fn sort_keys(&self) -> Vec<SortKey> {
        let mut keys = vec![];
        for raw in self.ordering.as_deref().unwrap_or("").split(',') {
            let raw = raw.trim();
            let (name, descending) = match raw.strip_prefix('-') {
                Some(name) => (name, true),
                None => (raw, false),
            };
            let field = match name {
                "price_per_night" => SortField::PricePerNight,
                "created_at" => SortField::CreatedAt,
                _ => continue,
            };
            if !keys.iter().any(|k: &SortKey| k.field == field) {
                keys.push(SortKey { field, descending });
            }
        }
        if keys.is_empty() {
            keys.push(SortKey { field: SortField::CreatedAt, descending: false });
        }
        keys
    }
}
