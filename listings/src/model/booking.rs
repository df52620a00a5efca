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

//! The `Booking` data type and its companions.

use crate::model::{BookingId, ListingId, Price, iso_date};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use travel_core::model::{ModelError, ModelResult, Username};

/// The stay described by a booking.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(try_from = "RawBookingDetails")]
pub struct BookingDetails {
    /// First night of the stay, if known.
    #[serde(with = "iso_date::option")]
    check_in: Option<Date>,

    /// Day of departure, if known.  The stay covers `[check_in, check_out)`.
    #[serde(with = "iso_date::option")]
    check_out: Option<Date>,

    /// Total price of the stay as agreed with the guest.
    total_price: Price,

    /// Number of guests in the stay.
    number_of_guests: u16,
}

/// Unvalidated version of `BookingDetails` as received from clients.
#[derive(Deserialize)]
struct RawBookingDetails {
    /// First night of the stay, if known.
    #[serde(default, with = "iso_date::option")]
    check_in: Option<Date>,

    /// Day of departure, if known.
    #[serde(default, with = "iso_date::option")]
    check_out: Option<Date>,

    /// Total price of the stay.
    total_price: Price,

    /// Number of guests in the stay.
    #[serde(default = "default_number_of_guests")]
    number_of_guests: u16,
}

/// Bookings are for a single guest unless told otherwise.
fn default_number_of_guests() -> u16 {
    1
}

impl TryFrom<RawBookingDetails> for BookingDetails {
    type Error = ModelError;

    fn try_from(raw: RawBookingDetails) -> ModelResult<Self> {
        BookingDetails::new(raw.check_in, raw.check_out, raw.total_price, raw.number_of_guests)
    }
}

impl BookingDetails {
    /// Creates a new set of booking details, validating them.
    ///
    /// Either date may be missing.  The dates are not checked against each other: a stay whose
    /// check-out does not follow its check-in is only rejected if it overlaps another booking.
    pub fn new(
        check_in: Option<Date>,
        check_out: Option<Date>,
        total_price: Price,
        number_of_guests: u16,
    ) -> ModelResult<Self> {
        if number_of_guests == 0 {
            return Err(ModelError("Number of guests must be at least 1".to_owned()));
        }
        Ok(Self { check_in, check_out, total_price, number_of_guests })
    }

    /// Returns the stay as a `[check_in, check_out)` range if both dates are known.
    pub fn stay(&self) -> Option<(Date, Date)> {
        match (self.check_in, self.check_out) {
            (Some(check_in), Some(check_out)) => Some((check_in, check_out)),
            _ => None,
        }
    }
}

/// A request to create or replace a booking.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct BookingRequest {
    /// Listing to book.
    listing: ListingId,

    /// Details of the stay.
    #[serde(flatten)]
    details: BookingDetails,
}

impl BookingRequest {
    /// Creates a new booking request.
    pub fn new(listing: ListingId, details: BookingDetails) -> Self {
        Self { listing, details }
    }
}

/// A partial modification to a booking.  Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct BookingPatch {
    /// New listing, if any.
    pub listing: Option<ListingId>,

    /// New check-in date, if any.
    #[serde(default, with = "iso_date::option")]
    pub check_in: Option<Date>,

    /// New check-out date, if any.
    #[serde(default, with = "iso_date::option")]
    pub check_out: Option<Date>,

    /// New total price, if any.
    pub total_price: Option<Price>,

    /// New number of guests, if any.
    pub number_of_guests: Option<u16>,
}

impl BookingPatch {
    /// Applies this patch on top of the `listing` and `details` of a booking, revalidating the
    /// result.
    pub fn apply(
        &self,
        listing: ListingId,
        details: BookingDetails,
    ) -> ModelResult<BookingRequest> {
        let details = BookingDetails::new(
            self.check_in.or(details.check_in),
            self.check_out.or(details.check_out),
            self.total_price.unwrap_or(details.total_price),
            self.number_of_guests.unwrap_or(details.number_of_guests),
        )?;
        Ok(BookingRequest::new(self.listing.unwrap_or(listing), details))
    }
}

/// A reservation of a listing by a user.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct Booking {
    /// Identifier of the booking.
    id: BookingId,

    /// Booked listing.
    listing: ListingId,

    /// User that made the booking.
    user: Username,

    /// Details of the stay.
    #[serde(flatten)]
    details: BookingDetails,

    /// When the booking was made.
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl Booking {
    /// Creates a new booking from its parts.
    pub fn new(
        id: BookingId,
        listing: ListingId,
        user: Username,
        details: BookingDetails,
        created_at: OffsetDateTime,
    ) -> Self {
        Self { id, listing, user, details, created_at }
    }

    /// Replaces the listing and the details of the booking with those in `request`.
    pub fn with_request(mut self, request: BookingRequest) -> Self {
        self.listing = request.listing;
        self.details = request.details;
        self
    }
}
