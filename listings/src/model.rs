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

//! Data types for the listings service.
//!
//! Types that come from user input validate themselves at deserialization time, so handlers
//! never see a malformed listing, image or booking.

mod accesstoken;
pub use accesstoken::AccessToken;
mod booking;
pub use booking::{Booking, BookingDetails, BookingPatch, BookingRequest};
mod ids;
pub use ids::{BookingId, ImageId, ListingId};
mod image;
pub use image::{ListingImage, NewImage};
mod job;
pub use job::{BookingConfirmationJob, Job, ListingNotificationJob};
mod listing;
pub use listing::{Listing, ListingFields, ListingPatch, ListingsQuery, SortField, SortKey};
mod price;
pub use price::Price;
mod user;
pub use user::User;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
