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

//! Notification jobs handed from the business logic to the dispatcher.
//!
//! Jobs carry a snapshot of everything needed to render their message so that the dispatcher
//! never has to read persisted state.  They live in memory only.

use crate::model::{BookingId, ListingId, Price};
use std::fmt;
use time::Date;
use travel_core::model::EmailAddress;

/// Request to confirm a freshly admitted booking to the guest.
#[derive(Clone, Debug, PartialEq)]
pub struct BookingConfirmationJob {
    /// The booking being confirmed.
    pub booking_id: BookingId,

    /// Address of the guest that made the booking.
    pub recipient: EmailAddress,

    /// First night of the stay, if known.
    pub check_in: Option<Date>,

    /// Day of departure, if known.
    pub check_out: Option<Date>,

    /// Total price of the stay.
    pub total_price: Price,

    /// Title of the booked listing.
    pub listing_title: String,

    /// Number of guests in the stay.
    pub number_of_guests: u16,
}

/// Request to tell a host that their new listing has been published.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingNotificationJob {
    /// The listing that was created.
    pub listing_id: ListingId,

    /// Title of the listing.
    pub title: String,

    /// Address of the owner of the listing.
    pub recipient: EmailAddress,
}

/// A unit of work for the notification dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum Job {
    /// Send a booking confirmation.
    BookingConfirmation(BookingConfirmationJob),

    /// Send a listing creation notice.
    ListingNotification(ListingNotificationJob),
}

impl Job {
    /// Returns the address the job's message goes to.
    pub fn recipient(&self) -> &EmailAddress {
        match self {
            Job::BookingConfirmation(job) => &job.recipient,
            Job::ListingNotification(job) => &job.recipient,
        }
    }
}

impl fmt::Display for Job {
    /// Formats the job for log messages, identifying the entity it is about.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::BookingConfirmation(job) => {
                write!(f, "confirmation for booking {}", job.booking_id)
            }
            Job::ListingNotification(job) => write!(f, "notice for listing {}", job.listing_id),
        }
    }
}
