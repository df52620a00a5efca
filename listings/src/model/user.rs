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

//! The `User` data type.

use derive_getters::Getters;
use travel_core::model::{EmailAddress, Username};

/// An account known to the identity provider, as seen by this service.
#[derive(Clone, Debug, Getters, PartialEq)]
pub struct User {
    /// Name of the account.
    username: Username,

    /// Address to which notifications for this user are delivered.
    email: EmailAddress,

    /// Whether the user is a staff member, who can see everyone's bookings.
    is_staff: bool,
}

impl User {
    /// Creates a new regular (non-staff) user.
    pub fn new(username: Username, email: EmailAddress) -> Self {
        Self { username, email, is_staff: false }
    }

    /// Modifies the staff flag of the user.
    pub fn with_is_staff(mut self, is_staff: bool) -> Self {
        self.is_staff = is_staff;
        self
    }
}
