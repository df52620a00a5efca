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

//! Identifiers of the entities managed by the service.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Defines a new identifier type backed by a random UUID.
macro_rules! uuid_id [
    ( $name:ident, $what:literal ) => {
        #[doc = concat!("Identifier of ", $what, ".")]
        #[derive(
            Clone, Copy, Debug, Deserialize, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd,
            Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the UUID backing this identifier.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }
    }
];

uuid_id!(BookingId, "a booking");
uuid_id!(ImageId, "an image attached to a listing");
uuid_id!(ListingId, "a listing");
