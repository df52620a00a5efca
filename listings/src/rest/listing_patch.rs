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

//! API to modify some fields of a listing.

use crate::driver::Driver;
use crate::model::{Listing, ListingId, ListingPatch};
use crate::rest::httputils::get_requester;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use travel_core::rest::RestResult;

/// PATCH handler for this API.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    Path(id): Path<ListingId>,
    headers: HeaderMap,
    Json(patch): Json<ListingPatch>,
) -> RestResult<Json<Listing>> {
    let requester = get_requester(driver.clone(), &headers).await?;
    let listing = driver.patch_listing(&requester, id, patch).await?;
    Ok(Json(listing))
}
