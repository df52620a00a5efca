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

//! REST interface for the listings service.

use crate::driver::Driver;
use axum::Router;
use tower_http::cors::CorsLayer;

mod booking_delete;
mod booking_get;
mod booking_patch;
mod booking_put;
mod bookings_get;
mod bookings_post;
mod httputils;
mod image_delete;
mod image_get;
mod images_get;
mod images_post;
mod listing_delete;
mod listing_get;
mod listing_images_get;
mod listing_patch;
mod listing_put;
mod listings_get;
mod listings_post;
#[cfg(test)]
mod testutils;

/// Creates the router for the application.
pub(crate) fn app(driver: Driver) -> Router {
    use axum::routing::get;

    let api = Router::new()
        .route("/listings", get(listings_get::handler).post(listings_post::handler))
        .route(
            "/listings/:id",
            get(listing_get::handler)
                .put(listing_put::handler)
                .patch(listing_patch::handler)
                .delete(listing_delete::handler),
        )
        .route("/listings/:id/images", get(listing_images_get::handler))
        .route("/images", get(images_get::handler).post(images_post::handler))
        .route("/images/:id", get(image_get::handler).delete(image_delete::handler))
        .route("/bookings", get(bookings_get::handler).post(bookings_post::handler))
        .route(
            "/bookings/:id",
            get(booking_get::handler)
                .put(booking_put::handler)
                .patch(booking_patch::handler)
                .delete(booking_delete::handler),
        )
        .with_state(driver);

    Router::new().nest("/api", api).layer(CorsLayer::permissive())
}
