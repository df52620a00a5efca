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

//! Travel listings service: listings, their images and the bookings made against them.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use log::info;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use travel_core::clocks::{Clock, SystemClock};
use travel_core::db::Db;
use travel_smtp::driver::Mailer;

pub mod db;
pub mod driver;
use driver::Driver;
use driver::dispatch::{Dispatcher, DispatcherOptions};
pub mod model;
mod rest;
use rest::app;

/// Instantiates all resources to serve the application on `bind_addr`.
///
/// The `db` must already contain the schema.  Notifications are delivered via `mailer` by a
/// background dispatcher configured with `dispatcher_opts`.
///
/// While it'd be nice to push this responsibility to `main`, doing so would force us to expose many
/// crate-internal types to the public, which in turn would make dead code detection harder.
pub async fn serve(
    bind_addr: impl Into<SocketAddr>,
    db: Arc<dyn Db + Send + Sync>,
    mailer: Arc<dyn Mailer + Send + Sync>,
    dispatcher_opts: DispatcherOptions,
) -> Result<(), Box<dyn Error>> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::from(SystemClock::default());
    let dispatcher = Dispatcher::new(mailer, clock.clone(), dispatcher_opts);
    let driver = Driver::new(db, clock, Arc::from(dispatcher));
    let app = app(driver);

    let listener = tokio::net::TcpListener::bind(bind_addr.into()).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
