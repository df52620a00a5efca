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

//! Business logic for the listings service.

use crate::db;
use crate::model::{AccessToken, Job, User};
use log::warn;
use std::sync::Arc;
use travel_core::clocks::Clock;
use travel_core::db::{Db, DbError};
use travel_core::driver::{DriverError, DriverResult};

mod bookings;
pub mod dispatch;
use dispatch::JobQueue;
mod images;
mod listings;
#[cfg(test)]
pub(crate) mod testutils;

/// Returns a function that converts a `DbError::NotFound` into a user-facing error that names the
/// missing entity `what`, and any other error into its generic driver counterpart.
fn not_found(what: &'static str) -> impl FnOnce(DbError) -> DriverError {
    move |e| match e {
        DbError::NotFound => DriverError::NotFound(format!("{} not found", what)),
        e => DriverError::from(e),
    }
}

/// Business logic.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction, so it's incorrect for the caller to use two separate calls.  For this reason,
/// these operations consume the driver in an attempt to minimize the possibility of executing
/// two operations.
#[derive(Clone)]
pub(crate) struct Driver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock used to timestamp new entities.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Queue that receives the notifications to deliver once operations commit.
    jobs: Arc<dyn JobQueue + Send + Sync>,
}

impl Driver {
    /// Creates a new driver backed by the given injected components.
    pub(crate) fn new(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        jobs: Arc<dyn JobQueue + Send + Sync>,
    ) -> Self {
        Self { db, clock, jobs }
    }

    /// Resolves the session identified by `access_token` into the user that owns it.
    ///
    /// Unknown tokens yield `DriverError::NotFound`.
    pub(crate) async fn authenticate(self, access_token: &AccessToken) -> DriverResult<User> {
        let mut ex = self.db.ex().await?;
        match db::get_session_user(&mut ex, access_token).await {
            Ok(user) => Ok(user),
            Err(DbError::NotFound) => Err(DriverError::NotFound("Invalid access token".to_owned())),
            Err(e) => Err(e.into()),
        }
    }

    /// Hands `job` to the job queue.
    ///
    /// The operation that produced the job has already committed by the time this runs, so a
    /// failure to enqueue is logged and otherwise ignored.
    fn enqueue(&self, job: Job) {
        let description = job.to_string();
        if let Err(e) = self.jobs.enqueue(job) {
            warn!("Failed to enqueue {}: {}", description, e);
        }
    }
}
