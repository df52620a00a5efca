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

//! Test utilities for the business layer.

use crate::db;
use crate::driver::Driver;
use crate::driver::dispatch::JobQueue;
use crate::model::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::Date;
use time::macros::datetime;
use travel_core::clocks::Clock;
use travel_core::clocks::testutils::SettableClock;
use travel_core::db::{Db, Executor};
use travel_core::driver::{DriverError, DriverResult};
use travel_core::model::{EmailAddress, Username};

/// A job queue that records the jobs it receives instead of running them.
#[derive(Default)]
pub(crate) struct RecorderJobQueue {
    /// Jobs received so far, in order.
    jobs: Mutex<Vec<Job>>,

    /// Whether the queue rejects new jobs.
    closed: AtomicBool,
}

impl RecorderJobQueue {
    /// Makes all future `enqueue` calls fail.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns and forgets all jobs received so far.
    pub(crate) fn take(&self) -> Vec<Job> {
        std::mem::take(&mut *self.jobs.lock().unwrap())
    }
}

impl JobQueue for RecorderJobQueue {
    fn enqueue(&self, job: Job) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::BackendError("Job queue is closed".to_owned()));
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// State of a running test.
pub(crate) struct TestContext {
    /// The database backing the driver.
    db: Arc<dyn Db + Send + Sync>,

    /// The clock used by the driver.
    clock: Arc<SettableClock>,

    /// The job queue used by the driver.
    jobs: Arc<RecorderJobQueue>,

    /// The driver under test.
    driver: Driver,
}

impl TestContext {
    /// Initializes the driver with an in-memory database and fake collaborators.
    pub(crate) async fn setup() -> Self {
        let db: Arc<dyn Db + Send + Sync> =
            Arc::new(travel_core::db::sqlite::testutils::setup().await);
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let clock = Arc::new(SettableClock::new(datetime!(2024-01-01 08:00:00 UTC)));
        let jobs = Arc::new(RecorderJobQueue::default());
        let driver = Driver::new(db.clone(), clock.clone(), jobs.clone());
        Self { db, clock, jobs, driver }
    }

    /// Returns a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Returns the clock used by the driver.
    pub(crate) fn clock(&self) -> &SettableClock {
        &self.clock
    }

    /// Returns the job queue used by the driver.
    pub(crate) fn jobs(&self) -> &RecorderJobQueue {
        &self.jobs
    }

    /// Returns a new copy of the driver under test.
    pub(crate) fn driver(&self) -> Driver {
        self.driver.clone()
    }

    /// Returns the current time of the fake clock and moves it forward so that entities created
    /// in sequence get distinct timestamps.
    fn tick(&self) -> time::OffsetDateTime {
        let now = self.clock.now_utc();
        self.clock.advance(Duration::from_secs(1));
        now
    }

    /// Registers a regular user named `username` with an `@example.com` address.
    pub(crate) async fn create_user(&self, username: &'static str) -> User {
        let email = EmailAddress::new(format!("{}@example.com", username)).unwrap();
        let user = User::new(Username::from(username), email);
        db::put_user(&mut self.ex().await, &user).await.unwrap();
        user
    }

    /// Registers a staff user named `username` with an `@example.com` address.
    pub(crate) async fn create_staff(&self, username: &'static str) -> User {
        let email = EmailAddress::new(format!("{}@example.com", username)).unwrap();
        let user = User::new(Username::from(username), email).with_is_staff(true);
        db::put_user(&mut self.ex().await, &user).await.unwrap();
        user
    }

    /// Opens a new session for `user` and returns its token.
    pub(crate) async fn create_session(&self, user: &User) -> AccessToken {
        let token = AccessToken::generate();
        db::put_session(&mut self.ex().await, &token, user.username(), self.clock.now_utc())
            .await
            .unwrap();
        token
    }

    /// Creates a listing owned by `owner` directly in the database.
    pub(crate) async fn create_listing(
        &self,
        owner: &User,
        title: &str,
        available: bool,
    ) -> Listing {
        let price = Price::from_str("100").unwrap();
        let fields =
            ListingFields::new(title, "A place to stay", "Lisbon", "Portugal", price, available)
                .unwrap();
        let now = self.tick();
        let listing =
            Listing::new(ListingId::generate(), owner.username().clone(), fields, now, now);
        db::put_listing(&mut self.ex().await, &listing).await.unwrap();
        listing
    }

    /// Creates an image for `listing` directly in the database.
    pub(crate) async fn create_image(&self, listing: &Listing, is_primary: bool) -> ListingImage {
        let url = url::Url::parse("https://images.example.com/photo.jpg").unwrap();
        let image = ListingImage::new(
            ImageId::generate(),
            NewImage::new(*listing.id(), url, None).unwrap(),
            is_primary,
            self.tick(),
        );
        db::put_image(&mut self.ex().await, &image).await.unwrap();
        image
    }

    /// Creates a booking of `listing` for `user` directly in the database, bypassing admission.
    pub(crate) async fn create_booking(
        &self,
        listing: &Listing,
        user: &User,
        check_in: Option<Date>,
        check_out: Option<Date>,
    ) -> Booking {
        let details =
            BookingDetails::new(check_in, check_out, Price::from_str("300").unwrap(), 2).unwrap();
        let booking = Booking::new(
            BookingId::generate(),
            *listing.id(),
            user.username().clone(),
            details,
            self.tick(),
        );
        db::put_booking(&mut self.ex().await, &booking).await.unwrap();
        booking
    }
}
