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

//! Sources of time for the services.
//!
//! Business logic never queries the system time nor sleeps directly.  Instead, it goes through a
//! `Clock` so that tests can control the passage of time, which matters for timestamps stored in
//! the database and for the delays between notification retries.

use async_trait::async_trait;
use std::time::Duration;
use time::OffsetDateTime;

/// Generic definition of a clock.
#[async_trait]
pub trait Clock {
    /// Returns the current UTC time.
    fn now_utc(&self) -> OffsetDateTime;

    /// Pauses execution of the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the system time and by tokio timers.
#[derive(Clone, Default)]
pub struct SystemClock {}

#[async_trait]
impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();

        // PostgreSQL timestamps only have microsecond resolution.  Truncate here so that values
        // read back from the database compare equal to the values we wrote.
        let truncated = now.nanosecond() / 1000 * 1000;
        now.replace_nanosecond(truncated).unwrap_or(now)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Test utilities.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Converts a timestamp into microseconds since the epoch, rejecting sub-microsecond values.
    fn to_micros(ts: OffsetDateTime) -> u64 {
        let nanos = ts.unix_timestamp_nanos();
        assert!(nanos % 1000 == 0, "Nanosecond precision not supported");
        u64::try_from(nanos / 1000).expect("Test timestamps must be after the epoch")
    }

    /// A clock that returns a preconfigured instant and that can be modified at will.
    ///
    /// Sleeping on this clock does not block: it advances the fake time by the requested amount
    /// and records the request so that tests can later verify the delays that were used.
    pub struct SettableClock {
        /// Current fake time in microseconds.
        now_us: AtomicU64,

        /// Durations of all the `sleep` calls issued against this clock, in order.
        sleeps: Mutex<Vec<Duration>>,
    }

    impl SettableClock {
        /// Creates a new clock that returns `now` until reconfigured.
        pub fn new(now: OffsetDateTime) -> Self {
            Self { now_us: AtomicU64::new(to_micros(now)), sleeps: Mutex::default() }
        }

        /// Sets the new value of `now` that the clock returns.
        pub fn set(&self, now: OffsetDateTime) {
            self.now_us.store(to_micros(now), Ordering::SeqCst);
        }

        /// Advances the current time by `delta`.
        pub fn advance(&self, delta: Duration) {
            let delta_ns = delta.as_nanos();
            assert!(delta_ns % 1000 == 0, "Nanosecond precision not supported");
            let delta_us = u64::try_from(delta_ns / 1000).unwrap();
            self.now_us.fetch_add(delta_us, Ordering::SeqCst);
        }

        /// Returns the durations of all `sleep` calls issued so far.
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for SettableClock {
        fn now_utc(&self) -> OffsetDateTime {
            let now_us = self.now_us.load(Ordering::SeqCst);
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(now_us) * 1000).unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
            tokio::task::yield_now().await;
        }
    }

}
