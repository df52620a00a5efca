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

//! Asynchronous delivery of the notifications produced by the business logic.
//!
//! Operations that need to notify someone hand a `Job` to a `JobQueue` once their transaction
//! has committed and return right away.  The `Dispatcher` renders each job and delivers it in the
//! background, retrying failed deliveries after a fixed delay.
//!
//! Deliveries are not idempotent: if the mail server accepts a message but the acknowledgement
//! gets lost, the message is sent again.

use crate::model::{BookingConfirmationJob, Job, ListingNotificationJob};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::StreamExt;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use travel_core::clocks::Clock;
use travel_core::driver::{DriverError, DriverResult};
use travel_core::env::get_optional_var;
use travel_core::model::ModelResult;
use travel_smtp::driver::Mailer;
use travel_smtp::model::{HtmlTemplate, RenderedMessage};

/// Default number of times a failed delivery is retried.
const DEFAULT_MAX_RETRIES: u16 = 3;

/// Default delay between delivery attempts of the same job.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Text used in messages for stay dates the guest did not provide.
const NOT_SPECIFIED: &str = "Not specified";

/// Message sent to a guest when their booking is admitted.
const BOOKING_CONFIRMATION: HtmlTemplate = HtmlTemplate {
    subject_template: "Booking Confirmation #%booking_id%",
    html_template: include_str!("booking_confirmation.html"),
};

/// Message sent to a host when their listing is created.
const LISTING_CREATED: HtmlTemplate = HtmlTemplate {
    subject_template: "Your listing %title% is live",
    html_template: include_str!("listing_created.html"),
};

/// Configuration options for the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherOptions {
    /// Number of times a failed delivery is retried before the job is dropped.
    pub max_retries: u16,

    /// Time to wait between two delivery attempts of the same job.
    pub retry_delay: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, retry_delay: DEFAULT_RETRY_DELAY }
    }
}

impl DispatcherOptions {
    /// Creates a new set of options from environment variables whose name is prefixed by the given
    /// `prefix`.
    ///
    /// This will use variables such as `<prefix>_MAX_RETRIES` and `<prefix>_RETRY_DELAY`, all of
    /// which are optional.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            max_retries: get_optional_var::<u16>(prefix, "MAX_RETRIES")?
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: get_optional_var::<Duration>(prefix, "RETRY_DELAY")?
                .unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}

/// Sink for the jobs produced by the business logic.
pub trait JobQueue {
    /// Schedules `job` for asynchronous processing without waiting for it to run.
    fn enqueue(&self, job: Job) -> DriverResult<()>;
}

/// Final state of a job after the dispatcher is done with it.
#[derive(Debug, PartialEq)]
pub(crate) enum Delivery {
    /// The mail server accepted the message after `attempts` tries.
    Sent {
        /// Number of delivery attempts, including the successful one.
        attempts: u32,
    },

    /// The job was dropped after `attempts` failed tries.
    Abandoned {
        /// Number of delivery attempts made.
        attempts: u32,
    },
}

/// Renders the message for a booking confirmation.
fn render_booking_confirmation(job: &BookingConfirmationJob) -> ModelResult<RenderedMessage> {
    let booking_id = job.booking_id.to_string();
    let check_in = job.check_in.map(|d| d.to_string());
    let check_out = job.check_out.map(|d| d.to_string());
    let total_price = job.total_price.to_string();
    let number_of_guests = job.number_of_guests.to_string();
    BOOKING_CONFIRMATION.render(&[
        ("booking_id", &booking_id),
        ("listing_title", &job.listing_title),
        ("check_in", check_in.as_deref().unwrap_or(NOT_SPECIFIED)),
        ("check_out", check_out.as_deref().unwrap_or(NOT_SPECIFIED)),
        ("number_of_guests", &number_of_guests),
        ("total_price", &total_price),
    ])
}

/// Renders the message for a listing creation notice.
fn render_listing_notification(job: &ListingNotificationJob) -> ModelResult<RenderedMessage> {
    let listing_id = job.listing_id.to_string();
    LISTING_CREATED.render(&[("listing_id", &listing_id), ("title", &job.title)])
}

/// Renders the message that `job` has to deliver.
fn render(job: &Job) -> ModelResult<RenderedMessage> {
    match job {
        Job::BookingConfirmation(job) => render_booking_confirmation(job),
        Job::ListingNotification(job) => render_listing_notification(job),
    }
}

/// Delivers the message of `job` via `mailer`, retrying failed attempts per `opts` and waiting
/// between them with `clock`.
///
/// Errors are logged and never returned: once this gives up on a job, the job is gone.
pub(crate) async fn deliver(
    job: &Job,
    mailer: &(dyn Mailer + Send + Sync),
    clock: &(dyn Clock + Send + Sync),
    opts: &DispatcherOptions,
) -> Delivery {
    let recipient = job.recipient();

    let message = match render(job) {
        Ok(message) => message,
        Err(e) => {
            error!("Dropping {} to {}: cannot render message: {}", job, recipient, e);
            return Delivery::Abandoned { attempts: 0 };
        }
    };

    let max_attempts = u32::from(opts.max_retries) + 1;
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = mailer
            .send(&message.subject, &message.plain_body, &message.html_body, recipient)
            .await;
        match result {
            Ok(()) => {
                info!("Sent {} to {} (attempt {})", job, recipient, attempts);
                break Delivery::Sent { attempts };
            }

            Err(e) if attempts < max_attempts => {
                warn!(
                    "Failed to send {} to {} (attempt {} of {}): {}; retrying in {:?}",
                    job, recipient, attempts, max_attempts, e, opts.retry_delay
                );
                clock.sleep(opts.retry_delay).await;
            }

            Err(e) => {
                error!(
                    "Giving up on {} to {} after {} attempts: {}",
                    job, recipient, attempts, e
                );
                break Delivery::Abandoned { attempts };
            }
        }
    }
}

/// In-process job queue that delivers notifications in the background.
///
/// Every job runs on its own task, so a job waiting to retry a delivery never delays other jobs
/// nor the requests that produced them.  Jobs live in memory only and are lost if the process
/// exits before they are delivered.
///
/// This dispatcher is clonable so that many request handlers can feed the single background loop.
#[derive(Clone)]
pub struct Dispatcher {
    /// Background loop that spawns one task per received job.
    _worker: Arc<JoinHandle<()>>,

    /// Channel to hand jobs to the `worker`.
    jobs_tx: UnboundedSender<Job>,
}

impl Dispatcher {
    /// Starts a new dispatcher that delivers messages via `mailer`, uses `clock` to wait between
    /// retries, and behaves according to `opts`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        mailer: Arc<dyn Mailer + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        opts: DispatcherOptions,
    ) -> Self {
        let (jobs_tx, mut jobs_rx) = mpsc::unbounded::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = jobs_rx.next().await {
                let mailer = mailer.clone();
                let clock = clock.clone();
                let opts = opts.clone();
                tokio::spawn(async move {
                    deliver(&job, mailer.as_ref(), clock.as_ref(), &opts).await;
                });
            }
        });
        Self { _worker: Arc::from(worker), jobs_tx }
    }
}

impl JobQueue for Dispatcher {
    fn enqueue(&self, job: Job) -> DriverResult<()> {
        self.jobs_tx
            .unbounded_send(job)
            .map_err(|e| DriverError::BackendError(format!("Cannot enqueue job: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingId, ListingId, Price};
    use std::str::FromStr;
    use time::macros::{date, datetime};
    use travel_core::clocks::testutils::SettableClock;
    use travel_core::model::EmailAddress;
    use travel_smtp::driver::testutils::RecorderMailer;

    /// Creates a booking confirmation job for `recipient` with fixed contents.
    fn booking_job(recipient: &'static str) -> Job {
        Job::BookingConfirmation(BookingConfirmationJob {
            booking_id: BookingId::generate(),
            recipient: EmailAddress::from(recipient),
            check_in: Some(date!(2024 - 01 - 05)),
            check_out: Some(date!(2024 - 01 - 10)),
            total_price: Price::from_str("450.5").unwrap(),
            listing_title: "Beach <house> & pool".to_owned(),
            number_of_guests: 3,
        })
    }

    #[test]
    fn test_dispatcher_options_from_env_defaults() {
        let overrides = [("NOTIFY_MAX_RETRIES", None::<&str>), ("NOTIFY_RETRY_DELAY", None)];
        temp_env::with_vars(overrides, || {
            let opts = DispatcherOptions::from_env("NOTIFY").unwrap();
            assert_eq!(DispatcherOptions::default(), opts);
            assert_eq!(3, opts.max_retries);
            assert_eq!(Duration::from_secs(60), opts.retry_delay);
        });
    }

    #[test]
    fn test_dispatcher_options_from_env_overrides() {
        let overrides = [("NOTIFY_MAX_RETRIES", Some("5")), ("NOTIFY_RETRY_DELAY", Some("250ms"))];
        temp_env::with_vars(overrides, || {
            let opts = DispatcherOptions::from_env("NOTIFY").unwrap();
            assert_eq!(
                DispatcherOptions { max_retries: 5, retry_delay: Duration::from_millis(250) },
                opts
            );
        });
    }

    #[test]
    fn test_dispatcher_options_from_env_bad_value() {
        temp_env::with_var("NOTIFY_MAX_RETRIES", Some("many"), || {
            let err = DispatcherOptions::from_env("NOTIFY").unwrap_err();
            assert!(err.contains("NOTIFY_MAX_RETRIES"));
        });
    }

    #[test]
    fn test_render_booking_confirmation() {
        let job = booking_job("guest@example.com");
        let Job::BookingConfirmation(inner) = &job else { unreachable!() };
        let message = render(&job).unwrap();

        assert_eq!(format!("Booking Confirmation #{}", inner.booking_id), message.subject);
        assert!(message.html_body.contains("Beach &lt;house&gt; &amp; pool"));
        assert!(message.html_body.contains("Check-in: 2024-01-05"));
        assert!(message.html_body.contains("Check-out: 2024-01-10"));
        assert!(message.html_body.contains("Guests: 3"));
        assert!(message.html_body.contains("Total price: 450.50"));
        assert!(message.plain_body.contains("Listing: Beach <house> & pool"));
        assert!(!message.plain_body.contains("<li>"));
    }

    #[test]
    fn test_render_booking_confirmation_without_dates() {
        let mut job = booking_job("guest@example.com");
        if let Job::BookingConfirmation(inner) = &mut job {
            inner.check_in = None;
            inner.check_out = None;
        }
        let message = render(&job).unwrap();
        assert!(message.plain_body.contains("Check-in: Not specified"));
        assert!(message.plain_body.contains("Check-out: Not specified"));
    }

    #[test]
    fn test_render_listing_notification() {
        let job = Job::ListingNotification(ListingNotificationJob {
            listing_id: ListingId::generate(),
            title: "Mountain cabin".to_owned(),
            recipient: EmailAddress::from("host@example.com"),
        });
        let message = render(&job).unwrap();
        assert_eq!("Your listing Mountain cabin is live", message.subject);
        assert!(message.plain_body.contains("Your listing Mountain cabin has been published"));
    }

    #[tokio::test]
    async fn test_deliver_first_attempt() {
        let mailer = RecorderMailer::default();
        let clock = SettableClock::new(datetime!(2024-01-01 10:00:00 UTC));
        let job = booking_job("guest@example.com");

        let delivery = deliver(&job, &mailer, &clock, &DispatcherOptions::default()).await;
        assert_eq!(Delivery::Sent { attempts: 1 }, delivery);

        let message = mailer.expect_one_message(&EmailAddress::from("guest@example.com")).await;
        assert!(message.subject.starts_with("Booking Confirmation #"));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_persistent_failure_gives_up() {
        let mailer = RecorderMailer::default();
        mailer.inject_error_for("guest@example.com").await;
        let clock = SettableClock::new(datetime!(2024-01-01 10:00:00 UTC));
        let job = booking_job("guest@example.com");

        let delivery = deliver(&job, &mailer, &clock, &DispatcherOptions::default()).await;
        assert_eq!(Delivery::Abandoned { attempts: 4 }, delivery);

        assert_eq!(4, mailer.attempts(&EmailAddress::from("guest@example.com")).await);
        mailer.expect_no_messages().await;
        assert_eq!(vec![Duration::from_secs(60); 3], clock.sleeps());
        assert_eq!(datetime!(2024-01-01 10:03:00 UTC), clock.now_utc());
    }

    #[tokio::test]
    async fn test_deliver_lost_ack_sends_twice() {
        let mailer = RecorderMailer::default();
        mailer.inject_lost_ack_for("guest@example.com", 1).await;
        let clock = SettableClock::new(datetime!(2024-01-01 10:00:00 UTC));
        let job = booking_job("guest@example.com");

        let delivery = deliver(&job, &mailer, &clock, &DispatcherOptions::default()).await;
        assert_eq!(Delivery::Sent { attempts: 2 }, delivery);

        let email = EmailAddress::from("guest@example.com");
        assert_eq!(2, mailer.attempts(&email).await);
        assert_eq!(2, mailer.expect_one_inbox(&email).await.len());
        assert_eq!(vec![Duration::from_secs(60)], clock.sleeps());
    }

    #[tokio::test]
    async fn test_deliver_no_retries() {
        let mailer = RecorderMailer::default();
        mailer.inject_error_for("guest@example.com").await;
        let clock = SettableClock::new(datetime!(2024-01-01 10:00:00 UTC));
        let opts = DispatcherOptions { max_retries: 0, retry_delay: Duration::from_secs(1) };

        let delivery = deliver(&booking_job("guest@example.com"), &mailer, &clock, &opts).await;
        assert_eq!(Delivery::Abandoned { attempts: 1 }, delivery);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_failures_are_independent_per_recipient() {
        let mailer = RecorderMailer::default();
        mailer.inject_error_for("bad@example.com").await;
        let clock = SettableClock::new(datetime!(2024-01-01 10:00:00 UTC));
        let opts = DispatcherOptions::default();

        let bad = deliver(&booking_job("bad@example.com"), &mailer, &clock, &opts).await;
        let good = deliver(&booking_job("good@example.com"), &mailer, &clock, &opts).await;
        assert_eq!(Delivery::Abandoned { attempts: 4 }, bad);
        assert_eq!(Delivery::Sent { attempts: 1 }, good);
        mailer.expect_one_message(&EmailAddress::from("good@example.com")).await;
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_background() {
        let mailer = Arc::new(RecorderMailer::default());
        let clock = Arc::new(SettableClock::new(datetime!(2024-01-01 10:00:00 UTC)));
        let dispatcher = Dispatcher::new(mailer.clone(), clock, DispatcherOptions::default());

        dispatcher.enqueue(booking_job("guest@example.com")).unwrap();

        let email = EmailAddress::from("guest@example.com");
        for _ in 0..100 {
            if mailer.inboxes.lock().await.contains_key(&email) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        mailer.expect_one_message(&email).await;
    }
}
