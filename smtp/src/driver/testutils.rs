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

//! Test utilities for email handling.

use crate::driver::Mailer;
use async_trait::async_trait;
use futures::lock::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use travel_core::driver::{DriverError, DriverResult};
use travel_core::model::EmailAddress;

/// A message captured by the `RecorderMailer`.
#[derive(Clone, Debug, PartialEq)]
pub struct SentMessage {
    /// Subject line of the message.
    pub subject: String,

    /// Plain text body of the message.
    pub plain_body: String,

    /// HTML body of the message.
    pub html_body: String,
}

/// Mailer that captures outgoing messages and that can simulate delivery failures.
#[derive(Clone, Default)]
pub struct RecorderMailer {
    /// Storage for delivered messages.
    pub inboxes: Arc<Mutex<HashMap<EmailAddress, Vec<SentMessage>>>>,

    /// Number of calls to `send` per recipient, whether they succeeded or not.
    attempts: Arc<Mutex<HashMap<EmailAddress, usize>>>,

    /// Addresses for which to fail sending a message to.
    errors: Arc<Mutex<HashSet<EmailAddress>>>,

    /// Addresses for which to deliver messages but report a failure, and how many times.
    lost_acks: Arc<Mutex<HashMap<EmailAddress, usize>>>,
}

impl RecorderMailer {
    /// Makes trying to send messages to `email` fail with an error.
    pub async fn inject_error_for<E: Into<EmailAddress>>(&self, email: E) {
        let mut errors = self.errors.lock().await;
        errors.insert(email.into());
    }

    /// Makes the next `count` messages to `email` be delivered while reporting a failure, as if
    /// the server's acknowledgement had been lost.
    pub async fn inject_lost_ack_for<E: Into<EmailAddress>>(&self, email: E, count: usize) {
        let mut lost_acks = self.lost_acks.lock().await;
        lost_acks.insert(email.into(), count);
    }

    /// Returns the number of delivery attempts issued for `email`.
    pub async fn attempts(&self, email: &EmailAddress) -> usize {
        let attempts = self.attempts.lock().await;
        attempts.get(email).copied().unwrap_or(0)
    }

    /// Expects that no messages were sent.
    pub async fn expect_no_messages(&self) {
        let inboxes = self.inboxes.lock().await;
        assert_eq!(0, inboxes.len(), "Expected to find no messages");
    }

    /// Expects that messages were sent to `exp_to` and nobody else, and returns the list of
    /// messages to that recipient.
    pub async fn expect_one_inbox(&self, exp_to: &EmailAddress) -> Vec<SentMessage> {
        let inboxes = self.inboxes.lock().await;
        assert_eq!(1, inboxes.len(), "Expected to find messages in just one inbox");
        let (to, messages) = inboxes.iter().next().unwrap();
        assert_eq!(exp_to, to);
        messages.clone()
    }

    /// Expects that only one message was sent to `exp_to` and nobody else, and returns the
    /// message.
    pub async fn expect_one_message(&self, exp_to: &EmailAddress) -> SentMessage {
        let mut messages = self.expect_one_inbox(exp_to).await;
        assert_eq!(1, messages.len(), "Expected to find just one message for {}", exp_to);
        messages.pop().unwrap()
    }
}

#[async_trait]
impl Mailer for RecorderMailer {
    async fn send(
        &self,
        subject: &str,
        plain_body: &str,
        html_body: &str,
        recipient: &EmailAddress,
    ) -> DriverResult<()> {
        {
            let mut attempts = self.attempts.lock().await;
            *attempts.entry(recipient.clone()).or_insert(0) += 1;
        }

        {
            let errors = self.errors.lock().await;
            if errors.contains(recipient) {
                return Err(DriverError::BackendError(format!(
                    "Sending email to {} failed",
                    recipient
                )));
            }
        }

        let message = SentMessage {
            subject: subject.to_owned(),
            plain_body: plain_body.to_owned(),
            html_body: html_body.to_owned(),
        };
        {
            let mut inboxes = self.inboxes.lock().await;
            inboxes.entry(recipient.clone()).or_default().push(message);
        }

        let mut lost_acks = self.lost_acks.lock().await;
        if let Some(pending) = lost_acks.get_mut(recipient) {
            if *pending > 0 {
                *pending -= 1;
                return Err(DriverError::BackendError(format!(
                    "Lost acknowledgement for email to {}",
                    recipient
                )));
            }
        }
        Ok(())
    }
}
