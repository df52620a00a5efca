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

//! Utilities to send messages over email.

use async_trait::async_trait;
use derivative::Derivative;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use travel_core::driver::{DriverError, DriverResult};
use travel_core::env::get_required_var;
use travel_core::model::EmailAddress;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Options to establish an SMTP connection.
#[derive(Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct SmtpOptions {
    /// SMTP server to use.
    pub relay: String,

    /// Username for logging into the SMTP server.
    pub username: String,

    /// Password for logging into the SMTP server.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Sender of all outgoing messages, possibly with a display name.
    pub from: String,
}

impl SmtpOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_RELAY`, `<prefix>_USERNAME`, `<prefix>_PASSWORD`
    /// and `<prefix>_FROM`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            relay: get_required_var::<String>(prefix, "RELAY")?,
            username: get_required_var::<String>(prefix, "USERNAME")?,
            password: get_required_var::<String>(prefix, "PASSWORD")?,
            from: get_required_var::<String>(prefix, "FROM")?,
        })
    }
}

/// Trait to abstract the integration with the mailer.
///
/// Implementations make a single delivery attempt per call and report whether the server
/// accepted the message.  Retrying is the caller's business.
#[async_trait]
pub trait Mailer {
    /// Sends a message with a plain text and an HTML rendition of the same content.
    async fn send(
        &self,
        subject: &str,
        plain_body: &str,
        html_body: &str,
        recipient: &EmailAddress,
    ) -> DriverResult<()>;
}

/// Builds a `multipart/alternative` message from `from` to `recipient`.
fn build_message(
    from: &Mailbox,
    subject: &str,
    plain_body: &str,
    html_body: &str,
    recipient: &EmailAddress,
) -> DriverResult<Message> {
    let to: Mailbox = recipient.as_str().parse().map_err(|e| {
        DriverError::InvalidInput(format!("Cannot parse email address {}: {}", recipient, e))
    })?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(plain_body.to_owned(), html_body.to_owned()))
        .map_err(|e| DriverError::BackendError(format!("Failed to build message: {}", e)))
}

/// Mailer backed by a real SMTP connection using `lettre`.
#[derive(Clone)]
pub struct LettreMailer {
    /// The SMTP transport, which pools connections to the relay.
    transport: AsyncSmtpTransport<Tokio1Executor>,

    /// Sender of all messages.
    from: Mailbox,
}

impl LettreMailer {
    /// Prepares a mailer for the relay configured in `opts`.
    ///
    /// Connections are only established when the first message is sent.
    pub fn connect(opts: SmtpOptions) -> Result<Self, String> {
        let from = opts
            .from
            .parse::<Mailbox>()
            .map_err(|e| format!("Invalid sender address {}: {}", opts.from, e))?;
        let creds = Credentials::new(opts.username, opts.password);
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&opts.relay)
            .map_err(|e| format!("{}", e))?
            .credentials(creds)
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send(
        &self,
        subject: &str,
        plain_body: &str,
        html_body: &str,
        recipient: &EmailAddress,
    ) -> DriverResult<()> {
        let message = build_message(&self.from, subject, plain_body, html_body, recipient)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DriverError::BackendError(format!("SMTP communication failed: {}", e)))?;
        Ok(())
    }
}
