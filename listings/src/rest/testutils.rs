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

//! Test utilities for the REST interface.

use crate::driver::testutils::TestContext as DriverTestContext;
use crate::model::{AccessToken, User};
use crate::rest::app;
use axum::Router;
use std::ops::Deref;

/// State of a running test.
///
/// Dereferences to the driver's test context to give direct access to the backing state.
pub(crate) struct TestContext {
    /// Backing state shared with the driver tests.
    inner: DriverTestContext,

    /// The router under test.
    app: Router,
}

impl TestContext {
    /// Initializes the app against fresh backing state.
    pub(crate) async fn setup() -> Self {
        let inner = DriverTestContext::setup().await;
        let app = app(inner.driver());
        Self { inner, app }
    }

    /// Gets a clone of the app router.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Consumes the context and transforms it into the app router.
    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    /// Creates a regular user named `username` and opens a session for them.
    pub(crate) async fn login(&self, username: &'static str) -> (User, AccessToken) {
        let user = self.inner.create_user(username).await;
        let token = self.inner.create_session(&user).await;
        (user, token)
    }

    /// Creates a staff user named `username` and opens a session for them.
    pub(crate) async fn login_staff(&self, username: &'static str) -> (User, AccessToken) {
        let user = self.inner.create_staff(username).await;
        let token = self.inner.create_session(&user).await;
        (user, token)
    }
}

impl Deref for TestContext {
    type Target = DriverTestContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
