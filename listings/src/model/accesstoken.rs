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

//! The `AccessToken` data type.

use rand::Rng;
use std::fmt;
use travel_core::model::{ModelError, ModelResult};

/// Length of our access tokens, in characters.
///
/// This is replicated in the database schema.
const TOKEN_LENGTH: usize = 64;

/// An opaque token that identifies a user session.
///
/// Tokens are issued by the identity provider and presented by clients as bearer credentials.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Creates a new access token from an untrusted string.
    pub fn new<S: Into<String>>(token: S) -> ModelResult<Self> {
        let token = token.into();
        if token.len() != TOKEN_LENGTH || !token.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ModelError("Invalid access token".to_owned()));
        }
        Ok(Self(token))
    }

    /// Generates a new random access token.
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let mut rng = rand::rng();
        let token = (0..TOKEN_LENGTH)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect::<String>();
        Self(token)
    }

    /// Returns the string representation of the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed access token")
    }
}
