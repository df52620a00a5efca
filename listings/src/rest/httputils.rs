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

//! Utilities to authenticate requests with bearer tokens.

use crate::driver::Driver;
use crate::model::{AccessToken, User};
use axum::http::HeaderMap;
use travel_core::driver::DriverError;
use travel_core::rest::{RestError, RestResult, get_unique_header};

/// Authorization scheme accepted by the service.
const SCHEME: &str = "Bearer";

/// Realm reported to clients that fail to authenticate.
pub(crate) const REALM: &str = "travel";

/// Builds the error returned when a request cannot be authenticated.
fn unauthorized<S: Into<String>>(message: S) -> RestError {
    RestError::Unauthorized { scheme: SCHEME, realm: REALM, message: message.into() }
}

/// Extracts the bearer access token carried in the `Authorization` header of `headers`.
pub(crate) fn get_bearer_auth(headers: &HeaderMap) -> RestResult<AccessToken> {
    let authz = match get_unique_header(headers, "Authorization") {
        Ok(Some(value)) => value,
        Ok(None) => return Err(unauthorized("Missing Authorization header")),
        Err(e) => return Err(unauthorized(e.to_string())),
    };

    let authz = authz
        .to_str()
        .map_err(|e| unauthorized(format!("Bad encoding in Authorization header: {}", e)))?;

    let payload = match authz.split_once(' ') {
        Some((scheme, payload)) if scheme == SCHEME => payload,
        Some(_) => return Err(unauthorized("Unsupported scheme")),
        None => return Err(unauthorized("Bad Authorization header: missing payload")),
    };

    AccessToken::new(payload).map_err(|e| unauthorized(e.to_string()))
}

/// Resolves the requester of a request given its `headers`.
///
/// Tokens that do not belong to any session are reported as an authentication failure rather
/// than as a missing entity.
pub(crate) async fn get_requester(driver: Driver, headers: &HeaderMap) -> RestResult<User> {
    let access_token = get_bearer_auth(headers)?;
    match driver.authenticate(&access_token).await {
        Ok(user) => Ok(user),
        Err(DriverError::NotFound(message)) => Err(unauthorized(message)),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    /// Runs `get_bearer_auth` with the header `values` and expects an `Unauthorized` error whose
    /// message contains `exp_error`.
    fn do_get_bearer_auth_error_test(exp_error: &str, values: &[&[u8]]) {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append("Authorization", HeaderValue::from_bytes(value).unwrap());
        }
        match get_bearer_auth(&headers) {
            Err(RestError::Unauthorized { scheme, realm, message }) => {
                assert_eq!("Bearer", scheme);
                assert_eq!("travel", realm);
                assert!(message.contains(exp_error), "'{}' not in '{}'", exp_error, message);
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
            Ok(_) => panic!("Authentication should have failed"),
        }
    }

    #[test]
    fn test_get_bearer_auth_ok() {
        let token = AccessToken::generate();
        let mut headers = HeaderMap::new();
        headers.append("Authorization", format!("Bearer {}", token.as_str()).parse().unwrap());
        assert_eq!(token, get_bearer_auth(&headers).unwrap());
    }

    #[test]
    fn test_get_bearer_auth_missing() {
        do_get_bearer_auth_error_test("Missing Authorization header", &[]);
    }

    #[test]
    fn test_get_bearer_auth_duplicate() {
        let token = AccessToken::generate();
        let value = format!("Bearer {}", token.as_str());
        do_get_bearer_auth_error_test("more than one value", &[value.as_bytes(), value.as_bytes()]);
    }

    #[test]
    fn test_get_bearer_auth_bad_encoding() {
        do_get_bearer_auth_error_test("Bad encoding", &[b"Bearer \xff"]);
    }

    #[test]
    fn test_get_bearer_auth_bad_scheme() {
        do_get_bearer_auth_error_test("Unsupported scheme", &[b"Basic abcd"]);
    }

    #[test]
    fn test_get_bearer_auth_missing_payload() {
        do_get_bearer_auth_error_test("missing payload", &[b"Bearer"]);
    }

    #[test]
    fn test_get_bearer_auth_invalid_token() {
        do_get_bearer_auth_error_test("Invalid access token", &[b"Bearer short"]);
    }
}
