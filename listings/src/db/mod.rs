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

//! Database abstraction for the listings service.
//!
//! Every operation is a free function that receives an `Executor`, which can be a pooled
//! connection or an open transaction.  Callers decide the transactional boundaries.

use crate::model::{AccessToken, User};
use sqlx::Row;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use time::OffsetDateTime;
#[cfg(feature = "postgres")]
use travel_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use travel_core::db::sqlite::{self, unpack_timestamp};
use travel_core::db::{DbError, DbResult, Executor, ensure_one_row};
use travel_core::model::{EmailAddress, Username};

mod bookings;
pub use bookings::*;
mod images;
pub use images::*;
mod listings;
pub use listings::*;


/// Initializes the database schema.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Returns a function that turns a failure to interpret the value of `column` into an error.
fn corrupted<E: std::fmt::Display>(column: &'static str) -> impl FnOnce(E) -> DbError {
    move |e| DbError::DataIntegrityError(format!("Invalid value in column {}: {}", column, e))
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for User {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let username: String = row.try_get("username").map_err(postgres::map_sqlx_error)?;
        let email: String = row.try_get("email").map_err(postgres::map_sqlx_error)?;
        let is_staff: bool = row.try_get("is_staff").map_err(postgres::map_sqlx_error)?;

        Ok(User::new(Username::new(username)?, EmailAddress::new(email)?).with_is_staff(is_staff))
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for User {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let username: String = row.try_get("username").map_err(sqlite::map_sqlx_error)?;
        let email: String = row.try_get("email").map_err(sqlite::map_sqlx_error)?;
        let is_staff: bool = row.try_get("is_staff").map_err(sqlite::map_sqlx_error)?;

        Ok(User::new(Username::new(username)?, EmailAddress::new(email)?).with_is_staff(is_staff))
    }
}

/// Registers a new `user`.
///
/// Accounts are managed by the identity provider: this only mirrors the details that the
/// listings service needs to authorize requests and to address notifications.
pub async fn put_user(ex: &mut Executor, user: &User) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "INSERT INTO users (username, email, is_staff) VALUES ($1, $2, $3)";
            let done = sqlx::query(query_str)
                .bind(user.username().as_str())
                .bind(user.email().as_str())
                .bind(*user.is_staff())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "INSERT INTO users (username, email, is_staff) VALUES (?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(user.username().as_str())
                .bind(user.email().as_str())
                .bind(*user.is_staff())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_one_row(rows_affected)
}

/// Gets information about an existing user named `username`.
pub async fn get_user(ex: &mut Executor, username: &Username) -> DbResult<User> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT * FROM users WHERE username = $1";
            let raw_user = sqlx::query(query_str)
                .bind(username.as_str())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT * FROM users WHERE username = ?";
            let raw_user = sqlx::query(query_str)
                .bind(username.as_str())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Records that `access_token` identifies `username` since `login_time`.
pub async fn put_session(
    ex: &mut Executor,
    access_token: &AccessToken,
    username: &Username,
    login_time: OffsetDateTime,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "INSERT INTO sessions (access_token, username, login_time) VALUES ($1, $2, $3)";
            let done = sqlx::query(query_str)
                .bind(access_token.as_str())
                .bind(username.as_str())
                .bind(login_time)
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (login_time_secs, login_time_nsecs) = unpack_timestamp(login_time)?;
            let query_str = "
                INSERT INTO sessions (access_token, username, login_time_secs, login_time_nsecs)
                VALUES (?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(access_token.as_str())
                .bind(username.as_str())
                .bind(login_time_secs)
                .bind(login_time_nsecs)
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_one_row(rows_affected)
}

/// Gets the user that owns the session identified by `access_token`.
pub async fn get_session_user(ex: &mut Executor, access_token: &AccessToken) -> DbResult<User> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT users.* FROM sessions
                JOIN users ON sessions.username = users.username
                WHERE sessions.access_token = $1";
            let raw_user = sqlx::query(query_str)
                .bind(access_token.as_str())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT users.* FROM sessions
                JOIN users ON sessions.username = users.username
                WHERE sessions.access_token = ?";
            let raw_user = sqlx::query(query_str)
                .bind(access_token.as_str())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}
