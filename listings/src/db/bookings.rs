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

//! Persistence of bookings.

use super::corrupted;
use crate::model::{Booking, BookingDetails, BookingId, ListingId, Price};
use sqlx::Row;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use time::{Date, OffsetDateTime};
#[cfg(feature = "postgres")]
use travel_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use travel_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use travel_core::db::{DbError, DbResult, Executor, count_as_usize, ensure_one_row};
use travel_core::model::Username;
use uuid::Uuid;

/// Builds a booking from its raw database representation.
#[allow(clippy::too_many_arguments)]
fn build_booking(
    id: Uuid,
    listing: Uuid,
    username: String,
    check_in: Option<Date>,
    check_out: Option<Date>,
    total_price_cents: i64,
    number_of_guests: i32,
    created_at: OffsetDateTime,
) -> DbResult<Booking> {
    let number_of_guests =
        u16::try_from(number_of_guests).map_err(corrupted("number_of_guests"))?;
    let details = BookingDetails::new(
        check_in,
        check_out,
        Price::from_cents(total_price_cents)?,
        number_of_guests,
    )?;
    Ok(Booking::new(
        BookingId::from(id),
        ListingId::from(listing),
        Username::new(username)?,
        details,
        created_at,
    ))
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for Booking {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: Uuid = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let listing: Uuid = row.try_get("listing").map_err(postgres::map_sqlx_error)?;
        let username: String = row.try_get("username").map_err(postgres::map_sqlx_error)?;
        let check_in: Option<Date> = row.try_get("check_in").map_err(postgres::map_sqlx_error)?;
        let check_out: Option<Date> =
            row.try_get("check_out").map_err(postgres::map_sqlx_error)?;
        let total_price_cents: i64 =
            row.try_get("total_price_cents").map_err(postgres::map_sqlx_error)?;
        let number_of_guests: i32 =
            row.try_get("number_of_guests").map_err(postgres::map_sqlx_error)?;
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;

        build_booking(
            id,
            listing,
            username,
            check_in,
            check_out,
            total_price_cents,
            number_of_guests,
            created_at,
        )
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for Booking {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: Uuid = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let listing: Uuid = row.try_get("listing").map_err(sqlite::map_sqlx_error)?;
        let username: String = row.try_get("username").map_err(sqlite::map_sqlx_error)?;
        let check_in: Option<Date> = row.try_get("check_in").map_err(sqlite::map_sqlx_error)?;
        let check_out: Option<Date> = row.try_get("check_out").map_err(sqlite::map_sqlx_error)?;
        let total_price_cents: i64 =
            row.try_get("total_price_cents").map_err(sqlite::map_sqlx_error)?;
        let number_of_guests: i32 =
            row.try_get("number_of_guests").map_err(sqlite::map_sqlx_error)?;
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;

        build_booking(
            id,
            listing,
            username,
            check_in,
            check_out,
            total_price_cents,
            number_of_guests,
            build_timestamp(created_at_secs, created_at_nsecs)?,
        )
    }
}

/// Inserts a new `booking`.
///
/// Fails with `DbError::NotFound` if the listing the booking refers to does not exist.
pub async fn put_booking(ex: &mut Executor, booking: &Booking) -> DbResult<()> {
    let details = booking.details();
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO bookings (
                    id, listing, username, check_in, check_out, total_price_cents,
                    number_of_guests, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";
            let done = sqlx::query(query_str)
                .bind(booking.id().as_uuid())
                .bind(booking.listing().as_uuid())
                .bind(booking.user().as_str())
                .bind(*details.check_in())
                .bind(*details.check_out())
                .bind(details.total_price().as_cents())
                .bind(i32::from(*details.number_of_guests()))
                .bind(*booking.created_at())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_secs, created_at_nsecs) = unpack_timestamp(*booking.created_at())?;
            let query_str = "
                INSERT INTO bookings (
                    id, listing, username, check_in, check_out, total_price_cents,
                    number_of_guests, created_at_secs, created_at_nsecs
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(booking.id().as_uuid())
                .bind(booking.listing().as_uuid())
                .bind(booking.user().as_str())
                .bind(*details.check_in())
                .bind(*details.check_out())
                .bind(details.total_price().as_cents())
                .bind(i32::from(*details.number_of_guests()))
                .bind(created_at_secs)
                .bind(created_at_nsecs)
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

/// Gets the booking identified by `id`.
pub async fn get_booking(ex: &mut Executor, id: BookingId) -> DbResult<Booking> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let raw = sqlx::query("SELECT * FROM bookings WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            Booking::try_from(raw)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let raw = sqlx::query("SELECT * FROM bookings WHERE id = ?")
                .bind(id.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            Booking::try_from(raw)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets all bookings in creation order, optionally restricted to those made by `user`.
pub async fn get_bookings(ex: &mut Executor, user: Option<&Username>) -> DbResult<Vec<Booking>> {
    let user = user.map(Username::as_str);
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT * FROM bookings
                WHERE $1::VARCHAR IS NULL OR username = $1
                ORDER BY created_at, id";
            let rows = sqlx::query(query_str)
                .bind(user)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            rows.into_iter().map(Booking::try_from).collect()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT * FROM bookings
                WHERE ?1 IS NULL OR username = ?1
                ORDER BY created_at_secs, created_at_nsecs, id";
            let rows = sqlx::query(query_str)
                .bind(user)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            rows.into_iter().map(Booking::try_from).collect()
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Replaces the listing and the details of an existing `booking`.
///
/// The guest and the creation time never change after creation, so they are not touched.
pub async fn update_booking(ex: &mut Executor, booking: &Booking) -> DbResult<()> {
    let details = booking.details();
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE bookings
                SET listing = $1, check_in = $2, check_out = $3, total_price_cents = $4,
                    number_of_guests = $5
                WHERE id = $6";
            let done = sqlx::query(query_str)
                .bind(booking.listing().as_uuid())
                .bind(*details.check_in())
                .bind(*details.check_out())
                .bind(details.total_price().as_cents())
                .bind(i32::from(*details.number_of_guests()))
                .bind(booking.id().as_uuid())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                UPDATE bookings
                SET listing = ?, check_in = ?, check_out = ?, total_price_cents = ?,
                    number_of_guests = ?
                WHERE id = ?";
            let done = sqlx::query(query_str)
                .bind(booking.listing().as_uuid())
                .bind(*details.check_in())
                .bind(*details.check_out())
                .bind(details.total_price().as_cents())
                .bind(i32::from(*details.number_of_guests()))
                .bind(booking.id().as_uuid())
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

/// Deletes the booking identified by `id`.
pub async fn delete_booking(ex: &mut Executor, id: BookingId) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("DELETE FROM bookings WHERE id = $1")
                .bind(id.as_uuid())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("DELETE FROM bookings WHERE id = ?")
                .bind(id.as_uuid())
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

/// Counts the bookings of `listing` whose stay overlaps the `[check_in, check_out)` range.
///
/// Two stays overlap when each one starts before the other ends, so a stay that begins on the
/// day another one ends does not conflict with it.  Bookings without both dates never overlap
/// anything.  The booking identified by `exclude`, if any, is ignored so that a booking being
/// modified does not conflict with itself.
pub async fn count_overlapping_bookings(
    ex: &mut Executor,
    listing: ListingId,
    check_in: Date,
    check_out: Date,
    exclude: Option<BookingId>,
) -> DbResult<usize> {
    let exclude = exclude.map(|id| *id.as_uuid());
    let count: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT COUNT(*) AS count FROM bookings
                WHERE listing = $1 AND check_out > $2 AND check_in < $3
                    AND ($4::UUID IS NULL OR id <> $4)";
            let row = sqlx::query(query_str)
                .bind(listing.as_uuid())
                .bind(check_in)
                .bind(check_out)
                .bind(exclude)
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("count").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT COUNT(*) AS count FROM bookings
                WHERE listing = ?1 AND check_out > ?2 AND check_in < ?3
                    AND (?4 IS NULL OR id <> ?4)";
            let row = sqlx::query(query_str)
                .bind(listing.as_uuid())
                .bind(check_in)
                .bind(check_out)
                .bind(exclude)
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            row.try_get("count").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    count_as_usize(count)
}
