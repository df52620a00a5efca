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

//! Persistence of listings.

use crate::model::{Listing, ListingFields, ListingId, ListingsQuery, Price, SortField, SortKey};
use sqlx::{Database, Encode, QueryBuilder, Row, Type};
#[cfg(feature = "postgres")]
use sqlx::postgres::{PgRow, Postgres};
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::{Sqlite, SqliteRow};
use time::OffsetDateTime;
#[cfg(feature = "postgres")]
use travel_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use travel_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use travel_core::db::{DbError, DbResult, Executor, ensure_one_row};
use travel_core::model::Username;
use uuid::Uuid;

/// Columns matched by the free-text search of listings.
const SEARCH_COLUMNS: &[&str] = &["title", "description", "city", "country"];

/// Escapes the wildcards of a `LIKE` pattern so that `term` matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Appends the filters and the ordering requested by `query` to a `SELECT` on `listings`.
///
/// Ties are broken by creation time and then by identifier so that results are stable.
/// `like` is the case-insensitive pattern matching operator of the backend and
/// `created_at_columns` lists the columns that hold the creation timestamp.
fn push_query<'args, DB>(
    qb: &mut QueryBuilder<'args, DB>,
    query: &ListingsQuery,
    like: &str,
    created_at_columns: &[&str],
) where
    DB: Database,
    bool: Encode<'args, DB> + Type<DB>,
    String: Encode<'args, DB> + Type<DB>,
{
    let mut separator = " WHERE ";

    if let Some(available) = query.available_filter() {
        qb.push(separator).push("available = ").push_bind(available);
        separator = " AND ";
    }

    if let Some(owner) = query.owner_filter() {
        qb.push(separator).push("owner = ").push_bind(owner);
        separator = " AND ";
    }

    // Every term must appear in at least one of the searchable columns.
    for term in query.search_terms() {
        let pattern = format!("%{}%", escape_like(term));
        qb.push(separator).push("(");
        for (i, column) in SEARCH_COLUMNS.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(column).push(" ").push(like).push(" ").push_bind(pattern.clone());
            qb.push(" ESCAPE '\\'");
        }
        qb.push(")");
        separator = " AND ";
    }

    qb.push(" ORDER BY ");
    let mut keys = query.sort_keys();
    if !keys.iter().any(|k| k.field == SortField::CreatedAt) {
        keys.push(SortKey { field: SortField::CreatedAt, descending: false });
    }
    for key in keys {
        let direction = if key.descending { "DESC" } else { "ASC" };
        let columns = match key.field {
            SortField::PricePerNight => &["price_per_night_cents"][..],
            SortField::CreatedAt => created_at_columns,
        };
        for column in columns {
            qb.push(column).push(" ").push(direction).push(", ");
        }
    }
    qb.push("id ASC");
}

/// Builds the fields of a listing from their raw database representation.
fn build_fields(
    title: String,
    description: String,
    city: String,
    country: String,
    price_per_night_cents: i64,
    available: bool,
) -> DbResult<ListingFields> {
    let price_per_night = Price::from_cents(price_per_night_cents)?;
    Ok(ListingFields::new(title, description, city, country, price_per_night, available)?)
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for Listing {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: Uuid = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let owner: String = row.try_get("owner").map_err(postgres::map_sqlx_error)?;
        let title: String = row.try_get("title").map_err(postgres::map_sqlx_error)?;
        let description: String = row.try_get("description").map_err(postgres::map_sqlx_error)?;
        let city: String = row.try_get("city").map_err(postgres::map_sqlx_error)?;
        let country: String = row.try_get("country").map_err(postgres::map_sqlx_error)?;
        let price_per_night_cents: i64 =
            row.try_get("price_per_night_cents").map_err(postgres::map_sqlx_error)?;
        let available: bool = row.try_get("available").map_err(postgres::map_sqlx_error)?;
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;
        let updated_at: OffsetDateTime =
            row.try_get("updated_at").map_err(postgres::map_sqlx_error)?;

        let fields =
            build_fields(title, description, city, country, price_per_night_cents, available)?;
        Ok(Listing::new(ListingId::from(id), Username::new(owner)?, fields, created_at, updated_at))
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for Listing {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: Uuid = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let owner: String = row.try_get("owner").map_err(sqlite::map_sqlx_error)?;
        let title: String = row.try_get("title").map_err(sqlite::map_sqlx_error)?;
        let description: String = row.try_get("description").map_err(sqlite::map_sqlx_error)?;
        let city: String = row.try_get("city").map_err(sqlite::map_sqlx_error)?;
        let country: String = row.try_get("country").map_err(sqlite::map_sqlx_error)?;
        let price_per_night_cents: i64 =
            row.try_get("price_per_night_cents").map_err(sqlite::map_sqlx_error)?;
        let available: bool = row.try_get("available").map_err(sqlite::map_sqlx_error)?;
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let updated_at_secs: i64 = row.try_get("updated_at_secs").map_err(sqlite::map_sqlx_error)?;
        let updated_at_nsecs: i64 =
            row.try_get("updated_at_nsecs").map_err(sqlite::map_sqlx_error)?;

        let fields =
            build_fields(title, description, city, country, price_per_night_cents, available)?;
        Ok(Listing::new(
            ListingId::from(id),
            Username::new(owner)?,
            fields,
            build_timestamp(created_at_secs, created_at_nsecs)?,
            build_timestamp(updated_at_secs, updated_at_nsecs)?,
        ))
    }
}

/// Inserts a new `listing`.
pub async fn put_listing(ex: &mut Executor, listing: &Listing) -> DbResult<()> {
    let fields = listing.fields();
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO listings (
                    id, owner, title, description, city, country, price_per_night_cents,
                    available, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";
            let done = sqlx::query(query_str)
                .bind(listing.id().as_uuid())
                .bind(listing.owner().as_str())
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.city())
                .bind(fields.country())
                .bind(fields.price_per_night().as_cents())
                .bind(*fields.available())
                .bind(*listing.created_at())
                .bind(*listing.updated_at())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_secs, created_at_nsecs) = unpack_timestamp(*listing.created_at())?;
            let (updated_at_secs, updated_at_nsecs) = unpack_timestamp(*listing.updated_at())?;
            let query_str = "
                INSERT INTO listings (
                    id, owner, title, description, city, country, price_per_night_cents,
                    available, created_at_secs, created_at_nsecs, updated_at_secs,
                    updated_at_nsecs
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(listing.id().as_uuid())
                .bind(listing.owner().as_str())
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.city())
                .bind(fields.country())
                .bind(fields.price_per_night().as_cents())
                .bind(*fields.available())
                .bind(created_at_secs)
                .bind(created_at_nsecs)
                .bind(updated_at_secs)
                .bind(updated_at_nsecs)
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

/// Gets the listing identified by `id`.
pub async fn get_listing(ex: &mut Executor, id: ListingId) -> DbResult<Listing> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let raw = sqlx::query("SELECT * FROM listings WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            Listing::try_from(raw)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let raw = sqlx::query("SELECT * FROM listings WHERE id = ?")
                .bind(id.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            Listing::try_from(raw)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets all listings that match the filters in `query`, sorted as `query` requests.
pub async fn find_listings(ex: &mut Executor, query: &ListingsQuery) -> DbResult<Vec<Listing>> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM listings");
            push_query(&mut qb, query, "ILIKE", &["created_at"]);
            let rows = qb.build().fetch_all(ex.conn()).await.map_err(postgres::map_sqlx_error)?;
            rows.into_iter().map(Listing::try_from).collect()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            // LIKE is already case-insensitive for ASCII characters in SQLite.
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM listings");
            push_query(&mut qb, query, "LIKE", &["created_at_secs", "created_at_nsecs"]);
            let rows = qb.build().fetch_all(ex.conn()).await.map_err(sqlite::map_sqlx_error)?;
            rows.into_iter().map(Listing::try_from).collect()
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Replaces the mutable details of an existing `listing`.
///
/// The owner and the creation time never change after creation, so they are not touched.
pub async fn update_listing(ex: &mut Executor, listing: &Listing) -> DbResult<()> {
    let fields = listing.fields();
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE listings
                SET title = $1, description = $2, city = $3, country = $4,
                    price_per_night_cents = $5, available = $6, updated_at = $7
                WHERE id = $8";
            let done = sqlx::query(query_str)
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.city())
                .bind(fields.country())
                .bind(fields.price_per_night().as_cents())
                .bind(*fields.available())
                .bind(*listing.updated_at())
                .bind(listing.id().as_uuid())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (updated_at_secs, updated_at_nsecs) = unpack_timestamp(*listing.updated_at())?;
            let query_str = "
                UPDATE listings
                SET title = ?, description = ?, city = ?, country = ?,
                    price_per_night_cents = ?, available = ?, updated_at_secs = ?,
                    updated_at_nsecs = ?
                WHERE id = ?";
            let done = sqlx::query(query_str)
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.city())
                .bind(fields.country())
                .bind(fields.price_per_night().as_cents())
                .bind(*fields.available())
                .bind(updated_at_secs)
                .bind(updated_at_nsecs)
                .bind(listing.id().as_uuid())
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

/// Deletes the listing identified by `id` together with its images and bookings.
pub async fn delete_listing(ex: &mut Executor, id: ListingId) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("DELETE FROM listings WHERE id = $1")
                .bind(id.as_uuid())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("DELETE FROM listings WHERE id = ?")
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
