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

//! Persistence of the images attached to listings.

use super::corrupted;
use crate::model::{ImageId, ListingId, ListingImage, NewImage};
use sqlx::Row;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use time::OffsetDateTime;
#[cfg(feature = "postgres")]
use travel_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use travel_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use travel_core::db::{DbError, DbResult, Executor, count_as_usize, ensure_one_row};
use url::Url;
use uuid::Uuid;

/// Builds an image from its raw database representation.
fn build_image(
    id: Uuid,
    listing: Uuid,
    image_url: String,
    caption: Option<String>,
    is_primary: bool,
    uploaded_at: OffsetDateTime,
) -> DbResult<ListingImage> {
    let image_url = Url::parse(&image_url).map_err(corrupted("image_url"))?;
    let image = NewImage::new(ListingId::from(listing), image_url, caption)?;
    Ok(ListingImage::new(ImageId::from(id), image, is_primary, uploaded_at))
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for ListingImage {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: Uuid = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let listing: Uuid = row.try_get("listing").map_err(postgres::map_sqlx_error)?;
        let image_url: String = row.try_get("image_url").map_err(postgres::map_sqlx_error)?;
        let caption: Option<String> = row.try_get("caption").map_err(postgres::map_sqlx_error)?;
        let is_primary: bool = row.try_get("is_primary").map_err(postgres::map_sqlx_error)?;
        let uploaded_at: OffsetDateTime =
            row.try_get("uploaded_at").map_err(postgres::map_sqlx_error)?;

        build_image(id, listing, image_url, caption, is_primary, uploaded_at)
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for ListingImage {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: Uuid = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let listing: Uuid = row.try_get("listing").map_err(sqlite::map_sqlx_error)?;
        let image_url: String = row.try_get("image_url").map_err(sqlite::map_sqlx_error)?;
        let caption: Option<String> = row.try_get("caption").map_err(sqlite::map_sqlx_error)?;
        let is_primary: bool = row.try_get("is_primary").map_err(sqlite::map_sqlx_error)?;
        let uploaded_at_secs: i64 =
            row.try_get("uploaded_at_secs").map_err(sqlite::map_sqlx_error)?;
        let uploaded_at_nsecs: i64 =
            row.try_get("uploaded_at_nsecs").map_err(sqlite::map_sqlx_error)?;

        let uploaded_at = build_timestamp(uploaded_at_secs, uploaded_at_nsecs)?;
        build_image(id, listing, image_url, caption, is_primary, uploaded_at)
    }
}

/// Inserts a new `image`.
///
/// Fails with `DbError::NotFound` if the listing the image refers to does not exist.
pub async fn put_image(ex: &mut Executor, image: &ListingImage) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO listing_images
                    (id, listing, image_url, caption, is_primary, uploaded_at)
                VALUES ($1, $2, $3, $4, $5, $6)";
            let done = sqlx::query(query_str)
                .bind(image.id().as_uuid())
                .bind(image.listing().as_uuid())
                .bind(image.image_url().as_str())
                .bind(image.caption().as_deref())
                .bind(*image.is_primary())
                .bind(*image.uploaded_at())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (uploaded_at_secs, uploaded_at_nsecs) = unpack_timestamp(*image.uploaded_at())?;
            let query_str = "
                INSERT INTO listing_images
                    (id, listing, image_url, caption, is_primary, uploaded_at_secs,
                    uploaded_at_nsecs)
                VALUES (?, ?, ?, ?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(image.id().as_uuid())
                .bind(image.listing().as_uuid())
                .bind(image.image_url().as_str())
                .bind(image.caption().as_deref())
                .bind(*image.is_primary())
                .bind(uploaded_at_secs)
                .bind(uploaded_at_nsecs)
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

/// Gets the image identified by `id`.
pub async fn get_image(ex: &mut Executor, id: ImageId) -> DbResult<ListingImage> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let raw = sqlx::query("SELECT * FROM listing_images WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            ListingImage::try_from(raw)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let raw = sqlx::query("SELECT * FROM listing_images WHERE id = ?")
                .bind(id.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            ListingImage::try_from(raw)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets all images in upload order, optionally restricted to those attached to `listing`.
pub async fn get_images(
    ex: &mut Executor,
    listing: Option<ListingId>,
) -> DbResult<Vec<ListingImage>> {
    let listing = listing.map(|id| *id.as_uuid());
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT * FROM listing_images
                WHERE $1::UUID IS NULL OR listing = $1
                ORDER BY uploaded_at, id";
            let rows = sqlx::query(query_str)
                .bind(listing)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            rows.into_iter().map(ListingImage::try_from).collect()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT * FROM listing_images
                WHERE ?1 IS NULL OR listing = ?1
                ORDER BY uploaded_at_secs, uploaded_at_nsecs, id";
            let rows = sqlx::query(query_str)
                .bind(listing)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            rows.into_iter().map(ListingImage::try_from).collect()
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Counts the images attached to `listing`.
pub async fn count_images(ex: &mut Executor, listing: ListingId) -> DbResult<usize> {
    let count: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT COUNT(*) AS count FROM listing_images WHERE listing = $1";
            let row = sqlx::query(query_str)
                .bind(listing.as_uuid())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("count").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT COUNT(*) AS count FROM listing_images WHERE listing = ?";
            let row = sqlx::query(query_str)
                .bind(listing.as_uuid())
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

/// Deletes the image identified by `id`.
pub async fn delete_image(ex: &mut Executor, id: ImageId) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("DELETE FROM listing_images WHERE id = $1")
                .bind(id.as_uuid())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("DELETE FROM listing_images WHERE id = ?")
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
