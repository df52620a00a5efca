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

//! Operations on listings.

use crate::db;
use crate::driver::{Driver, not_found};
use crate::model::*;
use travel_core::driver::{DriverError, DriverResult};
use travel_core::model::ModelResult;

/// Ensures that `requester` owns `listing`.
fn check_owner(listing: &Listing, requester: &User) -> DriverResult<()> {
    if listing.owner() != requester.username() {
        return Err(DriverError::Forbidden(
            "You do not have permission to modify this listing.".to_owned(),
        ));
    }
    Ok(())
}

impl Driver {
    /// Gets all listings that match `query`.
    pub(crate) async fn get_listings(self, query: &ListingsQuery) -> DriverResult<Vec<Listing>> {
        let listings = db::find_listings(&mut self.db.ex().await?, query).await?;
        Ok(listings)
    }

    /// Gets the listing identified by `id`.
    pub(crate) async fn get_listing(self, id: ListingId) -> DriverResult<Listing> {
        db::get_listing(&mut self.db.ex().await?, id).await.map_err(not_found("Listing"))
    }

    /// Gets the images attached to the listing identified by `id`.
    pub(crate) async fn get_listing_images(self, id: ListingId) -> DriverResult<Vec<ListingImage>> {
        let mut tx = self.db.begin().await?;
        db::get_listing(tx.ex(), id).await.map_err(not_found("Listing"))?;
        let images = db::get_images(tx.ex(), Some(id)).await?;
        tx.commit().await?;
        Ok(images)
    }

    /// Creates a new listing owned by `requester` and notifies them about it.
    pub(crate) async fn create_listing(
        self,
        requester: &User,
        fields: ListingFields,
    ) -> DriverResult<Listing> {
        let now = self.clock.now_utc();
        let owner = requester.username().clone();
        let listing = Listing::new(ListingId::generate(), owner, fields, now, now);
        db::put_listing(&mut self.db.ex().await?, &listing).await?;

        self.enqueue(Job::ListingNotification(ListingNotificationJob {
            listing_id: *listing.id(),
            title: listing.fields().title().clone(),
            recipient: requester.email().clone(),
        }));

        Ok(listing)
    }

    /// Replaces the fields of the listing `id` with the result of applying `modify` to its current
    /// fields, as long as `requester` owns the listing.
    async fn modify_listing<F>(
        self,
        requester: &User,
        id: ListingId,
        modify: F,
    ) -> DriverResult<Listing>
    where
        F: FnOnce(ListingFields) -> ModelResult<ListingFields>,
    {
        let mut tx = self.db.begin().await?;
        let listing = db::get_listing(tx.ex(), id).await.map_err(not_found("Listing"))?;
        check_owner(&listing, requester)?;

        let fields = modify(listing.fields().clone())?;
        let listing = listing.with_fields(fields, self.clock.now_utc());
        db::update_listing(tx.ex(), &listing).await?;
        tx.commit().await?;
        Ok(listing)
    }

    /// Replaces all the fields of the listing `id`.
    pub(crate) async fn update_listing(
        self,
        requester: &User,
        id: ListingId,
        fields: ListingFields,
    ) -> DriverResult<Listing> {
        self.modify_listing(requester, id, |_| Ok(fields)).await
    }

    /// Updates the listing `id` with the fields present in `patch`.
    pub(crate) async fn patch_listing(
        self,
        requester: &User,
        id: ListingId,
        patch: ListingPatch,
    ) -> DriverResult<Listing> {
        self.modify_listing(requester, id, |fields| patch.apply(fields)).await
    }

    /// Deletes the listing `id` together with its images and bookings.
    pub(crate) async fn delete_listing(self, requester: &User, id: ListingId) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let listing = db::get_listing(tx.ex(), id).await.map_err(not_found("Listing"))?;
        check_owner(&listing, requester)?;
        db::delete_listing(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use std::str::FromStr;
    use time::macros::datetime;
    use travel_core::db::DbError;

    /// Creates a valid set of listing fields.
    fn fields(title: &str, available: bool) -> ListingFields {
        let price = Price::from_str("80.25").unwrap();
        ListingFields::new(title, "Sunny", "Porto", "Portugal", price, available).unwrap()
    }

    #[tokio::test]
    async fn test_get_listings_filters() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing1 = context.create_listing(&host, "First", true).await;
        context.create_listing(&host, "Second", false).await;

        let query = ListingsQuery { available: Some("true".to_owned()), ..Default::default() };
        assert_eq!(vec![listing1], context.driver().get_listings(&query).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_listing_ok_and_not_found() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "First", true).await;

        assert_eq!(listing, context.driver().get_listing(*listing.id()).await.unwrap());
        assert_eq!(
            DriverError::NotFound("Listing not found".to_owned()),
            context.driver().get_listing(ListingId::generate()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_get_listing_images() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "First", true).await;
        let other = context.create_listing(&host, "Second", true).await;
        let image1 = context.create_image(&listing, true).await;
        context.create_image(&other, true).await;
        let image2 = context.create_image(&listing, false).await;

        assert_eq!(
            vec![image1, image2],
            context.driver().get_listing_images(*listing.id()).await.unwrap()
        );
        assert_eq!(
            DriverError::NotFound("Listing not found".to_owned()),
            context.driver().get_listing_images(ListingId::generate()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_create_listing_ok() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        context.clock().set(datetime!(2024-02-03 04:05:06 UTC));

        let listing = context.driver().create_listing(&host, fields("Loft", true)).await.unwrap();
        assert_eq!(host.username(), listing.owner());
        assert_eq!(datetime!(2024-02-03 04:05:06 UTC), *listing.created_at());
        assert_eq!(listing.created_at(), listing.updated_at());
        assert_eq!(listing, db::get_listing(&mut context.ex().await, *listing.id()).await.unwrap());

        assert_eq!(
            vec![Job::ListingNotification(ListingNotificationJob {
                listing_id: *listing.id(),
                title: "Loft".to_owned(),
                recipient: host.email().clone(),
            })],
            context.jobs().take()
        );
    }

    #[tokio::test]
    async fn test_create_listing_enqueue_failure_is_not_fatal() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        context.jobs().close();

        let listing = context.driver().create_listing(&host, fields("Loft", true)).await.unwrap();
        db::get_listing(&mut context.ex().await, *listing.id()).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_listing_ok() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "Old", true).await;
        context.clock().set(datetime!(2024-03-01 00:00:00 UTC));

        let updated = context
            .driver()
            .update_listing(&host, *listing.id(), fields("New", false))
            .await
            .unwrap();
        assert_eq!(&fields("New", false), updated.fields());
        assert_eq!(listing.created_at(), updated.created_at());
        assert_eq!(datetime!(2024-03-01 00:00:00 UTC), *updated.updated_at());
        assert_eq!(updated, db::get_listing(&mut context.ex().await, *listing.id()).await.unwrap());
        assert!(context.jobs().take().is_empty());
    }

    #[tokio::test]
    async fn test_patch_listing_ok() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "Old", true).await;

        let patch = ListingPatch { available: Some(false), ..Default::default() };
        let updated = context.driver().patch_listing(&host, *listing.id(), patch).await.unwrap();
        assert!(!*updated.fields().available());
        assert_eq!(listing.fields().title(), updated.fields().title());
    }

    #[tokio::test]
    async fn test_patch_listing_invalid() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "Old", true).await;

        let patch = ListingPatch { title: Some(" ".to_owned()), ..Default::default() };
        assert_eq!(
            DriverError::InvalidInput("Title cannot be empty".to_owned()),
            context.driver().patch_listing(&host, *listing.id(), patch).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_modify_listing_not_owner() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let other = context.create_user("other").await;
        let listing = context.create_listing(&host, "Mine", true).await;

        let exp_err = DriverError::Forbidden(
            "You do not have permission to modify this listing.".to_owned(),
        );
        assert_eq!(
            exp_err,
            context
                .driver()
                .update_listing(&other, *listing.id(), fields("Theirs", true))
                .await
                .unwrap_err()
        );
        assert_eq!(
            exp_err,
            context
                .driver()
                .patch_listing(&other, *listing.id(), ListingPatch::default())
                .await
                .unwrap_err()
        );
        assert_eq!(
            exp_err,
            context.driver().delete_listing(&other, *listing.id()).await.unwrap_err()
        );
        assert_eq!(listing, db::get_listing(&mut context.ex().await, *listing.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_modify_listing_not_found() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;

        assert_eq!(
            DriverError::NotFound("Listing not found".to_owned()),
            context
                .driver()
                .update_listing(&host, ListingId::generate(), fields("X", true))
                .await
                .unwrap_err()
        );
        assert_eq!(
            DriverError::NotFound("Listing not found".to_owned()),
            context.driver().delete_listing(&host, ListingId::generate()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_delete_listing_cascades() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Mine", true).await;
        let image = context.create_image(&listing, true).await;
        let booking = context.create_booking(&listing, &guest, None, None).await;

        context.driver().delete_listing(&host, *listing.id()).await.unwrap();

        let mut ex = context.ex().await;
        assert_eq!(DbError::NotFound, db::get_listing(&mut ex, *listing.id()).await.unwrap_err());
        assert_eq!(DbError::NotFound, db::get_image(&mut ex, *image.id()).await.unwrap_err());
        assert_eq!(DbError::NotFound, db::get_booking(&mut ex, *booking.id()).await.unwrap_err());
    }
}
