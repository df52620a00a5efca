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

//! Operations on listing images.

use crate::db;
use crate::driver::{Driver, not_found};
use crate::model::*;
use travel_core::driver::{DriverError, DriverResult};

impl Driver {
    /// Gets all images of all listings.
    pub(crate) async fn get_images(self) -> DriverResult<Vec<ListingImage>> {
        let images = db::get_images(&mut self.db.ex().await?, None).await?;
        Ok(images)
    }

    /// Gets the image identified by `id`.
    pub(crate) async fn get_image(self, id: ImageId) -> DriverResult<ListingImage> {
        db::get_image(&mut self.db.ex().await?, id).await.map_err(not_found("Image"))
    }

    /// Attaches a new image to a listing owned by `requester`.
    ///
    /// The first image of a listing becomes its primary image.
    pub(crate) async fn create_image(
        self,
        requester: &User,
        image: NewImage,
    ) -> DriverResult<ListingImage> {
        let mut tx = self.db.begin().await?;

        let listing = db::get_listing(tx.ex(), *image.listing())
            .await
            .map_err(not_found("Listing"))?;
        if listing.owner() != requester.username() {
            return Err(DriverError::InvalidInput(
                "You do not have permission to add images to this listing.".to_owned(),
            ));
        }

        let is_primary = db::count_images(tx.ex(), *listing.id()).await? == 0;
        let image = ListingImage::new(ImageId::generate(), image, is_primary, self.clock.now_utc());
        db::put_image(tx.ex(), &image).await.map_err(not_found("Listing"))?;
        tx.commit().await?;
        Ok(image)
    }

    /// Deletes the image `id` if `requester` owns the listing it belongs to.
    pub(crate) async fn delete_image(self, requester: &User, id: ImageId) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let image = db::get_image(tx.ex(), id).await.map_err(not_found("Image"))?;
        let listing = db::get_listing(tx.ex(), *image.listing()).await?;
        if listing.owner() != requester.username() {
            return Err(DriverError::Forbidden(
                "You do not have permission to delete this image.".to_owned(),
            ));
        }
        db::delete_image(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use time::macros::datetime;
    use travel_core::db::DbError;
    use url::Url;

    /// Creates a request to attach an image to `listing`.
    fn new_image(listing: &Listing, caption: Option<&str>) -> NewImage {
        let url = Url::parse("https://images.example.com/new.png").unwrap();
        NewImage::new(*listing.id(), url, caption.map(str::to_owned)).unwrap()
    }

    #[tokio::test]
    async fn test_get_images_and_image() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing1 = context.create_listing(&host, "First", true).await;
        let listing2 = context.create_listing(&host, "Second", true).await;
        let image1 = context.create_image(&listing1, true).await;
        let image2 = context.create_image(&listing2, true).await;

        assert_eq!(vec![image1.clone(), image2], context.driver().get_images().await.unwrap());
        assert_eq!(image1, context.driver().get_image(*image1.id()).await.unwrap());
        assert_eq!(
            DriverError::NotFound("Image not found".to_owned()),
            context.driver().get_image(ImageId::generate()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_create_image_first_is_primary() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "First", true).await;
        context.clock().set(datetime!(2024-05-06 07:08:09 UTC));

        let image1 = context
            .driver()
            .create_image(&host, new_image(&listing, Some("Front")))
            .await
            .unwrap();
        assert!(*image1.is_primary());
        assert_eq!(&Some("Front".to_owned()), image1.caption());
        assert_eq!(datetime!(2024-05-06 07:08:09 UTC), *image1.uploaded_at());

        let image2 =
            context.driver().create_image(&host, new_image(&listing, None)).await.unwrap();
        assert!(!*image2.is_primary());

        assert_eq!(
            vec![image1, image2],
            db::get_images(&mut context.ex().await, Some(*listing.id())).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_create_image_primary_is_per_listing() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing1 = context.create_listing(&host, "First", true).await;
        let listing2 = context.create_listing(&host, "Second", true).await;
        context.create_image(&listing1, true).await;

        let image = context.driver().create_image(&host, new_image(&listing2, None)).await.unwrap();
        assert!(*image.is_primary());
    }

    #[tokio::test]
    async fn test_create_image_not_owner() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let other = context.create_user("other").await;
        let listing = context.create_listing(&host, "First", true).await;

        assert_eq!(
            DriverError::InvalidInput(
                "You do not have permission to add images to this listing.".to_owned()
            ),
            context.driver().create_image(&other, new_image(&listing, None)).await.unwrap_err()
        );
        assert!(
            db::get_images(&mut context.ex().await, Some(*listing.id())).await.unwrap().is_empty()
        );
    }

    #[tokio::test]
    async fn test_create_image_unknown_listing() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let url = Url::parse("https://images.example.com/new.png").unwrap();
        let image = NewImage::new(ListingId::generate(), url, None).unwrap();

        assert_eq!(
            DriverError::NotFound("Listing not found".to_owned()),
            context.driver().create_image(&host, image).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_delete_image_ok() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let listing = context.create_listing(&host, "First", true).await;
        let image = context.create_image(&listing, true).await;

        context.driver().delete_image(&host, *image.id()).await.unwrap();
        assert_eq!(
            DbError::NotFound,
            db::get_image(&mut context.ex().await, *image.id()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_delete_image_errors() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let other = context.create_user("other").await;
        let listing = context.create_listing(&host, "First", true).await;
        let image = context.create_image(&listing, true).await;

        assert_eq!(
            DriverError::Forbidden("You do not have permission to delete this image.".to_owned()),
            context.driver().delete_image(&other, *image.id()).await.unwrap_err()
        );
        assert_eq!(
            DriverError::NotFound("Image not found".to_owned()),
            context.driver().delete_image(&host, ImageId::generate()).await.unwrap_err()
        );
        assert_eq!(image, db::get_image(&mut context.ex().await, *image.id()).await.unwrap());
    }
}
