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

//! Operations on bookings, including the admission rules that decide whether a stay can be
//! booked.

use crate::db;
use crate::driver::{Driver, not_found};
use crate::model::*;
use log::warn;
use std::future::Future;
use travel_core::db::Executor;
use travel_core::driver::{DriverError, DriverResult};

/// Maximum number of times a booking transaction runs when it keeps conflicting with concurrent
/// ones.
const MAX_ADMISSION_ATTEMPTS: usize = 3;

/// Runs `op` until it succeeds, fails with an error other than `DriverError::Unavailable`, or
/// reaches `MAX_ADMISSION_ATTEMPTS`.
async fn retry_conflicts<T, F, Fut>(mut op: F) -> DriverResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(DriverError::Unavailable(e)) if attempt < MAX_ADMISSION_ATTEMPTS => {
                warn!(
                    "Booking transaction conflicted (attempt {} of {}): {}",
                    attempt, MAX_ADMISSION_ATTEMPTS, e
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Checks whether the stay in `request` can be booked and returns the listing it refers to.
///
/// `exclude` names a booking that must not count as an overlap, which is how a booking that is
/// being modified avoids clashing with itself.
async fn check_admission(
    ex: &mut Executor,
    request: &BookingRequest,
    exclude: Option<BookingId>,
) -> DriverResult<Listing> {
    let listing = db::get_listing(ex, *request.listing()).await.map_err(not_found("Listing"))?;
    if !*listing.fields().available() {
        return Err(DriverError::InvalidInput(
            "This listing is not available for booking.".to_owned(),
        ));
    }

    // A request that lacks either date is admitted without looking at other bookings, so an
    // open-ended stay can double-book the listing.
    if let Some((check_in, check_out)) = request.details().stay() {
        let overlaps =
            db::count_overlapping_bookings(ex, *listing.id(), check_in, check_out, exclude)
                .await?;
        if overlaps > 0 {
            return Err(DriverError::InvalidInput(
                "This listing is already booked for the selected dates.".to_owned(),
            ));
        }
    }

    Ok(listing)
}

/// Gets the booking `id` if `requester` is allowed to see it.
///
/// Bookings of other users are reported as missing unless the requester is staff.
async fn get_visible_booking(
    ex: &mut Executor,
    requester: &User,
    id: BookingId,
) -> DriverResult<Booking> {
    let booking = db::get_booking(ex, id).await.map_err(not_found("Booking"))?;
    if !*requester.is_staff() && booking.user() != requester.username() {
        return Err(DriverError::NotFound("Booking not found".to_owned()));
    }
    Ok(booking)
}

impl Driver {
    /// Gets the bookings visible to `requester`.
    pub(crate) async fn get_bookings(self, requester: &User) -> DriverResult<Vec<Booking>> {
        let user = if *requester.is_staff() { None } else { Some(requester.username()) };
        let bookings = db::get_bookings(&mut self.db.ex().await?, user).await?;
        Ok(bookings)
    }

    /// Gets the booking `id` if visible to `requester`.
    pub(crate) async fn get_booking(
        self,
        requester: &User,
        id: BookingId,
    ) -> DriverResult<Booking> {
        get_visible_booking(&mut self.db.ex().await?, requester, id).await
    }

    /// Admits and stores a new booking for `requester` in a single serializable transaction.
    async fn try_create_booking(
        &self,
        requester: &User,
        request: &BookingRequest,
    ) -> DriverResult<(Booking, String)> {
        let mut tx = self.db.begin_serializable().await?;
        let listing = check_admission(tx.ex(), request, None).await?;
        let booking = Booking::new(
            BookingId::generate(),
            *request.listing(),
            requester.username().clone(),
            request.details().clone(),
            self.clock.now_utc(),
        );
        db::put_booking(tx.ex(), &booking).await.map_err(not_found("Listing"))?;
        tx.commit().await?;
        Ok((booking, listing.fields().title().clone()))
    }

    /// Books a stay for `requester` and queues its confirmation.
    pub(crate) async fn create_booking(
        self,
        requester: &User,
        request: BookingRequest,
    ) -> DriverResult<Booking> {
        let (booking, listing_title) =
            retry_conflicts(|| self.try_create_booking(requester, &request)).await?;

        let details = booking.details();
        self.enqueue(Job::BookingConfirmation(BookingConfirmationJob {
            booking_id: *booking.id(),
            recipient: requester.email().clone(),
            check_in: *details.check_in(),
            check_out: *details.check_out(),
            total_price: *details.total_price(),
            listing_title,
            number_of_guests: *details.number_of_guests(),
        }));

        Ok(booking)
    }

    /// Replaces the listing and details of the booking `id` with those computed by `modify`,
    /// re-running admission if the stay moved.
    async fn try_modify_booking<F>(
        &self,
        requester: &User,
        id: BookingId,
        modify: &F,
    ) -> DriverResult<Booking>
    where
        F: Fn(&Booking) -> DriverResult<BookingRequest>,
    {
        let mut tx = self.db.begin_serializable().await?;
        let booking = get_visible_booking(tx.ex(), requester, id).await?;
        let request = modify(&booking)?;

        let moved = request.listing() != booking.listing()
            || request.details().check_in() != booking.details().check_in()
            || request.details().check_out() != booking.details().check_out();
        if moved {
            check_admission(tx.ex(), &request, Some(id)).await?;
        }

        let booking = booking.with_request(request);
        db::update_booking(tx.ex(), &booking).await.map_err(not_found("Listing"))?;
        tx.commit().await?;
        Ok(booking)
    }

    /// Replaces the booking `id` with `request`.
    pub(crate) async fn update_booking(
        self,
        requester: &User,
        id: BookingId,
        request: BookingRequest,
    ) -> DriverResult<Booking> {
        let modify = |_: &Booking| -> DriverResult<BookingRequest> { Ok(request.clone()) };
        retry_conflicts(|| self.try_modify_booking(requester, id, &modify)).await
    }

    /// Updates the booking `id` with the fields present in `patch`.
    pub(crate) async fn patch_booking(
        self,
        requester: &User,
        id: BookingId,
        patch: BookingPatch,
    ) -> DriverResult<Booking> {
        let modify = |booking: &Booking| -> DriverResult<BookingRequest> {
            Ok(patch.apply(*booking.listing(), booking.details().clone())?)
        };
        retry_conflicts(|| self.try_modify_booking(requester, id, &modify)).await
    }

    /// Cancels the booking `id`.
    pub(crate) async fn delete_booking(self, requester: &User, id: BookingId) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        get_visible_booking(tx.ex(), requester, id).await?;
        db::delete_booking(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use std::str::FromStr;
    use time::Date;
    use time::macros::{date, datetime};
    use travel_core::db::DbError;

    /// Creates a request to book `listing` for three guests.
    fn request(
        listing: &Listing,
        check_in: Option<Date>,
        check_out: Option<Date>,
    ) -> BookingRequest {
        let price = Price::from_str("450").unwrap();
        let details = BookingDetails::new(check_in, check_out, price, 3).unwrap();
        BookingRequest::new(*listing.id(), details)
    }

    #[tokio::test]
    async fn test_retry_conflicts_gives_up() {
        let mut calls = 0;
        let result: DriverResult<()> = retry_conflicts(|| {
            calls += 1;
            async { Err(DriverError::Unavailable("busy".to_owned())) }
        })
        .await;
        assert_eq!(DriverError::Unavailable("busy".to_owned()), result.unwrap_err());
        assert_eq!(MAX_ADMISSION_ATTEMPTS, calls);
    }

    #[tokio::test]
    async fn test_retry_conflicts_recovers() {
        let mut calls = 0;
        let result = retry_conflicts(|| {
            calls += 1;
            let n = calls;
            async move {
                if n < 2 { Err(DriverError::Unavailable("busy".to_owned())) } else { Ok(n) }
            }
        })
        .await;
        assert_eq!(Ok(2), result);
    }

    #[tokio::test]
    async fn test_retry_conflicts_other_errors_are_final() {
        let mut calls = 0;
        let result: DriverResult<()> = retry_conflicts(|| {
            calls += 1;
            async { Err(DriverError::InvalidInput("bad".to_owned())) }
        })
        .await;
        assert_eq!(DriverError::InvalidInput("bad".to_owned()), result.unwrap_err());
        assert_eq!(1, calls);
    }

    #[tokio::test]
    async fn test_create_booking_ok_and_queues_confirmation() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Beach house", true).await;
        context.clock().set(datetime!(2024-01-02 03:04:05 UTC));

        let request = request(&listing, Some(date!(2024-02-01)), Some(date!(2024-02-04)));
        let booking = context.driver().create_booking(&guest, request.clone()).await.unwrap();
        assert_eq!(request.listing(), booking.listing());
        assert_eq!(guest.username(), booking.user());
        assert_eq!(request.details(), booking.details());
        assert_eq!(datetime!(2024-01-02 03:04:05 UTC), *booking.created_at());
        assert_eq!(booking, db::get_booking(&mut context.ex().await, *booking.id()).await.unwrap());

        assert_eq!(
            vec![Job::BookingConfirmation(BookingConfirmationJob {
                booking_id: *booking.id(),
                recipient: guest.email().clone(),
                check_in: Some(date!(2024-02-01)),
                check_out: Some(date!(2024-02-04)),
                total_price: Price::from_str("450").unwrap(),
                listing_title: "Beach house".to_owned(),
                number_of_guests: 3,
            })],
            context.jobs().take()
        );
    }

    #[tokio::test]
    async fn test_create_booking_unavailable_listing() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Closed", false).await;

        for (check_in, check_out) in [
            (None, None),
            (Some(date!(2024-03-01)), None),
            (Some(date!(2024-03-01)), Some(date!(2024-03-02))),
        ] {
            assert_eq!(
                DriverError::InvalidInput(
                    "This listing is not available for booking.".to_owned()
                ),
                context
                    .driver()
                    .create_booking(&guest, request(&listing, check_in, check_out))
                    .await
                    .unwrap_err()
            );
        }
        assert!(context.jobs().take().is_empty());
    }

    #[tokio::test]
    async fn test_create_booking_unknown_listing() {
        let context = TestContext::setup().await;
        let guest = context.create_user("guest").await;
        let details = BookingDetails::new(None, None, Price::from_str("1").unwrap(), 1).unwrap();

        assert_eq!(
            DriverError::NotFound("Listing not found".to_owned()),
            context
                .driver()
                .create_booking(&guest, BookingRequest::new(ListingId::generate(), details))
                .await
                .unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_create_booking_back_to_back() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        context
            .create_booking(&listing, &host, Some(date!(2024-01-01)), Some(date!(2024-01-05)))
            .await;

        let before = request(&listing, Some(date!(2023-12-28)), Some(date!(2024-01-01)));
        context.driver().create_booking(&guest, before).await.unwrap();
        let after = request(&listing, Some(date!(2024-01-05)), Some(date!(2024-01-10)));
        context.driver().create_booking(&guest, after).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_booking_overlaps() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        context
            .create_booking(&listing, &host, Some(date!(2024-01-01)), Some(date!(2024-01-10)))
            .await;

        for (check_in, check_out) in [
            (date!(2024-01-05), date!(2024-01-08)),
            (date!(2023-12-30), date!(2024-01-02)),
            (date!(2024-01-09), date!(2024-01-12)),
            (date!(2023-12-01), date!(2024-02-01)),
        ] {
            assert_eq!(
                DriverError::InvalidInput(
                    "This listing is already booked for the selected dates.".to_owned()
                ),
                context
                    .driver()
                    .create_booking(&guest, request(&listing, Some(check_in), Some(check_out)))
                    .await
                    .unwrap_err()
            );
        }
        assert!(context.jobs().take().is_empty());
    }

    #[tokio::test]
    async fn test_create_booking_overlap_is_per_listing() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing1 = context.create_listing(&host, "Cabin", true).await;
        let listing2 = context.create_listing(&host, "Loft", true).await;
        context
            .create_booking(&listing1, &host, Some(date!(2024-01-01)), Some(date!(2024-01-10)))
            .await;

        let request = request(&listing2, Some(date!(2024-01-05)), Some(date!(2024-01-08)));
        context.driver().create_booking(&guest, request).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_booking_missing_dates_skip_overlap_check() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        context
            .create_booking(&listing, &host, Some(date!(2024-01-01)), Some(date!(2024-01-10)))
            .await;

        for (check_in, check_out) in
            [(Some(date!(2024-01-05)), None), (None, Some(date!(2024-01-08))), (None, None)]
        {
            context
                .driver()
                .create_booking(&guest, request(&listing, check_in, check_out))
                .await
                .unwrap();
        }
        assert_eq!(3, context.jobs().take().len());
    }

    #[tokio::test]
    async fn test_create_booking_enqueue_failure_is_not_fatal() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        context.jobs().close();

        let booking = context
            .driver()
            .create_booking(&guest, request(&listing, None, None))
            .await
            .unwrap();
        db::get_booking(&mut context.ex().await, *booking.id()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_bookings_visibility() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest1 = context.create_user("guest1").await;
        let guest2 = context.create_user("guest2").await;
        let staff = context.create_staff("staff").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        let booking1 = context.create_booking(&listing, &guest1, None, None).await;
        let booking2 = context.create_booking(&listing, &guest2, None, None).await;

        assert_eq!(vec![booking1.clone()], context.driver().get_bookings(&guest1).await.unwrap());
        assert_eq!(vec![booking2.clone()], context.driver().get_bookings(&guest2).await.unwrap());
        assert!(context.driver().get_bookings(&host).await.unwrap().is_empty());
        assert_eq!(
            vec![booking1.clone(), booking2.clone()],
            context.driver().get_bookings(&staff).await.unwrap()
        );

        assert_eq!(booking1, context.driver().get_booking(&guest1, *booking1.id()).await.unwrap());
        assert_eq!(booking2, context.driver().get_booking(&staff, *booking2.id()).await.unwrap());
        assert_eq!(
            DriverError::NotFound("Booking not found".to_owned()),
            context.driver().get_booking(&guest1, *booking2.id()).await.unwrap_err()
        );
        assert_eq!(
            DriverError::NotFound("Booking not found".to_owned()),
            context.driver().get_booking(&guest1, BookingId::generate()).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_update_booking_ok() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing1 = context.create_listing(&host, "Cabin", true).await;
        let listing2 = context.create_listing(&host, "Loft", true).await;
        let booking = context
            .create_booking(&listing1, &guest, Some(date!(2024-01-01)), Some(date!(2024-01-05)))
            .await;

        let request = request(&listing2, Some(date!(2024-01-02)), Some(date!(2024-01-04)));
        let updated = context
            .driver()
            .update_booking(&guest, *booking.id(), request.clone())
            .await
            .unwrap();
        assert_eq!(booking.id(), updated.id());
        assert_eq!(request.listing(), updated.listing());
        assert_eq!(request.details(), updated.details());
        assert_eq!(booking.created_at(), updated.created_at());
        assert_eq!(updated, db::get_booking(&mut context.ex().await, *booking.id()).await.unwrap());
        assert!(context.jobs().take().is_empty());
    }

    #[tokio::test]
    async fn test_update_booking_rechecks_overlaps() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        context
            .create_booking(&listing, &host, Some(date!(2024-01-10)), Some(date!(2024-01-15)))
            .await;
        let booking = context
            .create_booking(&listing, &guest, Some(date!(2024-01-01)), Some(date!(2024-01-05)))
            .await;

        let clash = request(&listing, Some(date!(2024-01-04)), Some(date!(2024-01-11)));
        assert_eq!(
            DriverError::InvalidInput(
                "This listing is already booked for the selected dates.".to_owned()
            ),
            context.driver().update_booking(&guest, *booking.id(), clash).await.unwrap_err()
        );

        // Growing a booking over its own previous range is fine.
        let grow = request(&listing, Some(date!(2024-01-01)), Some(date!(2024-01-10)));
        context.driver().update_booking(&guest, *booking.id(), grow).await.unwrap();
    }

    #[tokio::test]
    async fn test_patch_booking_keeps_dates_without_admission() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Closed", false).await;
        let booking = context
            .create_booking(&listing, &guest, Some(date!(2024-01-01)), Some(date!(2024-01-05)))
            .await;

        let patch = BookingPatch { number_of_guests: Some(4), ..Default::default() };
        let updated = context.driver().patch_booking(&guest, *booking.id(), patch).await.unwrap();
        assert_eq!(4, *updated.details().number_of_guests());
        assert_eq!(booking.details().check_in(), updated.details().check_in());

        let patch = BookingPatch { check_out: Some(date!(2024-01-06)), ..Default::default() };
        assert_eq!(
            DriverError::InvalidInput("This listing is not available for booking.".to_owned()),
            context.driver().patch_booking(&guest, *booking.id(), patch).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_patch_booking_reversed_dates() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        let booking = context
            .create_booking(&listing, &guest, Some(date!(2024-01-01)), Some(date!(2024-01-05)))
            .await;
        context
            .create_booking(&listing, &guest, Some(date!(2024-02-01)), Some(date!(2024-02-10)))
            .await;

        let patch = BookingPatch { check_in: Some(date!(2024-01-05)), ..Default::default() };
        let updated = context.driver().patch_booking(&guest, *booking.id(), patch).await.unwrap();
        assert_eq!(Some((date!(2024-01-05), date!(2024-01-05))), updated.details().stay());

        let patch = BookingPatch {
            check_in: Some(date!(2024-02-05)),
            check_out: Some(date!(2024-02-03)),
            ..Default::default()
        };
        assert_eq!(
            DriverError::InvalidInput(
                "This listing is already booked for the selected dates.".to_owned()
            ),
            context.driver().patch_booking(&guest, *booking.id(), patch).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_modify_booking_not_visible() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let other = context.create_user("other").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        let booking = context.create_booking(&listing, &guest, None, None).await;

        let exp_err = DriverError::NotFound("Booking not found".to_owned());
        assert_eq!(
            exp_err,
            context
                .driver()
                .update_booking(&other, *booking.id(), request(&listing, None, None))
                .await
                .unwrap_err()
        );
        assert_eq!(
            exp_err,
            context
                .driver()
                .patch_booking(&other, *booking.id(), BookingPatch::default())
                .await
                .unwrap_err()
        );
        assert_eq!(
            exp_err,
            context.driver().delete_booking(&other, *booking.id()).await.unwrap_err()
        );
        assert_eq!(booking, db::get_booking(&mut context.ex().await, *booking.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_booking_ok() {
        let context = TestContext::setup().await;
        let host = context.create_user("host").await;
        let guest = context.create_user("guest").await;
        let staff = context.create_staff("staff").await;
        let listing = context.create_listing(&host, "Cabin", true).await;
        let booking1 = context.create_booking(&listing, &guest, None, None).await;
        let booking2 = context.create_booking(&listing, &guest, None, None).await;

        context.driver().delete_booking(&guest, *booking1.id()).await.unwrap();
        context.driver().delete_booking(&staff, *booking2.id()).await.unwrap();

        let mut ex = context.ex().await;
        assert_eq!(DbError::NotFound, db::get_booking(&mut ex, *booking1.id()).await.unwrap_err());
        assert_eq!(DbError::NotFound, db::get_booking(&mut ex, *booking2.id()).await.unwrap_err());
    }
}
