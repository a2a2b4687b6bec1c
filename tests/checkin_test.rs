mod common;

use std::sync::Arc;

use chrono::Duration;
use gymdesk::{
    domain::{Attendance, BookingStatus, CheckInMethod},
    error::AppError,
    notifications::kinds,
    repository::{AttendanceRepository, AuditRepository, SqliteAttendanceRepository, SqliteAuditRepository},
};
use uuid::Uuid;

use common::setup;

#[tokio::test]
async fn expired_token_is_rejected_and_reissue_works() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(4), 10).await?;
    let member = app.member("member@gym.test").await?;
    let booking = app.book(&member, class.id).await?;

    let issued = app.ctx.token_issuer.issue(booking.id, member.id).await?;
    assert_eq!(issued.expires_at, app.now() + Duration::minutes(30));

    app.clock.advance(Duration::minutes(31));
    let err = app.ctx.attendance_service
        .check_in_with_token(member.id, booking.id, &issued.token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TokenExpired), "got {err:?}");

    let reissued = app.ctx.token_issuer.issue(booking.id, member.id).await?;
    assert_ne!(reissued.token, issued.token);

    let attendance = app.ctx.attendance_service
        .check_in_with_token(member.id, booking.id, &reissued.token)
        .await?;
    assert_eq!(attendance.method, CheckInMethod::Qr);
    assert_eq!(attendance.checked_in_by, None);

    let booking = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(booking.status, BookingStatus::CheckedIn);
    assert!(app.notification_kinds(member.id).await?.iter().any(|k| k == kinds::CHECKED_IN));

    // Scanning the same code again reports the existing check-in
    let err = app.ctx.attendance_service
        .check_in_with_token(member.id, booking.id, &reissued.token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyCheckedIn));
    Ok(())
}

#[tokio::test]
async fn concurrent_redemption_has_one_winner() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(4), 10).await?;
    let member = app.member("member@gym.test").await?;
    let booking = app.book(&member, class.id).await?;
    let issued = app.ctx.token_issuer.issue(booking.id, member.id).await?;

    let booking_id = booking.id;
    let mut handles = Vec::new();
    for _ in 0..2 {
        let issuer = Arc::clone(&app.ctx.token_issuer);
        let token = issued.token.clone();
        handles.push(tokio::spawn(async move { issuer.redeem(&token, booking_id).await }));
    }

    let mut wins = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await? {
            Ok(token) => {
                assert!(token.used);
                wins += 1;
            }
            Err(AppError::TokenAlreadyUsed) => already_used += 1,
            Err(other) => anyhow::bail!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(already_used, 1);
    Ok(())
}

#[tokio::test]
async fn reissuing_revokes_the_previous_token() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(4), 10).await?;
    let member = app.member("member@gym.test").await?;
    let booking = app.book(&member, class.id).await?;

    let first = app.ctx.token_issuer.issue(booking.id, member.id).await?;
    let second = app.ctx.token_issuer.issue(booking.id, member.id).await?;

    let err = app.ctx.token_issuer.redeem(&first.token, booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::TokenNotFound));

    app.ctx.token_issuer.redeem(&second.token, booking.id).await?;
    Ok(())
}

#[tokio::test]
async fn token_is_valid_at_its_expiry_instant() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(4), 10).await?;
    let member = app.member("member@gym.test").await?;
    let booking = app.book(&member, class.id).await?;

    let issued = app.ctx.token_issuer.issue(booking.id, member.id).await?;
    app.clock.set(issued.expires_at);

    app.ctx.attendance_service
        .check_in_with_token(member.id, booking.id, &issued.token)
        .await?;
    Ok(())
}

#[tokio::test]
async fn tokens_are_bound_to_their_booking() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(4), 10).await?;
    let other_class = app.class(&trainer, Duration::hours(6), 10).await?;
    let member = app.member("member@gym.test").await?;
    let stranger = app.member("stranger@gym.test").await?;

    let booking = app.book(&member, class.id).await?;
    let other_booking = app.book(&member, other_class.id).await?;
    let issued = app.ctx.token_issuer.issue(booking.id, member.id).await?;

    let err = app.ctx.attendance_service
        .check_in_with_token(member.id, other_booking.id, &issued.token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TokenNotFound));

    let err = app.ctx.attendance_service
        .check_in_with_token(member.id, booking.id, "not-a-real-token")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TokenNotFound));

    let err = app.ctx.attendance_service
        .check_in_with_token(stranger.id, booking.id, &issued.token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotOwner));

    let err = app.ctx.token_issuer.issue(booking.id, stranger.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotOwner));

    // Wrong attempts do not burn the token
    app.ctx.attendance_service
        .check_in_with_token(member.id, booking.id, &issued.token)
        .await?;
    Ok(())
}

#[tokio::test]
async fn cancelled_booking_cannot_get_a_code() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::days(1), 10).await?;
    let member = app.member("member@gym.test").await?;
    let booking = app.book(&member, class.id).await?;

    app.ctx.booking_service.cancel(booking.id, member.id, None).await?;
    let err = app.ctx.token_issuer.issue(booking.id, member.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn manual_check_in_is_audited_and_owner_only() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let other_trainer = app.trainer("other@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(1), 10).await?;
    let member = app.member("member@gym.test").await?;
    let walk_in = app.member("walkin@gym.test").await?;
    app.book(&member, class.id).await?;

    let err = app.ctx.attendance_service
        .manual_check_in(&other_trainer, class.id, member.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotOwner));

    let err = app.ctx.attendance_service
        .manual_check_in(&trainer, class.id, walk_in.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let attendance = app.ctx.attendance_service
        .manual_check_in(&trainer, class.id, member.id)
        .await?;
    assert_eq!(attendance.method, CheckInMethod::Manual);
    assert_eq!(attendance.checked_in_by, Some(trainer.id));

    let audit = SqliteAuditRepository::new(app.pool.clone());
    let entries = audit.list_by_action("manual_checkin").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, Some(trainer.id));
    assert_eq!(entries[0].resource_id, Some(attendance.id.to_string()));

    let err = app.ctx.attendance_service
        .manual_check_in(&trainer, class.id, member.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyCheckedIn));
    Ok(())
}

#[tokio::test]
async fn reports_are_scoped_to_owner_or_admin() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(1), 10).await?;
    let present = app.member("present@gym.test").await?;
    let absent = app.member("absent@gym.test").await?;

    let booking = app.book(&present, class.id).await?;
    app.book(&absent, class.id).await?;

    let issued = app.ctx.token_issuer.issue(booking.id, present.id).await?;
    app.ctx.attendance_service
        .check_in_with_token(present.id, booking.id, &issued.token)
        .await?;
    app.ctx.booking_service.complete_session(class.id, trainer.id).await?;

    let report = app.ctx.attendance_service.class_report(&trainer, class.id).await?;
    assert_eq!(report.stats.total_bookings, 2);
    assert_eq!(report.stats.checked_in, 1);
    assert_eq!(report.stats.no_shows, 1);
    assert_eq!(report.stats.qr_check_ins, 1);

    let err = app.ctx.attendance_service.class_report(&absent, class.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotOwner));

    let mine = app.ctx.attendance_service.member_report(&present, present.id).await?;
    assert_eq!(mine.stats.total_classes, 1);

    let err = app.ctx.attendance_service.member_report(&absent, present.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let by_admin = app.ctx.attendance_service.member_report(&admin, absent.id).await?;
    assert_eq!(by_admin.stats.total_classes, 0);
    Ok(())
}

#[tokio::test]
async fn check_in_losing_to_a_cancel_leaves_no_record() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::days(1), 10).await?;
    let member = app.member("member@gym.test").await?;
    let booking = app.book(&member, class.id).await?;

    // The cancel commits between the service's status check and the write
    app.ctx.booking_service.cancel(booking.id, member.id, None).await?;

    let attendance = SqliteAttendanceRepository::new(app.pool.clone());
    let err = attendance
        .check_in(Attendance {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            member_id: member.id,
            class_id: class.id,
            method: CheckInMethod::Qr,
            checked_in_at: app.now(),
            checked_in_by: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)), "got {err:?}");

    assert!(attendance.find_by_booking(booking.id).await?.is_none());
    let booking = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    Ok(())
}
