mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use gymdesk::{
    domain::{DeliveryStatus, Notification, Payment, PaymentStatus, User},
    error::{AppError, Result},
    jobs::Job,
    notifications::{kinds, LogNotifier, Notifier},
    repository::{AuditRepository, SqliteAuditRepository},
};

use common::{setup, TestApp};

async fn stripe_payment(app: &TestApp, user: &User, intent_id: &str, amount_cents: i64) -> anyhow::Result<Payment> {
    let mut payment = Payment::paid_via_stripe(user.id, amount_cents, "usd", "Monthly Unlimited", app.now());
    payment.stripe_payment_intent_id = Some(intent_id.to_string());
    Ok(app.ctx.payment_repo.create(payment).await?)
}

#[tokio::test]
async fn reminders_are_sent_once_per_window() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::hours(24), 10).await?;
    let member = app.member("member@gym.test").await?;
    let other = app.member("other@gym.test").await?;
    app.book(&member, class.id).await?;
    let cancelled = app.book(&other, class.id).await?;
    app.ctx.booking_service.cancel(cancelled.id, other.id, None).await?;

    let first = app.ctx.reminders.run_once().await?;
    assert_eq!(first.sessions, 1);
    assert_eq!(first.sent, 1);

    let second = app.ctx.reminders.run_once().await?;
    assert_eq!(second.sent, 0);
    assert_eq!(second.already_sent, 1);

    app.clock.advance(Duration::hours(23));
    let third = app.ctx.reminders.run_once().await?;
    assert_eq!(third.sent, 1);

    let reminders = app.notification_kinds(member.id).await?
        .into_iter()
        .filter(|k| k == kinds::CLASS_REMINDER)
        .count();
    assert_eq!(reminders, 2);
    assert!(!app.notification_kinds(other.id).await?.iter().any(|k| k == kinds::CLASS_REMINDER));
    Ok(())
}

#[tokio::test]
async fn classes_outside_every_window_get_no_reminder() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let member = app.member("member@gym.test").await?;

    let later = app.class(&trainer, Duration::hours(6), 10).await?;
    app.book(&member, later.id).await?;

    let summary = app.ctx.reminders.run_once().await?;
    assert_eq!(summary, Default::default());
    Ok(())
}

#[tokio::test]
async fn reconciliation_marks_matching_payments() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;
    let payment = stripe_payment(&app, &member, "pi_match", 5900).await?;
    app.gateway.set_amount("pi_match", 5900);

    let summary = app.ctx.reconciler.run_once().await?;
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.reconciled, 1);

    let payment = app.ctx.payment_repo.find_by_id(payment.id).await?.unwrap();
    assert!(payment.reconciled);
    assert!(payment.reconciled_at.is_some());

    // Reconciled rows are not examined again
    let again = app.ctx.reconciler.run_once().await?;
    assert_eq!(again.examined, 0);
    Ok(())
}

#[tokio::test]
async fn reconciliation_flags_mismatches_without_touching_the_payment() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;
    let payment = stripe_payment(&app, &member, "pi_mismatch", 5900).await?;
    app.gateway.set_amount("pi_mismatch", 4900);

    let summary = app.ctx.reconciler.run_once().await?;
    assert_eq!(summary.discrepancies, 1);
    assert_eq!(summary.reconciled, 0);

    let unchanged = app.ctx.payment_repo.find_by_id(payment.id).await?.unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Paid);
    assert_eq!(unchanged.amount_cents, 5900);
    assert!(!unchanged.reconciled);

    let audit = SqliteAuditRepository::new(app.pool.clone());
    let entries = audit.list_by_action("payment_discrepancy").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, None);
    assert_eq!(entries[0].details["local_amount_cents"], serde_json::json!(5900));
    assert_eq!(entries[0].details["provider_amount_cents"], serde_json::json!(4900));
    Ok(())
}

#[tokio::test]
async fn repeated_sweeps_flag_a_mismatch_once() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;
    stripe_payment(&app, &member, "pi_mismatch", 5900).await?;
    app.gateway.set_amount("pi_mismatch", 4900);

    let first = app.ctx.reconciler.run_once().await?;
    let second = app.ctx.reconciler.run_once().await?;
    assert_eq!(first.discrepancies, 1);
    assert_eq!(second.discrepancies, 1);

    let audit = SqliteAuditRepository::new(app.pool.clone());
    assert_eq!(audit.list_by_action("payment_discrepancy").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn reconciliation_counts_provider_errors() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;
    stripe_payment(&app, &member, "pi_unknown", 5900).await?;
    stripe_payment(&app, &member, "pi_known", 1500).await?;
    app.gateway.set_amount("pi_known", 1500);

    let summary = app.ctx.reconciler.run_once().await?;
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.reconciled, 1);
    Ok(())
}

#[tokio::test]
async fn reconciliation_ignores_payments_outside_the_lookback() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;
    stripe_payment(&app, &member, "pi_old", 5900).await?;
    app.gateway.set_amount("pi_old", 5900);

    app.clock.advance(Duration::days(31));
    let summary = app.ctx.reconciler.tick().await;
    assert!(summary.is_ok());
    assert_eq!(app.ctx.reconciler.run_once().await?.examined, 0);
    Ok(())
}

#[tokio::test]
async fn dispatcher_delivers_pending_notifications() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::days(1), 10).await?;
    let member = app.member("member@gym.test").await?;
    app.book(&member, class.id).await?;

    // Nothing is drained until a notifier is registered
    let idle = app.ctx.dispatcher.process_batch().await?;
    assert_eq!(idle.delivered, 0);

    app.ctx.dispatcher.register(Arc::new(LogNotifier)).await;
    let summary = app.ctx.dispatcher.process_batch().await?;
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.failed, 0);

    let feed = app.ctx.notifications.feed(member.id, 10).await?;
    assert!(feed.iter().all(|n| n.status == DeliveryStatus::Delivered && n.delivered_at.is_some()));

    let drained = app.ctx.dispatcher.process_batch().await?;
    assert_eq!(drained.delivered, 0);
    Ok(())
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    fn name(&self) -> &str {
        "broken"
    }

    async fn deliver(&self, _notification: &Notification, _recipient: &User) -> Result<()> {
        Err(AppError::External("smtp unreachable".to_string()))
    }
}

#[tokio::test]
async fn failing_deliveries_give_up_after_max_attempts() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;
    app.ctx.notifications
        .notify(member.id, kinds::PAYMENT_FAILED, "Payment Failed", "Card declined".to_string())
        .await;

    app.ctx.dispatcher.register(Arc::new(BrokenNotifier)).await;

    let max_attempts = app.settings.jobs.outbox_max_attempts;
    for _ in 0..max_attempts {
        let summary = app.ctx.dispatcher.process_batch().await?;
        assert_eq!(summary.failed, 1);
    }

    let feed = app.ctx.notifications.feed(member.id, 10).await?;
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].status, DeliveryStatus::Failed);
    assert_eq!(feed[0].attempts, max_attempts);
    assert!(feed[0].last_error.as_deref().unwrap_or_default().contains("smtp unreachable"));

    let after = app.ctx.dispatcher.process_batch().await?;
    assert_eq!(after.failed, 0);
    Ok(())
}
