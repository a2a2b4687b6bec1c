mod common;

use chrono::Duration;
use gymdesk::{
    domain::{PaymentStatus, ProviderSubscription, SubscriptionStatus, UpdateUserRequest},
    notifications::kinds,
    payments::{BillingEvent, BillingEventKind, WebhookAck},
};

use common::{app_on, setup};

fn invoice_paid(event_id: &str, invoice_id: &str, subscription_id: &str, amount_cents: i64) -> BillingEvent {
    BillingEvent::new(
        event_id,
        "invoice.payment_succeeded",
        BillingEventKind::InvoicePaymentSucceeded {
            invoice_id: invoice_id.to_string(),
            subscription_id: Some(subscription_id.to_string()),
            payment_intent_id: Some(format!("pi_{invoice_id}")),
            amount_cents,
            currency: "usd".to_string(),
        },
    )
}

const PROCESSED: WebhookAck = WebhookAck { received: true, skipped: false };
const SKIPPED: WebhookAck = WebhookAck { received: true, skipped: true };

#[tokio::test]
async fn unknown_subscription_is_acknowledged_without_side_effects() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;

    let ack = app.ctx.subscription_sync
        .handle_event(invoice_paid("evt_1", "in_1", "sub_unknown", 5900))
        .await;
    assert_eq!(ack, PROCESSED);

    assert!(app.ctx.payment_repo.find_by_user(member.id).await?.is_empty());
    assert!(app.ctx.payment_repo.find_by_invoice_id("in_1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn replayed_event_is_skipped() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    app.subscribe(&member, "sub_live").await?;

    let event = invoice_paid("evt_1", "in_1", "sub_live", 5900);
    assert_eq!(app.ctx.subscription_sync.handle_event(event.clone()).await, PROCESSED);
    assert_eq!(app.ctx.subscription_sync.handle_event(event).await, SKIPPED);

    let payments = app.ctx.payment_repo.find_by_user(member.id).await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount_cents, 5900);
    assert_eq!(payments[0].status, PaymentStatus::Paid);
    assert_eq!(payments[0].stripe_invoice_id.as_deref(), Some("in_1"));

    let notified = app.notification_kinds(member.id).await?;
    assert_eq!(notified.iter().filter(|k| *k == kinds::PAYMENT_SUCCEEDED).count(), 1);
    Ok(())
}

#[tokio::test]
async fn same_invoice_under_a_new_event_id_is_recorded_once() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    app.subscribe(&member, "sub_live").await?;

    app.ctx.subscription_sync.handle_event(invoice_paid("evt_1", "in_1", "sub_live", 5900)).await;
    let ack = app.ctx.subscription_sync
        .handle_event(invoice_paid("evt_2", "in_1", "sub_live", 5900))
        .await;
    assert_eq!(ack, PROCESSED);

    assert_eq!(app.ctx.payment_repo.find_by_user(member.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn processed_events_survive_a_restart() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    app.subscribe(&member, "sub_live").await?;

    let event = invoice_paid("evt_1", "in_1", "sub_live", 5900);
    app.ctx.subscription_sync.handle_event(event.clone()).await;

    // A fresh context starts with an empty in-memory cache
    let restarted = app_on(app.pool.clone(), app.clock.clone(), app.gateway.clone());
    assert_eq!(restarted.ctx.subscription_sync.handle_event(event).await, SKIPPED);
    Ok(())
}

#[tokio::test]
async fn failed_invoice_marks_subscription_past_due() -> anyhow::Result<()> {
    let app = setup().await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::days(1), 10).await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    let subscription = app.subscribe(&member, "sub_live").await?;

    let event = BillingEvent::new(
        "evt_fail",
        "invoice.payment_failed",
        BillingEventKind::InvoicePaymentFailed {
            invoice_id: "in_9".to_string(),
            subscription_id: Some("sub_live".to_string()),
        },
    );
    app.ctx.subscription_sync.handle_event(event).await;

    let updated = app.ctx.subscription_repo.find_by_id(subscription.id).await?.unwrap();
    assert_eq!(updated.status, SubscriptionStatus::PastDue);
    assert!(app.notification_kinds(member.id).await?.iter().any(|k| k == kinds::PAYMENT_FAILED));

    // Past-due members lose booking access
    assert!(app.ctx.booking_service.book(&member, class.id).await.is_err());

    // The next successful invoice restores it
    app.ctx.subscription_sync.handle_event(invoice_paid("evt_ok", "in_10", "sub_live", 5900)).await;
    let restored = app.ctx.subscription_repo.find_by_id(subscription.id).await?.unwrap();
    assert_eq!(restored.status, SubscriptionStatus::Active);
    app.book(&member, class.id).await?;
    Ok(())
}

#[tokio::test]
async fn subscription_updates_and_deletions_are_applied() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    let subscription = app.subscribe(&member, "sub_live").await?;

    let period_start = app.now() + Duration::days(30);
    let period_end = period_start + Duration::days(30);
    let update = BillingEvent::new(
        "evt_upd",
        "customer.subscription.updated",
        BillingEventKind::SubscriptionUpdated(ProviderSubscription {
            subscription_id: "sub_live".to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: period_start,
            current_period_end: period_end,
            cancel_at_period_end: true,
        }),
    );
    app.ctx.subscription_sync.handle_event(update).await;

    let updated = app.ctx.subscription_repo.find_by_id(subscription.id).await?.unwrap();
    assert_eq!(updated.current_period_end, period_end);
    assert!(updated.cancel_at_period_end);

    let delete = BillingEvent::new(
        "evt_del",
        "customer.subscription.deleted",
        BillingEventKind::SubscriptionDeleted {
            subscription_id: "sub_live".to_string(),
        },
    );
    app.ctx.subscription_sync.handle_event(delete).await;

    let deleted = app.ctx.subscription_repo.find_by_id(subscription.id).await?.unwrap();
    assert_eq!(deleted.status, SubscriptionStatus::Cancelled);
    assert!(deleted.cancelled_at.is_some());
    assert!(app.ctx.subscription_repo.find_current_for_user(member.id, app.now()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn one_off_payment_then_provider_refund() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    app.ctx.user_repo
        .update(
            member.id,
            UpdateUserRequest {
                stripe_customer_id: Some("cus_123".to_string()),
                ..Default::default()
            },
        )
        .await?;

    let paid = BillingEvent::new(
        "evt_pi",
        "payment_intent.succeeded",
        BillingEventKind::PaymentIntentSucceeded {
            payment_intent_id: "pi_drop_in".to_string(),
            customer_id: Some("cus_123".to_string()),
            amount_cents: 1500,
            currency: "usd".to_string(),
            description: Some("Drop-in class".to_string()),
        },
    );
    app.ctx.subscription_sync.handle_event(paid).await;

    let payment = app.ctx.payment_repo.find_by_payment_intent_id("pi_drop_in").await?.unwrap();
    assert_eq!(payment.user_id, member.id);
    assert_eq!(payment.description, "Drop-in class");

    let refunded = BillingEvent::new(
        "evt_refund",
        "charge.refunded",
        BillingEventKind::ChargeRefunded {
            charge_id: "ch_1".to_string(),
            payment_intent_id: Some("pi_drop_in".to_string()),
        },
    );
    app.ctx.subscription_sync.handle_event(refunded).await;

    let payment = app.ctx.payment_repo.find_by_id(payment.id).await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(payment.refunded_at.is_some());
    assert!(app.notification_kinds(member.id).await?.iter().any(|k| k == kinds::PAYMENT_REFUNDED));
    Ok(())
}

#[tokio::test]
async fn checkout_completion_creates_pending_subscription() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;

    let event = BillingEvent::new(
        "evt_checkout",
        "checkout.session.completed",
        BillingEventKind::CheckoutCompleted {
            subscription_id: Some("sub_new".to_string()),
            customer_id: Some("cus_new".to_string()),
            user_id: Some(member.id.to_string()),
            plan_id: None,
        },
    );
    app.ctx.subscription_sync.handle_event(event).await;

    let created = app.ctx.subscription_repo.find_by_stripe_id("sub_new").await?.unwrap();
    assert_eq!(created.user_id, member.id);
    assert_eq!(created.status, SubscriptionStatus::Incomplete);

    let user = app.ctx.user_repo.find_by_id(member.id).await?.unwrap();
    assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_new"));
    Ok(())
}

#[tokio::test]
async fn concurrent_redelivery_runs_the_handler_once() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    let subscription = app.subscribe(&member, "sub_live").await?;

    let event = BillingEvent::new(
        "evt_dup",
        "invoice.payment_failed",
        BillingEventKind::InvoicePaymentFailed {
            invoice_id: "in_dup".to_string(),
            subscription_id: Some("sub_live".to_string()),
        },
    );

    let mut handles = Vec::new();
    for _ in 0..2 {
        let sync = std::sync::Arc::clone(&app.ctx.subscription_sync);
        let event = event.clone();
        handles.push(tokio::spawn(async move { sync.handle_event(event).await }));
    }

    let mut acks = Vec::new();
    for handle in handles {
        acks.push(handle.await?);
    }
    assert_eq!(acks.iter().filter(|ack| **ack == PROCESSED).count(), 1);
    assert_eq!(acks.iter().filter(|ack| **ack == SKIPPED).count(), 1);

    let failed = app.notification_kinds(member.id).await?
        .into_iter()
        .filter(|k| k == kinds::PAYMENT_FAILED)
        .count();
    assert_eq!(failed, 1);

    let updated = app.ctx.subscription_repo.find_by_id(subscription.id).await?.unwrap();
    assert_eq!(updated.status, SubscriptionStatus::PastDue);
    Ok(())
}
