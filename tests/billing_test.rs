mod common;

use chrono::Duration;
use gymdesk::{
    domain::{
        BillingInterval, CreatePaymentIntentRequest, CreatePlanRequest, GrantSubscriptionRequest,
        ManualPaymentRequest, MarkPaidRequest, Payment, PaymentMethod, PaymentStatus, Plan, SubscriptionStatus,
        User,
    },
    error::AppError,
    notifications::kinds,
    payments::{BillingEvent, BillingEventKind},
    repository::{AuditRepository, SqliteAuditRepository},
};

use common::{setup, TestApp};

async fn monthly_plan(app: &TestApp, admin: &User) -> anyhow::Result<Plan> {
    let plan = app.ctx.billing_service
        .create_plan(
            admin,
            CreatePlanRequest {
                name: "Monthly Unlimited".to_string(),
                description: "Unlimited classes".to_string(),
                price_cents: 5900,
                currency: "usd".to_string(),
                interval: BillingInterval::Month,
                stripe_price_id: "price_monthly".to_string(),
                stripe_product_id: None,
                features: vec!["Unlimited classes".to_string()],
                classes_per_month: 0,
            },
        )
        .await?;
    Ok(plan)
}

async fn stripe_payment(app: &TestApp, user: &User, intent_id: &str) -> anyhow::Result<Payment> {
    let mut payment = Payment::paid_via_stripe(user.id, 5900, "usd", "Monthly Unlimited", app.now());
    payment.stripe_payment_intent_id = Some(intent_id.to_string());
    Ok(app.ctx.payment_repo.create(payment).await?)
}

#[tokio::test]
async fn granted_subscription_unlocks_booking() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let plan = monthly_plan(&app, &admin).await?;
    let trainer = app.trainer("coach@gym.test").await?;
    let class = app.class(&trainer, Duration::days(2), 10).await?;
    let member = app.member_without_subscription("member@gym.test").await?;

    let err = app.ctx.booking_service.book(&member, class.id).await.unwrap_err();
    assert!(matches!(err, AppError::SubscriptionRequired));

    let granted = app.ctx.billing_service
        .grant_subscription(&admin, member.id, GrantSubscriptionRequest { plan_id: plan.id, months: 3 })
        .await?;
    assert_eq!(granted.status, SubscriptionStatus::Active);
    assert!(granted.stripe_subscription_id.starts_with("manual_"));
    assert_eq!(granted.current_period_end.date_naive().to_string(), "2030-06-04");

    app.book(&member, class.id).await?;

    let log = app.ctx.billing_service.audit_log(10).await?;
    assert!(log.iter().any(|e| e.action == "grant_subscription" && e.user_id == Some(admin.id)));
    Ok(())
}

#[tokio::test]
async fn grant_rejects_out_of_range_months() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let plan = monthly_plan(&app, &admin).await?;
    let member = app.member_without_subscription("member@gym.test").await?;

    let err = app.ctx.billing_service
        .grant_subscription(&admin, member.id, GrantSubscriptionRequest { plan_id: plan.id, months: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn failed_provider_refund_leaves_payment_paid() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let member = app.member("member@gym.test").await?;
    let payment = stripe_payment(&app, &member, "pi_1").await?;

    app.gateway.fail_refunds(true);
    let err = app.ctx.billing_service
        .refund_payment(&admin, payment.id, Some("duplicate charge".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::External(_)));

    let unchanged = app.ctx.payment_repo.find_by_id(payment.id).await?.unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Paid);
    assert!(unchanged.refunded_at.is_none());
    Ok(())
}

#[tokio::test]
async fn refund_goes_through_the_provider_once() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let member = app.member("member@gym.test").await?;
    let payment = stripe_payment(&app, &member, "pi_1").await?;

    let refunded = app.ctx.billing_service
        .refund_payment(&admin, payment.id, Some("duplicate charge".to_string()))
        .await?;
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refund_reason.as_deref(), Some("duplicate charge"));
    assert_eq!(*app.gateway.refunded.lock().unwrap(), vec!["pi_1".to_string()]);
    assert!(app.notification_kinds(member.id).await?.iter().any(|k| k == kinds::PAYMENT_REFUNDED));

    let err = app.ctx.billing_service
        .refund_payment(&admin, payment.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(app.gateway.refunded.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn manual_payments_refund_without_the_provider() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let member = app.member("member@gym.test").await?;

    let payment = app.ctx.billing_service
        .record_manual_payment(
            &admin,
            ManualPaymentRequest {
                user_id: member.id,
                amount_cents: 2000,
                currency: "USD".to_string(),
                description: "Cash at front desk".to_string(),
            },
        )
        .await?;
    assert_eq!(payment.payment_method, PaymentMethod::Manual);
    assert_eq!(payment.currency, "usd");

    app.gateway.fail_refunds(true);
    let refunded = app.ctx.billing_service.refund_payment(&admin, payment.id, None).await?;
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert!(app.gateway.refunded.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelling_stops_renewal_at_period_end() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member_without_subscription("member@gym.test").await?;
    let other = app.member("other@gym.test").await?;
    let subscription = app.subscribe(&member, "sub_live").await?;

    let err = app.ctx.billing_service
        .cancel_subscription(&other, subscription.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotOwner));

    let cancelled = app.ctx.billing_service.cancel_subscription(&member, subscription.id).await?;
    assert!(cancelled.cancel_at_period_end);
    assert_eq!(cancelled.status, SubscriptionStatus::Active);
    assert_eq!(*app.gateway.cancelled.lock().unwrap(), vec!["sub_live".to_string()]);

    // Repeating the request does not call the provider again
    app.ctx.billing_service.cancel_subscription(&member, subscription.id).await?;
    assert_eq!(app.gateway.cancelled.lock().unwrap().len(), 1);

    // Access remains until the period ends
    assert!(app.ctx.subscription_repo.find_current_for_user(member.id, app.now()).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn manual_grants_cancel_locally() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let plan = monthly_plan(&app, &admin).await?;
    let member = app.member_without_subscription("member@gym.test").await?;

    let granted = app.ctx.billing_service
        .grant_subscription(&admin, member.id, GrantSubscriptionRequest { plan_id: plan.id, months: 1 })
        .await?;
    let cancelled = app.ctx.billing_service.cancel_subscription(&member, granted.id).await?;

    assert!(cancelled.cancel_at_period_end);
    assert!(app.gateway.cancelled.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn checkout_requires_an_active_plan_and_no_current_subscription() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let plan = monthly_plan(&app, &admin).await?;
    let subscribed = app.member("subscribed@gym.test").await?;
    let prospect = app.member_without_subscription("prospect@gym.test").await?;

    let url = app.ctx.billing_service.start_checkout(&prospect, plan.id).await?;
    assert_eq!(url, format!("https://checkout.test/{}", plan.id));

    let err = app.ctx.billing_service.start_checkout(&subscribed, plan.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    app.ctx.billing_service.deactivate_plan(&admin, plan.id).await?;
    let err = app.ctx.billing_service.start_checkout(&prospect, plan.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert!(app.ctx.billing_service.list_plans(false).await?.is_empty());
    assert_eq!(app.ctx.billing_service.list_plans(true).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn refund_survives_the_provider_webhook_landing_first() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let member = app.member("member@gym.test").await?;
    let payment = stripe_payment(&app, &member, "pi_race").await?;

    app.gateway.refund_webhook_wins(app.pool.clone());
    let refunded = app.ctx.billing_service
        .refund_payment(&admin, payment.id, Some("duplicate charge".to_string()))
        .await?;
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refund_reason.as_deref(), Some("Refunded via provider"));
    assert_eq!(*app.gateway.refunded.lock().unwrap(), vec!["pi_race".to_string()]);

    let audit = SqliteAuditRepository::new(app.pool.clone());
    let entries = audit.list_by_action("refund_payment").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, Some(admin.id));
    assert_eq!(entries[0].resource_id.as_deref(), Some(payment.id.to_string().as_str()));
    Ok(())
}

fn intent_event(event_id: &str, kind: BillingEventKind) -> BillingEvent {
    let event_type = match kind {
        BillingEventKind::PaymentIntentFailed { .. } => "payment_intent.payment_failed",
        _ => "payment_intent.succeeded",
    };
    BillingEvent::new(event_id, event_type, kind)
}

#[tokio::test]
async fn payment_intent_is_pending_until_the_provider_confirms() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;

    let created = app.ctx.billing_service
        .create_payment_intent(
            &member,
            CreatePaymentIntentRequest {
                amount_cents: 2500,
                currency: Some("USD".to_string()),
                description: Some("Drop-in class".to_string()),
            },
        )
        .await?;
    assert_eq!(created.client_secret, "pi_test_1_secret");
    assert_eq!(created.payment.status, PaymentStatus::Pending);
    assert_eq!(created.payment.currency, "usd");
    assert_eq!(created.payment.stripe_payment_intent_id.as_deref(), Some("pi_test_1"));

    let sent = app.gateway.intents.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, member.id);
    assert_eq!(sent[0].amount_cents, 2500);
    assert_eq!(sent[0].description, "Drop-in class");

    app.ctx.subscription_sync
        .handle_event(intent_event(
            "evt_pi_ok",
            BillingEventKind::PaymentIntentSucceeded {
                payment_intent_id: "pi_test_1".to_string(),
                customer_id: None,
                amount_cents: 2500,
                currency: "usd".to_string(),
                description: None,
            },
        ))
        .await;

    let payments = app.ctx.payment_repo.find_by_user(member.id).await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Paid);
    assert_eq!(payments[0].description, "Drop-in class");
    assert!(app.notification_kinds(member.id).await?.iter().any(|k| k == kinds::PAYMENT_SUCCEEDED));
    Ok(())
}

#[tokio::test]
async fn payment_intent_rejects_tiny_amounts() -> anyhow::Result<()> {
    let app = setup().await?;
    let member = app.member("member@gym.test").await?;

    let err = app.ctx.billing_service
        .create_payment_intent(
            &member,
            CreatePaymentIntentRequest { amount_cents: 10, currency: None, description: None },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(app.gateway.intents.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_intent_can_be_marked_paid_by_an_admin() -> anyhow::Result<()> {
    let app = setup().await?;
    let admin = app.admin().await?;
    let member = app.member("member@gym.test").await?;

    let created = app.ctx.billing_service
        .create_payment_intent(
            &member,
            CreatePaymentIntentRequest { amount_cents: 2500, currency: None, description: None },
        )
        .await?;
    app.ctx.subscription_sync
        .handle_event(intent_event(
            "evt_pi_fail",
            BillingEventKind::PaymentIntentFailed { payment_intent_id: "pi_test_1".to_string() },
        ))
        .await;

    let failed = app.ctx.payment_repo.find_by_id(created.payment.id).await?.unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(app.notification_kinds(member.id).await?.iter().any(|k| k == kinds::PAYMENT_FAILED));

    let paid = app.ctx.billing_service
        .mark_payment_paid(
            &admin,
            created.payment.id,
            MarkPaidRequest { description: Some("Paid in cash at the desk".to_string()) },
        )
        .await?;
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.payment_method, PaymentMethod::Manual);
    assert_eq!(paid.description, "Paid in cash at the desk");

    let audit = SqliteAuditRepository::new(app.pool.clone());
    let entries = audit.list_by_action("mark_payment_paid").await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, Some(admin.id));
    assert_eq!(entries[0].details["previous_status"], serde_json::json!("Failed"));

    let err = app.ctx.billing_service
        .mark_payment_paid(&admin, created.payment.id, MarkPaidRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(audit.list_by_action("mark_payment_paid").await?.len(), 1);
    Ok(())
}
