pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    payments::StripeClient,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    stripe_client: Option<Arc<StripeClient>>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, stripe_client, settings);

    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        .nest("/auth", auth_routes(app_state.clone()))
        .nest("/api", api_routes(app_state.clone()))
        .nest("/admin", admin_routes(app_state.clone()))
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn authenticated(state: &AppState, router: Router<AppState>) -> Router<AppState> {
    router.route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::auth::require_auth,
    ))
}

fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .merge(authenticated(
            &state,
            Router::new().route("/me", get(handlers::auth::me)),
        ))
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/classes", class_routes(state.clone()))
        .nest("/bookings", authenticated(&state, booking_routes()))
        .nest("/attendance", authenticated(&state, attendance_routes()))
        .route("/plans", get(handlers::billing::list_plans))
        .nest("/subscriptions", authenticated(&state, subscription_routes()))
        .nest("/payments", payment_routes(state.clone()))
        .nest("/notifications", authenticated(&state, notification_routes()))
}

fn class_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Browsing the timetable needs no session
        .route("/", get(handlers::classes::list))
        .route("/:id", get(handlers::classes::get))
        .merge(authenticated(
            &state,
            Router::new()
                .route("/", post(handlers::classes::create))
                .route("/mine", get(handlers::classes::mine))
                .route("/:id", put(handlers::classes::update))
                .route("/:id/cancel", post(handlers::classes::cancel))
                .route("/:id/complete", post(handlers::classes::complete))
                .route("/:id/roster", get(handlers::classes::roster))
                .route("/:id/waitlist", delete(handlers::classes::leave_waitlist)),
        ))
}

fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::bookings::create))
        .route("/mine", get(handlers::bookings::mine))
        .route("/:id/cancel", post(handlers::bookings::cancel))
        .route("/:id/qr", post(handlers::bookings::issue_qr))
}

fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/checkin", post(handlers::attendance::check_in))
        .route("/manual", post(handlers::attendance::manual_check_in))
        .route("/class/:id", get(handlers::attendance::class_report))
        .route("/member/:id", get(handlers::attendance::member_report))
}

fn subscription_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::billing::checkout))
        .route("/mine", get(handlers::billing::my_subscriptions))
        .route("/:id/cancel", post(handlers::billing::cancel_subscription))
}

fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Signed by Stripe, not by a session
        .route("/webhook/stripe", post(handlers::webhooks::stripe_webhook))
        .merge(authenticated(
            &state,
            Router::new()
                .route("/mine", get(handlers::billing::my_payments))
                .route("/intent", post(handlers::billing::create_payment_intent)),
        ))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::notifications::feed))
        .route("/:id/read", post(handlers::notifications::mark_read))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::admin::list_users).post(handlers::admin::create_user))
        .route("/users/:id", put(handlers::admin::update_user))
        .route("/users/:id/grant-subscription", post(handlers::admin::grant_subscription))
        .route("/plans", get(handlers::admin::list_plans).post(handlers::admin::create_plan))
        .route("/plans/:id", put(handlers::admin::update_plan).delete(handlers::admin::deactivate_plan))
        .route("/payments", get(handlers::admin::list_payments))
        .route("/payments/manual", post(handlers::admin::manual_payment))
        .route("/payments/:id/refund", post(handlers::admin::refund_payment))
        .route("/payments/:id/mark-paid", post(handlers::admin::mark_payment_paid))
        .route("/audit-log", get(handlers::admin::audit_log))
        .route("/jobs/reconcile", post(handlers::admin::run_reconciliation))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}
