pub mod admin;
pub mod attendance;
pub mod auth;
pub mod billing;
pub mod bookings;
pub mod classes;
pub mod notifications;
pub mod root;
pub mod webhooks;
