pub mod event_cache;
pub mod events;
pub mod gateway;
pub mod stripe_client;
pub mod sync;

pub use event_cache::EventCache;
pub use events::{BillingEvent, BillingEventKind};
pub use gateway::{BillingGateway, CheckoutRequest, CreatedPaymentIntent, DisabledGateway, PaymentIntentRequest};
pub use stripe_client::StripeClient;
pub use sync::{SubscriptionSync, WebhookAck};
