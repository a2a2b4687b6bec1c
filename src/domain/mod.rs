pub mod user;
pub mod class_session;
pub mod booking;
pub mod checkin;
pub mod plan;
pub mod subscription;
pub mod payment;
pub mod notification;
pub mod audit;

pub use user::*;
pub use class_session::*;
pub use booking::*;
pub use checkin::*;
pub use plan::*;
pub use subscription::*;
pub use payment::*;
pub use notification::*;
pub use audit::*;
