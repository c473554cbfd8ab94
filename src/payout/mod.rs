pub mod model;
pub mod service;

pub use model::{NewPayoutRequest, PayoutMethod, PayoutStatus, Transition};
pub use service::{PayoutResult, PayoutService, StatusUpdate};
