pub mod router;
pub mod types;

pub use router::{route_push, DEFAULT_NOTIFICATION_TITLE};
pub use types::{PushHandler, PushOutcome, PushRoute};
