pub mod broker;
pub mod error;
pub mod page;
pub mod retry;
pub mod server;

pub use broker::{Broker, LinkSettings, Relinker};
pub use error::LinkError;
pub use retry::with_relink_on_auth_error;
pub use server::{CallbackOutcome, CallbackServer, Flow};
