pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
pub mod sync;

pub use commands::{run, Command};
pub use config::{Config, ConfigError};
pub use context::AppContext;
pub use error::AppError;
pub use sync::{SyncContext, SyncReport, Target};
