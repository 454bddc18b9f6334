pub mod config;
pub mod confirm;
pub mod db;
mod error;
pub mod logging;
pub mod model;
pub mod reorg;
pub mod schema_guard;

pub use error::{AppError, AppResult, ErrorKind};
pub use logging::init_logging;
