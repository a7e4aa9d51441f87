pub mod config;
pub mod session;

pub use config::{ClientConfig, DEFAULT_MAX_BATCH_FILES, DEFAULT_MAX_UPLOAD_BYTES};
pub use session::Session;
