pub mod commands;
pub mod events;
pub mod methods;
pub mod prompts;
pub mod records;

pub use records::{ImageRecord, USER_UPLOAD_MODEL};
