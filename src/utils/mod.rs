pub mod storage;

pub use storage::{save_media, unix_millis};
