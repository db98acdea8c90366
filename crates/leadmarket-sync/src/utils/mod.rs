pub mod time;

pub use time::{is_expired, is_expired_at, now_millis};
