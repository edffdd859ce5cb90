pub mod security_log;
pub mod user;
