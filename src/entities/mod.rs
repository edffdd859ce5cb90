pub mod prelude;

pub mod security_logs;
pub mod users;
