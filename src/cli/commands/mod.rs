mod audit;
mod unlock;

pub use audit::cmd_audit;
pub use unlock::cmd_unlock;
