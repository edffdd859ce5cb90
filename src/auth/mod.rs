pub mod lockout;
pub mod password;
pub mod rate_limit;
pub mod token;

pub use lockout::{LockState, LockoutPolicy};
pub use password::{HashError, Hasher};
pub use rate_limit::{Bucket, Decision, RateLimiter};
pub use token::{Claims, TokenError, TokenIssuer, TokenKind, TokenPair};
