pub mod tokens {

    pub const ISSUER: &str = "tortomaniya-api";

    pub const AUDIENCE: &str = "tortomaniya-client";

    pub const BEARER_PREFIX: &str = "Bearer ";
}

pub mod limits {

    pub const MAX_EMAIL_LEN: usize = 254;

    pub const MAX_TEXT_LEN: usize = 1000;

    pub const MIN_PASSWORD_LEN: usize = 8;

    pub const DEFAULT_AUDIT_LIMIT: u64 = 20;

    pub const MAX_LOG_PAGE_SIZE: u64 = 200;

    /// Upper bound for token lifetimes and lock durations, in seconds (ten years).
    pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;
}
