pub const SESSION_COOKIE: &str = "jwt";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Largest request body accepted by the JSON endpoints.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PATCH", "DELETE"];
pub const ALLOWED_HEADERS: &[&str] = &["authorization", "content-type"];
