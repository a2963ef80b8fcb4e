//! Route paths.

pub const POST_AUTH_REGISTER: &str = "/api/auth/register";
pub const POST_AUTH_LOGIN: &str = "/api/auth/login";
pub const POST_AUTH_REFRESH: &str = "/api/auth/refresh";
pub const POST_AUTH_REVOKE: &str = "/api/auth/revoke";
pub const POST_AUTH_LOGOUT: &str = "/api/auth/logout";
