//! Permission codes the server's own routes require.

pub const SESSION_REFRESH: &str = "session.refresh";
pub const PROFILE_READ: &str = "profile.read";
pub const USER_READ: &str = "user.read";
