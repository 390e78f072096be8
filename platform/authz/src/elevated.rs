//! Roles that implicitly hold every permission.

use entity::roles;

/// Role names that grant everything.
pub const ELEVATED_ROLE_NAMES: [&str; 2] = ["SuperAdmin", "Admin"];

/// Sentinel role codes that grant everything.
pub const ELEVATED_ROLE_CODES: [&str; 2] = ["0", "1"];

/// Exact, case-sensitive match on either the role name or the role code.
pub fn is_elevated_role(role: &roles::Model) -> bool {
    ELEVATED_ROLE_NAMES.contains(&role.name.as_str())
        || ELEVATED_ROLE_CODES.contains(&role.code.as_str())
}
