//! sea-orm entities backing actor authorization.
//!
//! The authorization core only reads these tables; writes happen in account
//! management tooling and the server `seed` command.

pub mod actors;
pub mod permissions;
pub mod role_assignments;
pub mod role_permissions;
pub mod roles;
