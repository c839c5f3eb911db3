/// Router Module Index
///
/// Routing is split by access requirement. Each protected module wraps its whole tree in a
/// `RoleGate` layer, so no handler in it can be reached without passing the route guard.

/// Routes accessible to everyone: login landing, session management, guard long-poll.
pub mod public;

/// Routes requiring the `admin` role.
pub mod admin;

/// Routes requiring the `customer` role.
pub mod account;
