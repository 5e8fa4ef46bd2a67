//! TIDAL session authorization
//!
//! Everything that turns a configured client into an authorized session:
//! credential persistence ([`store`]), the interactive authorization-code
//! flow and its local callback listener ([`flow`], [`callback`]), the
//! background refresh loop ([`scheduler`]), and the [`TidalAuthorizer`]
//! coordinator that ties them together.

pub mod authorizer;
pub mod callback;
pub mod credentials;
pub mod flow;
pub mod scheduler;
pub mod store;

pub use authorizer::TidalAuthorizer;
pub use credentials::Credentials;
pub use store::CredentialStore;

use std::time::Duration;

/// How long session teardown waits for background tasks to wind down
/// before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
