//! Lunar Bridge
//!
//! Embeds a Lua 5.4 interpreter and moves values, functions and objects
//! across the boundary in both directions.
//!
//! ## Architecture
//!
//! - **Session:** owns the interpreter, its registry and globals
//! - **Marshaling:** scalars are copied; tables, functions and userdata become
//!   proxies ([`LuaTable`], [`LuaFunction`]) backed by a registry slot
//! - **Host side:** [`HostFunction`] and [`HostObject`] values enter lua as
//!   userdata whose lifetime follows the lua collector
//! - **Errors:** lua errors come back as [`BridgeError`]; host failures are
//!   raised inside lua as plain string errors that `pcall` can catch
//!
//! A session and everything attached to it is single-threaded. Proxies that
//! outlive their session fail with [`BridgeError::DanglingReference`].
//!
//! Cycles running through both runtimes (a lua table holding a host object
//! that holds the same table) are never collected.
//!
//! See examples/embed.rs for a walkthrough.

pub mod config;
pub mod error;
pub mod host;
mod marshal;
pub mod proxy;
mod reference;
pub mod session;
pub mod value;

pub use config::{LibrarySet, SessionConfig};
pub use error::{BridgeError, MarshalError};
pub use host::{HostFunction, HostObject, Namespace};
pub use proxy::{LuaFunction, LuaTable};
pub use session::{BridgeStats, Session};
pub use value::{HostObjectRef, HostValue};

pub use mlua;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
