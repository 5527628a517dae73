//! Host-visible proxies for lua values
//!
//! Both proxy types hold a shared [`PersistentRef`](crate::reference::PersistentRef)
//! and own nothing else. Every operation fetches the guest value from the
//! registry, runs inside a call scope, and marshals the result back, so
//! several proxies for the same table observe each other's writes.

pub mod function;
pub mod table;

pub use function::LuaFunction;
pub use table::LuaTable;
