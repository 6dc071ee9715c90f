//!  Storage of focus intervals.
//!   - The whole log is a single json document kept under [STORE_KEY] in a [kv::KeyValueStore].
//!   - The document maps a domain to its [entities::DomainLedger]: intervals in chronological
//!     order plus the total of the closed ones.
//!   - [focus_store::FocusEventStore] does read-modify-write of that document on every change.

pub mod entities;
pub mod focus_store;
pub mod kv;

/// Key the focus log is persisted under.
pub const STORE_KEY: &str = "tabFocusEvents";
