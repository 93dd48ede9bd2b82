//! Session storage.
//!
//! [`SessionStore`] is the contract backends implement;
//! [`InMemorySessionStore`] is the embedded reference backend.

mod memory;
mod traits;

pub use memory::InMemorySessionStore;
pub use traits::{SessionSnapshot, SessionStore, StoreError};
