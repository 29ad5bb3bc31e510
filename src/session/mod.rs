//! Session identity: who is chatting and which conversation scope replies route to.

pub mod identity;

pub use identity::{Session, SessionManager, UserContext, normalize_first_name};
