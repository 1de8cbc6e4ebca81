//! Entity model definitions.

pub mod credential;
pub mod message;
pub mod room;
pub mod user;
