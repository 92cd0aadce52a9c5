//! Entity model definitions.

pub mod message;
