//! Custom attributes attached to metadata entities.
//!
//! Attribute blobs arrive decoded: the weaver only needs the constructor (to find the
//! attribute type) and the named property arguments (to configure the aspect instance).

mod types;

pub use types::*;
