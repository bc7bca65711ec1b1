//! `multipart/form-data` composition.

pub mod composer;
pub mod part;
