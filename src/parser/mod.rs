//! Message parsing: `mail-parser` decoding, generated names, and the event stream.

pub mod events;
pub mod mime;
pub mod naming;
