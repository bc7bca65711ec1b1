//! Transient storage for attachment bytes and composed bodies.

pub mod temp;
