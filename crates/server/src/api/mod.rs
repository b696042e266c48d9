//! HTTP routes served by the binary

pub mod replay;
