//! Prometheus exposition decoding
//!
//! - `client` - HTTP fetch and streaming hand-off of decoded families
//! - `delimited` - varint-delimited protobuf framing
//! - `text` - text format 0.0.4 parser
//! - `expand` - family to sample flattening

mod client;
mod delimited;
mod expand;
pub mod proto;
mod text;

pub use client::{ExpositionFormat, FamilyStream, ScrapeClient};
pub use delimited::{DelimitedDecoder, Frame};
pub use expand::expand_family;
pub use text::parse_text;
