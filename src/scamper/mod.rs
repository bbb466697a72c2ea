//! Structured scamper `.jsonl` format: typed records and the relaxed
//! fallback reader for near-JSON producers.

pub mod records;
pub mod relaxed;

pub use records::{hops_from_tracelb, parse_structured, StructuredOutput, Tracelb};
