//! Legacy `.paris` free-text format: header classification, tuple
//! processing, and hop-tree emission.

pub mod line;
pub mod tree;
pub mod tuple;

pub use line::{parse_header, split_hop_line, Header, Protocol};
pub use tree::build_hops;
pub use tuple::process_tuple;
