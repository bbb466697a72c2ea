// Public API - parsing, buffering, and sink types
pub mod assemble;
pub mod error;
pub mod filename;
pub mod guard;
pub mod legacy;
pub mod metrics;
pub mod model;
pub mod scamper;
pub mod sink;
