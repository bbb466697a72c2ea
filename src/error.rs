use thiserror::Error;

/// A structural failure in one test file. Fatal for that file only: the
/// file is rejected and counted, then processing moves on. Never retried.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The mandatory first line of a legacy test is malformed.
    #[error("corrupted first line: {0}")]
    BadHeader(String),

    /// The header names a protocol other than icmp, udp, or tcp.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A 4-field hop tuple failed structural validation.
    #[error("malformed hop tuple: {0}")]
    MalformedTuple(String),

    /// A hop line ended partway through a tuple.
    #[error("incomplete hop data")]
    IncompleteHop,

    /// The structured metadata record has no uuid; the whole file is
    /// rejected with no partial result.
    #[error("metadata record has an empty uuid")]
    MissingUuid,

    /// A structured record failed both strict and permissive decoding.
    #[error("undecodable json record: {0}")]
    CorruptedJson(String),

    /// The test file suffix matches no known format.
    #[error("unsupported test name: {0}")]
    UnsupportedTest(String),
}

/// Failure in the external commit path. Propagated to the caller
/// unmodified; retries are the sink's own responsibility.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Either failure mode of processing one test file.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
