//! Commit boundary: once a test leaves the pollution buffer it is handed
//! to a sink exactly once and never comes back.

use std::io::Write;

use crate::error::SinkError;
use crate::model::AssembledTest;

/// Running totals a sink reports about its commit path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub accepted: u64,
    pub committed: u64,
    pub failed: u64,
    pub pending: u64,
}

impl SinkStats {
    pub fn total(&self) -> u64 {
        self.committed + self.failed + self.pending
    }
}

/// Destination for assembled tests. `commit` takes ownership; a test handed
/// over is the sink's to deliver or fail, the caller will not re-send it.
pub trait Sink {
    fn commit(&mut self, test: AssembledTest) -> Result<(), SinkError>;

    /// Force out anything the sink is still holding.
    fn flush(&mut self) -> Result<(), SinkError>;

    fn stats(&self) -> SinkStats;
}

/// Newline-delimited JSON writer, one record per committed test.
pub struct JsonlSink<W: Write> {
    writer: W,
    stats: SinkStats,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            stats: SinkStats::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonlSink<W> {
    fn commit(&mut self, test: AssembledTest) -> Result<(), SinkError> {
        self.stats.accepted += 1;
        let result = serde_json::to_writer(&mut self.writer, &test)
            .map_err(SinkError::from)
            .and_then(|_| self.writer.write_all(b"\n").map_err(SinkError::from));
        match result {
            Ok(()) => {
                self.stats.committed += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.failed += 1;
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}

/// In-memory sink for assertions.
#[derive(Debug, Default)]
pub struct VecSink {
    pub tests: Vec<AssembledTest>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for VecSink {
    fn commit(&mut self, test: AssembledTest) -> Result<(), SinkError> {
        self.tests.push(test);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn stats(&self) -> SinkStats {
        SinkStats {
            accepted: self.tests.len() as u64,
            committed: self.tests.len() as u64,
            failed: 0,
            pending: 0,
        }
    }
}
