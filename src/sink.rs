use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink writer lock poisoned")]
    Poisoned,
}

/// Destination for rendered log lines.
///
/// The pipeline calls `write_line` synchronously on the emitting thread,
/// possibly from many threads at once. Implementations must write the
/// whole line (plus a trailing newline) atomically with respect to other
/// calls so concurrent lines never interleave.
pub trait LogSink: Send + Sync {
    /// Human-readable name used when reporting failures.
    fn name(&self) -> &str;

    /// Write one line. `line` carries no trailing newline.
    fn write_line(&self, line: &str) -> Result<(), SinkError>;

    /// Flush any buffered output. Default implementation is a no-op.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// The set of sinks every rendered line fans out to.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Write `line` to every sink.
    ///
    /// A failing sink is reported on stderr and does not stop the others.
    /// Returns the number of sinks that accepted the line.
    pub fn write_line(&self, line: &str) -> usize {
        let mut written = 0;
        for sink in &self.sinks {
            match sink.write_line(line) {
                Ok(()) => written += 1,
                Err(e) => eprintln!("log sink {} failed: {}", sink.name(), e),
            }
        }
        written
    }

    pub fn flush(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                eprintln!("log sink {} flush failed: {}", sink.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|s| s.name()))
            .finish()
    }
}
