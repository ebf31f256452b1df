use crate::sink::{LogSink, SinkError};
use std::io::Write;

/// Console stream a [`ConsoleSink`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

/// Writes each line to stdout or stderr.
///
/// The stream lock is held for the whole line, so lines from concurrent
/// emitters never interleave.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    stream: ConsoleStream,
}

impl ConsoleSink {
    pub fn new(stream: ConsoleStream) -> Self {
        ConsoleSink { stream }
    }

    pub fn stdout() -> Self {
        Self::new(ConsoleStream::Stdout)
    }
}

fn write_framed(out: &mut impl Write, line: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    out.write_all(&buf)
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &str {
        match self.stream {
            ConsoleStream::Stdout => "stdout",
            ConsoleStream::Stderr => "stderr",
        }
    }

    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        match self.stream {
            ConsoleStream::Stdout => write_framed(&mut std::io::stdout().lock(), line)?,
            ConsoleStream::Stderr => write_framed(&mut std::io::stderr().lock(), line)?,
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        match self.stream {
            ConsoleStream::Stdout => std::io::stdout().flush()?,
            ConsoleStream::Stderr => std::io::stderr().flush()?,
        }
        Ok(())
    }
}
