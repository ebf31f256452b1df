use crate::sink::{LogSink, SinkError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileRotation {
    /// One append-only file, named exactly after the configured filename.
    #[default]
    Never,
    Hourly,
    Daily,
}

impl FileRotation {
    fn as_rotation(self) -> Rotation {
        match self {
            FileRotation::Never => Rotation::NEVER,
            FileRotation::Hourly => Rotation::HOURLY,
            FileRotation::Daily => Rotation::DAILY,
        }
    }
}

/// Appends lines to a file under a log directory.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<RollingFileAppender>,
}

impl FileSink {
    /// Open `directory/filename` for appending, creating the directory if
    /// it does not exist yet.
    pub fn open(
        directory: impl AsRef<Path>,
        filename: &str,
        rotation: FileRotation,
    ) -> Result<Self, InitError> {
        let directory = directory.as_ref();
        let writer = RollingFileAppender::builder()
            .rotation(rotation.as_rotation())
            .filename_prefix(filename)
            .build(directory)?;

        Ok(FileSink {
            path: directory.join(filename),
            writer: Mutex::new(writer),
        })
    }

    /// Path of the (current, for rotating sinks: base) log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        write_terminated(&mut *writer, line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.flush()?;
        Ok(())
    }
}

/// Write `line` and its newline in one call. On failure, whatever part of
/// the line reached the writer is terminated so the next line starts clean.
fn write_terminated(writer: &mut impl Write, line: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');

    if let Err(e) = writer.write_all(&buf) {
        let _ = writer.write_all(b"\n");
        return Err(e);
    }
    Ok(())
}
