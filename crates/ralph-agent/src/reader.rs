use chrono::{DateTime, Local};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Which pipe a line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Messages sent from a reader task to the supervisor
#[derive(Debug)]
pub enum StreamEvent {
    Line {
        stream: StreamKind,
        at: DateTime<Local>,
        received: Instant,
        line: String,
    },
    /// The reader hit an I/O error and stopped
    Failed { stream: StreamKind, error: String },
}

/// Spawn a task that reads `reader` line by line and forwards each line,
/// stamped with its arrival time, until end of stream.
///
/// Invalid UTF-8 is replaced rather than treated as an error. A read error
/// ends this reader only; the supervisor and the other reader carry on. The
/// task also stops as soon as the receiving side has gone away.
pub fn spawn_line_reader<R>(
    reader: R,
    stream: StreamKind,
    tx: UnboundedSender<StreamEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(4096);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    trace!(%stream, line = %line, "line");
                    let event = StreamEvent::Line {
                        stream,
                        at: Local::now(),
                        received: Instant::now(),
                        line,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%stream, error = %e, "stream read failed");
                    let _ = tx.send(StreamEvent::Failed {
                        stream,
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }
    })
}
