use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Local;

/// Width of the box-drawn sections in the run log, borders included.
pub const SECTION_WIDTH: usize = 67;

const HEAVY_H: char = '═';
const HEAVY_V: char = '║';
const LIGHT_H: char = '─';

/// Wall-clock timestamp with millisecond precision, as used on event lines.
pub fn timestamp_millis() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Wall-clock timestamp with second precision, as used in headers.
pub fn timestamp_seconds() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

enum Sink {
    File(File),
    Memory(Vec<u8>),
}

/// The human-readable, append-only run log.
///
/// Every write is flushed immediately so the file can be tailed while an
/// iteration is streaming. Write failures are swallowed: losing a log line
/// must never take down the loop.
pub struct Transcript {
    sink: Mutex<Sink>,
    path: Option<PathBuf>,
}

impl Transcript {
    /// Create (or truncate) the log file at `path`, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self {
            sink: Mutex::new(Sink::File(file)),
            path: Some(path.to_path_buf()),
        })
    }

    /// A transcript that keeps everything in memory. Used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            sink: Mutex::new(Sink::Memory(Vec::new())),
            path: None,
        }
    }

    /// Default log path: `/tmp/ralph_<workdir>_<timestamp>_iteration.log`.
    pub fn default_path(working_dir: &Path) -> PathBuf {
        let basename = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        std::env::temp_dir().join(format!("ralph_{}_{}_iteration.log", basename, stamp))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append raw text.
    pub fn write(&self, text: &str) {
        if let Ok(mut sink) = self.sink.lock() {
            match &mut *sink {
                Sink::File(file) => {
                    let _ = file.write_all(text.as_bytes());
                    let _ = file.flush();
                }
                Sink::Memory(buf) => buf.extend_from_slice(text.as_bytes()),
            }
        }
    }

    /// Append one line of text.
    pub fn line(&self, text: &str) {
        self.write(&format!("{}\n", text));
    }

    /// Everything written so far. File-backed transcripts are read back from disk.
    pub fn contents(&self) -> String {
        match self.sink.lock() {
            Ok(sink) => match &*sink {
                Sink::Memory(buf) => String::from_utf8_lossy(buf).into_owned(),
                Sink::File(_) => self
                    .path
                    .as_ref()
                    .and_then(|p| fs::read_to_string(p).ok())
                    .unwrap_or_default(),
            },
            Err(_) => String::new(),
        }
    }

    pub fn box_top(&self) {
        self.line(&format!("╔{}╗", heavy_rule()));
    }

    pub fn box_bottom(&self) {
        self.line(&format!("╚{}╝", heavy_rule()));
    }

    pub fn box_line(&self, text: &str) {
        self.line(&format!("{} {}", HEAVY_V, text));
    }

    pub fn box_divider(&self, heavy: bool) {
        if heavy {
            self.line(&format!("╠{}╣", heavy_rule()));
        } else {
            self.line(&format!("╟{}╢", LIGHT_H.to_string().repeat(SECTION_WIDTH - 2)));
        }
    }

    /// Top border, title line and a heavy divider.
    pub fn box_header(&self, title: &str) {
        self.box_top();
        self.box_line(title);
        self.box_divider(true);
    }
}

fn heavy_rule() -> String {
    HEAVY_H.to_string().repeat(SECTION_WIDTH - 2)
}

/// Timestamped event lines with elapsed time since the clock started.
///
/// Renders `[2024-01-01 12:00:00.000] [+1.25s] [KIND] message | k=v`.
#[derive(Clone)]
pub struct EventLog {
    transcript: Arc<Transcript>,
    started: Instant,
}

impl EventLog {
    pub fn start(transcript: Arc<Transcript>) -> Self {
        Self {
            transcript,
            started: Instant::now(),
        }
    }

    pub fn event(&self, kind: &str, message: &str, fields: &[(&str, String)]) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut line = format!(
            "[{}] [+{:.2}s] [{}] {}",
            timestamp_millis(),
            elapsed,
            kind,
            message
        );
        if !fields.is_empty() {
            let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            line.push_str(" | ");
            line.push_str(&rendered.join(" | "));
        }
        self.transcript.line(&line);
    }

    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_sections_have_fixed_width() {
        let transcript = Transcript::in_memory();
        transcript.box_header("Iteration 1");
        transcript.box_divider(false);
        transcript.box_bottom();

        let contents = transcript.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].chars().count(), SECTION_WIDTH);
        assert_eq!(lines[1], "║ Iteration 1");
        assert!(lines[2].starts_with('╠'));
        assert!(lines[3].starts_with('╟'));
        assert_eq!(lines[4].chars().count(), SECTION_WIDTH);
    }

    #[test]
    fn test_event_line_format() {
        let transcript = Arc::new(Transcript::in_memory());
        let events = EventLog::start(transcript.clone());
        events.event("HEARTBEAT", "Process still running", &[("check", "1".into())]);

        let contents = transcript.contents();
        assert!(contents.contains("] [+0."));
        assert!(contents.contains("[HEARTBEAT] Process still running | check=1"));
    }

    #[test]
    fn test_file_transcript_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let transcript = Transcript::create(&path).unwrap();
        transcript.line("hello");

        assert_eq!(transcript.path(), Some(path.as_path()));
        assert_eq!(transcript.contents(), "hello\n");
    }

    #[test]
    fn test_default_path_uses_workdir_basename() {
        let path = Transcript::default_path(Path::new("/home/user/project"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ralph_project_"));
        assert!(name.ends_with("_iteration.log"));
    }
}
