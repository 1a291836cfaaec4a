//! mpv JSON IPC property source
//!
//! Talks to a running mpv started with `--input-ipc-server=<path>`.
//! Requests are newline-delimited JSON; replies are matched by `request_id`
//! and asynchronous event lines are skipped.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{ASTATS_FILTER, PropertyNode, PropertySource};
use crate::error::{BridgeError, Result};

const IO_TIMEOUT: Duration = Duration::from_millis(500);

struct Connection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

/// [`PropertySource`] backed by an mpv IPC socket
pub struct MpvIpcSource {
    path: PathBuf,
    conn: Mutex<Connection>,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for MpvIpcSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpvIpcSource")
            .field("path", &self.path)
            .finish()
    }
}

impl MpvIpcSource {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path)
            .map_err(|e| BridgeError::init("mpv IPC connection", e))?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        let writer = stream.try_clone()?;
        tracing::info!("Connected to mpv IPC socket at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(Connection {
                reader: BufReader::new(stream),
                writer,
            }),
            next_request_id: AtomicU64::new(1),
        })
    }

    /// Insert or remove the astats instrumentation filter
    pub fn set_peaks_enabled(&self, enabled: bool) -> Result<()> {
        let command = if enabled {
            json!(["af", "add", ASTATS_FILTER])
        } else {
            json!(["af", "remove", "@astats"])
        };
        self.request(command).map(|_| ())
    }

    fn request(&self, command: Value) -> Result<Value> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut line = json!({ "command": command, "request_id": request_id }).to_string();
        line.push('\n');

        let mut conn = self.conn.lock();
        conn.writer.write_all(line.as_bytes())?;

        let mut buf = String::new();
        loop {
            buf.clear();
            if conn.reader.read_line(&mut buf)? == 0 {
                return Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "mpv closed the IPC socket",
                )));
            }
            let reply: Value = match serde_json::from_str(buf.trim_end()) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("Skipping unparseable mpv IPC line: {}", e);
                    continue;
                }
            };
            if reply.get("request_id").and_then(Value::as_u64) == Some(request_id) {
                return reply_data(reply);
            }
        }
    }
}

impl PropertySource for MpvIpcSource {
    fn get_property(&self, name: &str) -> Result<PropertyNode> {
        match self.request(json!(["get_property", name])) {
            Err(BridgeError::Unavailable(_)) => Err(BridgeError::Unavailable(name.to_string())),
            other => other.map(node_from_json),
        }
    }
}

fn reply_data(mut reply: Value) -> Result<Value> {
    match reply.get("error").and_then(Value::as_str) {
        Some("success") => Ok(reply.get_mut("data").map(Value::take).unwrap_or(Value::Null)),
        Some("property unavailable") => Err(BridgeError::Unavailable("property".to_string())),
        Some("property not found") => Err(BridgeError::FormatMismatch(
            "property not found".to_string(),
        )),
        Some(other) => Err(BridgeError::Io(std::io::Error::other(format!(
            "mpv rejected command: {}",
            other
        )))),
        None => Err(BridgeError::FormatMismatch(
            "reply without error field".to_string(),
        )),
    }
}

/// Convert a decoded JSON reply into the engine's node shape
pub fn node_from_json(value: Value) -> PropertyNode {
    match value {
        Value::Null => PropertyNode::None,
        Value::Bool(b) => PropertyNode::Flag(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => PropertyNode::Int64(i),
            None => PropertyNode::Double(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => PropertyNode::String(s),
        Value::Array(items) => PropertyNode::Array(items.into_iter().map(node_from_json).collect()),
        Value::Object(map) => PropertyNode::Map(
            map.into_iter()
                .map(|(k, v)| (k, node_from_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::PeakReader;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_node_from_json() {
        let node = node_from_json(json!({
            "lavfi.astats.1.Peak_level": "-3.0",
            "n": 4,
            "x": 1.5,
            "list": [true, null],
        }));
        let PropertyNode::Map(entries) = node else {
            panic!("expected map");
        };
        assert!(entries.contains(&(
            "lavfi.astats.1.Peak_level".to_string(),
            PropertyNode::String("-3.0".into())
        )));
        assert!(entries.contains(&("n".to_string(), PropertyNode::Int64(4))));
        assert!(entries.contains(&("x".to_string(), PropertyNode::Double(1.5))));
        assert!(entries.contains(&(
            "list".to_string(),
            PropertyNode::Array(vec![PropertyNode::Flag(true), PropertyNode::None])
        )));
    }

    #[test]
    fn test_reply_errors() {
        let err = reply_data(json!({"error": "property unavailable", "request_id": 1}))
            .unwrap_err();
        assert!(err.is_transient());
        let err = reply_data(json!({"error": "property not found"})).unwrap_err();
        assert!(matches!(err, BridgeError::FormatMismatch(_)));
    }

    /// Serve `replies` to the first client, one per request line
    fn fake_mpv(replies: Vec<Value>) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpv.sock");
        let listener = UnixListener::bind(&path).unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            for mut reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    return;
                }
                let request: Value = serde_json::from_str(&line).unwrap();
                reply["request_id"] = request["request_id"].clone();
                writeln!(writer, "{}", json!({"event": "audio-reconfig"})).unwrap();
                writeln!(writer, "{}", reply).unwrap();
            }
        });
        (dir, path)
    }

    #[test]
    fn test_reads_peaks_over_socket() {
        let (_dir, path) = fake_mpv(vec![
            json!({"error": "property unavailable"}),
            json!({"error": "success", "data": {
                "lavfi.astats.1.Peak_level": "-1.5",
                "lavfi.astats.2.Peak_level": "-2.5",
                "lavfi.astats.1.RMS_level": "-20.0",
                "lavfi.astats.2.RMS_level": "-21.0",
            }}),
        ]);
        let reader = PeakReader::new(MpvIpcSource::connect(&path).unwrap());

        let err = reader.read_peaks().unwrap_err();
        assert!(matches!(err, BridgeError::Unavailable(ref p) if p == "af-metadata/astats"));

        let sample = reader.read_peaks().unwrap();
        assert_eq!(sample.left_peak, -1.5);
        assert_eq!(sample.right_rms, -21.0);
    }
}
