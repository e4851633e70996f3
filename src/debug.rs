use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Optional JSONL pipeline log. One line per `emoji.*` event, plus named
/// counters rolled up into a summary line per generation.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

/// A field value for `DebugLogger::event`. Numbers are written bare, text is
/// escaped and quoted.
pub(crate) enum Field {
    Num(f64),
    Int(u64),
    Text(String),
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    pub fn event(&self, kind: &str, fields: &[(&str, Field)]) {
        let mut json = format!("{{\"type\":\"{}\"", json_escape(kind));
        for (name, value) in fields {
            json.push_str(&format!(",\"{}\":", json_escape(name)));
            match value {
                Field::Num(v) => json.push_str(&format!("{v:.3}")),
                Field::Int(v) => json.push_str(&v.to_string()),
                Field::Text(v) => json.push_str(&format!("\"{}\"", json_escape(v))),
            }
        }
        json.push('}');
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Drain the counters into one `emoji.summary` line.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let mut counts = String::from("{");
            for (idx, (key, value)) in counters.iter().enumerate() {
                if idx > 0 {
                    counts.push(',');
                }
                counts.push_str(&format!("\"{}\":{}", json_escape(key), value));
            }
            counts.push('}');
            let json = format!(
                "{{\"type\":\"emoji.summary\",\"context\":\"{}\",\"counts\":{}}}",
                json_escape(context),
                counts
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_log_path(tag: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "textmoji_{tag}_{}_{}.jsonl",
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn writes_events_and_summary() {
        let path = temp_log_path("debug");
        let logger = DebugLogger::new(&path).unwrap();
        logger.event(
            "emoji.layout",
            &[
                ("lines", Field::Int(2)),
                ("policy", Field::Text("greedy".to_string())),
            ],
        );
        logger.increment("generate.ok", 1);
        logger.emit_summary("generate");
        logger.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("{\"type\":\"emoji.layout\",\"lines\":2,\"policy\":\"greedy\"}"));
        assert!(contents.contains("\"generate.ok\":1"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn escapes_quotes_and_control_characters() {
        assert_eq!(json_escape("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
