// src/macros.rs

/// Structured log line: timestamp, level, component, pid, tid, message.
///
/// The record target is `feedwatch::<component>`, so a fern/env filter can
/// raise or lower a single component.
///
/// ```ignore
/// feed_log!(Level::Info, "supervisor", "Feed {} started", feed_id);
/// feed_log!(Level::Warn, "scheduler", "Queue full, rejected job for {}", feed_id);
/// ```
///
/// Produces:
/// `[2025-04-25T16:32:10+02:00][INFO][supervisor][pid=4568][tid=ThreadId(3)] Feed cam-01 started`
#[macro_export]
macro_rules! feed_log {
    ($level:expr, $component:literal, $($arg:tt)+) => {
        log::log!(
            target: concat!("feedwatch::", $component),
            $level,
            "[{}][{}][{}][pid={}][tid={:?}] {}",
            chrono::Local::now().to_rfc3339(),
            $level,
            $component,
            std::process::id(),
            std::thread::current().id(),
            format_args!($($arg)+)
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::feed_log;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// Captures `target|message` lines up to DEBUG.
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    static CAPTURE: Capture = Capture { lines: Mutex::new(Vec::new()) };

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) && record.target().starts_with("feedwatch") {
                let line = format!("{}|{}", record.target(), record.args());
                self.lines.lock().unwrap().push(line);
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn prefixes_and_targets_the_component() {
        // Only one logger per process; if another test got there first, skip.
        if log::set_logger(&CAPTURE).is_err() {
            return;
        }
        log::set_max_level(LevelFilter::Debug);

        feed_log!(Level::Debug, "scheduler", "Answer={}!", 42);
        feed_log!(Level::Warn, "alerts", "plain");

        // Other tests may log through the same logger concurrently.
        let lines: Vec<String> = std::mem::take(&mut *CAPTURE.lines.lock().unwrap())
            .into_iter()
            .filter(|l| l.ends_with("] Answer=42!") || l.ends_with("] plain"))
            .collect();
        assert_eq!(lines.len(), 2);
        let (target, msg) = lines[0].split_once('|').unwrap();
        assert_eq!(target, "feedwatch::scheduler");
        assert!(msg.starts_with('['), "no timestamp: {msg}");
        assert!(msg.contains("[DEBUG][scheduler][pid="), "bad prefix: {msg}");
        assert!(msg.ends_with("] Answer=42!"), "bad payload: {msg}");
        assert!(lines[1].starts_with("feedwatch::alerts|") && lines[1].ends_with(" plain"));
    }
}
