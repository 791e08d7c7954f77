//! Terminal spinner and cancellation signal.
//!
//! Neither shares domain state with the pipelines: the spinner only reads its
//! own done flag, and the pipelines only poll the cancel token.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Shared flag set on interrupt and polled by the log reader
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Animated "working" line on stderr, leaving stdout to the summary.
///
/// Joined by `finish`, or by `Drop` on any other exit path.
pub struct ProgressIndicator {
    done: Arc<AtomicBool>,
    success: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressIndicator {
    /// Start the spinner thread. A disabled indicator never spawns a thread.
    pub fn start(label: &str, enabled: bool) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let success = Arc::new(AtomicBool::new(false));

        let handle = if enabled {
            let done = done.clone();
            let success = success.clone();
            let label = label.to_string();
            Some(thread::spawn(move || spin(io::stderr(), &label, &done, &success)))
        } else {
            None
        };

        Self {
            done,
            success,
            handle,
        }
    }

    /// Stop the spinner; on success it replaces itself with "Done."
    pub fn finish(mut self, success: bool) {
        self.stop(success);
    }

    fn stop(&mut self, success: bool) {
        self.success.store(success, Ordering::SeqCst);
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop(false);
        }
    }
}

fn spin<W: Write>(mut out: W, label: &str, done: &AtomicBool, success: &AtomicBool) {
    for frame in FRAMES.iter().cycle() {
        if done.load(Ordering::SeqCst) {
            break;
        }
        let _ = write!(out, "\r\x1b[33m{} {}\x1b[0m", label, frame);
        let _ = out.flush();
        thread::sleep(FRAME_INTERVAL);
    }

    if success.load(Ordering::SeqCst) {
        let _ = writeln!(out, "\r\x1b[1;32mDone.                   \x1b[0m");
    } else {
        let _ = writeln!(out);
    }
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_disabled_indicator_spawns_nothing() {
        let progress = ProgressIndicator::start("working", false);
        assert!(progress.handle.is_none());
        progress.finish(true);
    }

    #[test]
    fn test_spinner_writes_to_its_own_stream() {
        let mut out = Vec::new();
        spin(&mut out, "working", &AtomicBool::new(true), &AtomicBool::new(true));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Done."));
        assert!(!text.contains("working"));

        let mut out = Vec::new();
        spin(&mut out, "working", &AtomicBool::new(true), &AtomicBool::new(false));
        assert_eq!(out, b"\n");
    }

    #[test]
    fn test_indicator_joins_on_finish_and_drop() {
        let progress = ProgressIndicator::start("working", true);
        assert!(progress.handle.is_some());
        progress.finish(true);

        let progress = ProgressIndicator::start("working", true);
        drop(progress);
    }
}
