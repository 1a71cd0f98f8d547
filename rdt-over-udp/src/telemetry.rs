//! Congestion-window CSV log.
//!
//! One line per congestion-state update:
//!
//! ```text
//! timestamp_ms,window_size,slow_start_threshold
//! 1718000000123,2.000000,64
//! ```
//!
//! The log is an observability side channel; write failures are reported
//! once at `warn` and otherwise ignored.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::congestion::CongestionController;

pub struct CwndLog {
    out: Box<dyn Write + Send>,
    failed: bool,
}

impl CwndLog {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            failed: false,
        }
    }

    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }

    /// Append the controller's current window and threshold.
    pub fn record(&mut self, cc: &CongestionController) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        self.write_line(now_ms, cc.window_size(), cc.ssthresh());
    }

    fn write_line(&mut self, timestamp_ms: u128, window_size: f64, ssthresh: u32) {
        if self.failed {
            return;
        }
        if let Err(e) = writeln!(self.out, "{timestamp_ms},{window_size:.6},{ssthresh}") {
            log::warn!("[telemetry] cwnd log disabled: {e}");
            self.failed = true;
        }
    }

    pub fn flush(&mut self) {
        if !self.failed {
            let _ = self.out.flush();
        }
    }
}

impl Drop for CwndLog {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for CwndLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CwndLog").field("failed", &self.failed).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::LossSignal;
    use std::sync::{Arc, Mutex};

    /// `Write` sink that can be inspected after the log takes ownership.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn records_window_and_threshold() {
        let sink = Shared::default();
        let mut log = CwndLog::new(sink.clone());
        let mut cc = CongestionController::new(64);
        cc.on_ack();
        log.record(&cc);
        cc.on_loss(LossSignal::Timeout);
        log.record(&cc);

        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split(',').collect()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0][0].parse::<u128>().unwrap() > 0);
        assert_eq!(&lines[0][1..], &["2.000000", "64"]);
        assert_eq!(&lines[1][1..], &["1.000000", "2"]);
    }

    #[test]
    fn write_failure_disables_log() {
        let mut log = CwndLog::new(Broken);
        let cc = CongestionController::new(64);
        log.record(&cc);
        assert!(log.failed);
        log.record(&cc);
    }
}
