use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window transfer rate over cumulative progress reports.
///
/// The upload loop reports the total bytes transferred so far after each
/// chunk; [`record`](Self::record) timestamps those reports and the rate
/// is the byte delta across the retained window. A report lower than the
/// previous one means a session replacement rewound the transfer, and the
/// window restarts there so stale samples do not distort the rate.
pub struct TransferRate {
    inner: Mutex<RateWindow>,
}

struct RateWindow {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    max_samples: usize,
}

impl TransferRate {
    /// Creates a rate tracker.
    ///
    /// - `window`: how far back samples count (default 5 s).
    /// - `max_samples`: retained sample cap (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(RateWindow {
                samples: VecDeque::new(),
                window: window.unwrap_or(Duration::from_secs(5)),
                max_samples: max_samples.unwrap_or(100),
            }),
        }
    }

    /// Records the cumulative byte count reported by the transfer loop.
    pub fn record(&self, transferred: u64) {
        let mut w = self.inner.lock().unwrap();
        let now = Instant::now();

        // A cursor rewind invalidates everything measured so far.
        if w.samples.back().is_some_and(|&(_, bytes)| transferred < bytes) {
            w.samples.clear();
        }
        w.samples.push_back((now, transferred));

        if let Some(cutoff) = now.checked_sub(w.window) {
            while w.samples.front().is_some_and(|&(at, _)| at < cutoff) {
                w.samples.pop_front();
            }
        }
        while w.samples.len() > w.max_samples {
            w.samples.pop_front();
        }
    }

    /// Average rate in bytes/second across the window.
    ///
    /// Returns 0.0 until two samples span a measurable interval.
    pub fn bytes_per_second(&self) -> f64 {
        let w = self.inner.lock().unwrap();
        let (Some(&(first_at, first_bytes)), Some(&(last_at, last_bytes))) =
            (w.samples.front(), w.samples.back())
        else {
            return 0.0;
        };

        let elapsed = last_at.duration_since(first_at);
        if elapsed.is_zero() {
            return 0.0;
        }
        (last_bytes - first_bytes) as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining` more bytes at the current rate.
    ///
    /// `None` while the rate is unknown or zero.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}
