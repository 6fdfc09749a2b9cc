//! Cycle counters and periodic throughput reports

use std::fmt;
use std::time::{Duration, Instant};

/// Counters for the current report window
#[derive(Debug, Clone)]
pub struct CycleStats {
    window_start: Instant,
    inputs: u64,
    outputs: u64,
    degraded: u64,
    anomalies: u64,
    read_timeouts: u64,
    write_timeouts: u64,
    disconnects: u64,
}

impl CycleStats {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            inputs: 0,
            outputs: 0,
            degraded: 0,
            anomalies: 0,
            read_timeouts: 0,
            write_timeouts: 0,
            disconnects: 0,
        }
    }

    /// A valid input frame was published
    pub fn record_input(&mut self) {
        self.inputs += 1;
    }

    /// An output frame was written
    pub fn record_output(&mut self) {
        self.outputs += 1;
    }

    /// An input frame failed validation
    pub fn record_degraded(&mut self) {
        self.degraded += 1;
    }

    pub fn record_anomalies(&mut self, count: usize) {
        self.anomalies += count as u64;
    }

    pub fn record_read_timeout(&mut self) {
        self.read_timeouts += 1;
    }

    pub fn record_write_timeout(&mut self) {
        self.write_timeouts += 1;
    }

    pub fn record_disconnect(&mut self) {
        self.disconnects += 1;
    }

    /// Whether `interval` has passed since the window opened
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= interval
    }

    /// Close the window and start a new one at `now`
    pub fn take_report(&mut self, now: Instant) -> Report {
        let report = Report {
            elapsed: now.saturating_duration_since(self.window_start),
            inputs: self.inputs,
            outputs: self.outputs,
            degraded: self.degraded,
            anomalies: self.anomalies,
            read_timeouts: self.read_timeouts,
            write_timeouts: self.write_timeouts,
            disconnects: self.disconnects,
        };
        *self = Self::new(now);
        report
    }
}

/// Totals for one report window
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub elapsed: Duration,
    pub inputs: u64,
    pub outputs: u64,
    pub degraded: u64,
    pub anomalies: u64,
    pub read_timeouts: u64,
    pub write_timeouts: u64,
    pub disconnects: u64,
}

impl Report {
    /// Valid input frames per second over the window
    pub fn messages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.inputs as f64 / secs
        } else {
            0.0
        }
    }

    /// Anything went wrong during the window
    pub fn has_faults(&self) -> bool {
        self.degraded + self.read_timeouts + self.write_timeouts + self.disconnects > 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} msgs/sec over {:.1}s (in {}, out {}, degraded {}, anomalies {}, read timeouts {}, write timeouts {}, disconnects {})",
            self.messages_per_second(),
            self.elapsed.as_secs_f64(),
            self.inputs,
            self.outputs,
            self.degraded,
            self.anomalies,
            self.read_timeouts,
            self.write_timeouts,
            self.disconnects,
        )
    }
}

/// Render pin states as a string of `0`/`1`, first pin leftmost
pub fn format_bits(states: &[bool]) -> String {
    states.iter().map(|&on| if on { '1' } else { '0' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_resets_window() {
        let start = Instant::now();
        let mut stats = CycleStats::new(start);
        for _ in 0..50 {
            stats.record_input();
            stats.record_output();
        }
        stats.record_degraded();

        let report = stats.take_report(start + Duration::from_secs(10));
        assert_eq!(report.inputs, 50);
        assert_eq!(report.degraded, 1);
        assert!(report.has_faults());
        assert!((report.messages_per_second() - 5.0).abs() < f64::EPSILON);

        let next = stats.take_report(start + Duration::from_secs(20));
        assert_eq!(next.inputs, 0);
        assert!(!next.has_faults());
    }

    #[test]
    fn test_rate_uses_elapsed_time() {
        let start = Instant::now();
        let mut stats = CycleStats::new(start);
        for _ in 0..30 {
            stats.record_input();
        }
        // Late report: 30 frames over 15s, not the nominal 10s
        let report = stats.take_report(start + Duration::from_secs(15));
        assert!((report.messages_per_second() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_elapsed_rate() {
        let start = Instant::now();
        let mut stats = CycleStats::new(start);
        stats.record_input();
        assert_eq!(stats.take_report(start).messages_per_second(), 0.0);
    }

    #[test]
    fn test_is_due() {
        let start = Instant::now();
        let stats = CycleStats::new(start);
        let interval = Duration::from_secs(10);
        assert!(!stats.is_due(start + Duration::from_secs(9), interval));
        assert!(stats.is_due(start + Duration::from_secs(10), interval));
    }

    #[test]
    fn test_format_bits() {
        assert_eq!(format_bits(&[true, false, false, true]), "1001");
        assert_eq!(format_bits(&[]), "");
    }

    #[test]
    fn test_report_display() {
        let report = Report {
            elapsed: Duration::from_secs(10),
            inputs: 95,
            outputs: 95,
            degraded: 0,
            anomalies: 0,
            read_timeouts: 0,
            write_timeouts: 0,
            disconnects: 0,
        };
        assert!(report.to_string().starts_with("9.5 msgs/sec over 10.0s"));
    }
}
