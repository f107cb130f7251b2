use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpmSettings {
    /// |field| in millitesla that counts as the magnet passing the sensor.
    pub peak_threshold: f64,
    /// Number of revolutions averaged into the reported RPM.
    pub window: usize,
    /// RPM drops to zero when no peak is seen for this long.
    pub timeout_ms: u64,
}

impl Default for RpmSettings {
    fn default() -> Self {
        Self {
            peak_threshold: 50.0,
            window: 5,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpmReading {
    pub rpm: f64,
    pub peak_rpm: f64,
}

/// Derives rotation speed from the field of a magnet on a rotating part.
///
/// Each upward crossing of the threshold is one revolution. The interval
/// between two crossings gives an instantaneous RPM; the reported RPM is the
/// mean of the last `window` of those.
#[derive(Debug, Clone)]
pub struct RpmTracker {
    settings: RpmSettings,
    above_threshold: bool,
    last_peak: Option<Timestamp>,
    /// Set by a timeout: the next peak starts a fresh measurement instead of
    /// being timed against the stale one.
    stalled: bool,
    history: Box<[f64]>,
    next_slot: usize,
    filled: usize,
    rpm: f64,
    peak_rpm: f64,
}

impl RpmTracker {
    pub fn new(settings: RpmSettings) -> Self {
        let window = settings.window.max(1);

        Self {
            settings,
            above_threshold: false,
            last_peak: None,
            stalled: false,
            history: vec![0.0; window].into_boxed_slice(),
            next_slot: 0,
            filled: 0,
            rpm: 0.0,
            peak_rpm: 0.0,
        }
    }

    pub fn settings(&self) -> &RpmSettings {
        &self.settings
    }

    pub fn reading(&self) -> RpmReading {
        RpmReading {
            rpm: self.rpm,
            peak_rpm: self.peak_rpm,
        }
    }

    /// Feed one field sample taken at `now`.
    pub fn update(&mut self, field_mt: f64, now: Timestamp) -> RpmReading {
        let magnitude = field_mt.abs();
        let threshold = self.settings.peak_threshold;

        if !self.above_threshold && magnitude > threshold {
            self.above_threshold = true;

            match self.last_peak {
                Some(last) if !self.stalled => {
                    let interval = now.duration_since(last).as_secs_f64();
                    if interval > 0.0 {
                        self.record(60.0 / interval);
                    }
                }
                _ => {}
            }

            self.stalled = false;
            self.last_peak = Some(now);
        } else if self.above_threshold && magnitude <= threshold {
            self.above_threshold = false;
        }

        self.reading()
    }

    /// Zero the RPM when the last peak is older than the timeout.
    ///
    /// Keeps returning the zeroed reading on every call until a new peak
    /// arrives, so callers can keep idle dashboards fed.
    pub fn check_timeout(&mut self, now: Timestamp) -> Option<RpmReading> {
        let last = self.last_peak?;
        let timeout = SignedDuration::from_millis(self.settings.timeout_ms as i64);

        if now.duration_since(last) <= timeout {
            return None;
        }

        self.rpm = 0.0;
        self.filled = 0;
        self.next_slot = 0;
        self.history.fill(0.0);
        self.stalled = true;

        Some(self.reading())
    }

    fn record(&mut self, instant_rpm: f64) {
        self.history[self.next_slot] = instant_rpm;
        self.next_slot = (self.next_slot + 1) % self.history.len();
        self.filled = (self.filled + 1).min(self.history.len());

        let sum: f64 = self.history[..self.filled].iter().sum();
        self.rpm = sum / self.filled as f64;

        if self.rpm > self.peak_rpm {
            self.peak_rpm = self.rpm;
        }
    }
}
