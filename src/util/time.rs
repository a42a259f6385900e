//! Stage timing

use std::time::{Duration, Instant};

/// Lap timer: each `lap()` returns the time since the previous lap
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    last: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self { last: Instant::now() }
    }

    /// Time since start or the previous lap, then restart
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        elapsed
    }
}

/// Render a duration with a unit suited to its magnitude
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    match duration.as_nanos() {
        0..=999 => format!("{}ns", duration.as_nanos()),
        1_000..=999_999 => format!("{:.2}us", secs * 1e6),
        1_000_000..=999_999_999 => format!("{:.2}ms", secs * 1e3),
        _ => format!("{:.2}s", secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laps_restart() {
        let mut watch = Stopwatch::start();
        std::thread::sleep(Duration::from_millis(20));
        let first = watch.lap();
        let second = watch.lap();

        assert!(first >= Duration::from_millis(20));
        assert!(second < first);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(999)), "999ns");
        assert_eq!(format_duration(Duration::from_micros(10)), "10.00us");
        assert_eq!(format_duration(Duration::from_millis(250)), "250.00ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
