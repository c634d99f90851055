//! # Logging Utilities
//!
//! Rate limiting for log lines emitted from hot paths (the receive loop sees
//! every stray packet on the band) and a bounded hex logger for payloads.
//!
//! ## Usage
//!
//! ```rust
//! use mihome_rs::util::logging::LogThrottle;
//!
//! let mut throttle = LogThrottle::new(1000, 5); // 5 messages per second
//! if throttle.allow() {
//!     log::warn!("undecodable packet");
//! }
//! ```

use std::time::Instant;

/// Rate limiter for log messages
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Messages seen in the current window
    count: u32,
    /// Messages suppressed in the current window
    suppressed: u32,
    t0: Instant,
}

impl LogThrottle {
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// `true` if the message should be logged. Starts a new window once the
    /// current one expires, reporting how many lines it swallowed.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            if self.suppressed > 0 {
                log::debug!("{} log messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count += 1;
        if self.count <= self.cap {
            true
        } else {
            self.suppressed += 1;
            false
        }
    }

    /// Messages suppressed in the current window
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }

    /// Start a new window immediately
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
        self.suppressed = 0;
    }
}

/// Log payload bytes at debug level, truncated to keep lines short.
pub fn log_payload_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(shown);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!("{prefix}: {hex_str}{suffix}");
}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_throttle_basic() {
        let mut throttle = LogThrottle::new(1000, 3);

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());

        assert!(!throttle.allow());
        assert!(!throttle.allow());
        assert_eq!(throttle.suppressed(), 2);
    }

    #[test]
    fn test_log_throttle_reset() {
        let mut throttle = LogThrottle::new(1000, 2);

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());

        throttle.reset();
        assert_eq!(throttle.suppressed(), 0);
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
    }

    #[test]
    fn test_window_expiry() {
        let mut throttle = LogThrottle::new(10, 1);
        assert!(throttle.allow());
        assert!(!throttle.allow());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(throttle.allow());
    }
}
