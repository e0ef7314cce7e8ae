//! Structured per-request log line.

use std::time::Duration;

use http::{Method, StatusCode};

use crate::pool::PoolId;

/// One completed outbound request.
pub(crate) struct RequestLog<'a> {
    pub method: &'a Method,
    pub target: &'a str,
    pub status: StatusCode,
    pub duration: Duration,
    pub body_size: usize,
    pub pool: Option<&'a PoolId>,
}

impl RequestLog<'_> {
    pub(crate) fn emit(&self) {
        let pool = self.pool.map(PoolId::as_str).unwrap_or("-");
        log::info!(
            target: "gannet::client",
            "request.out {} {} {} {} {} pool={}",
            self.method,
            self.target,
            self.status.as_u16(),
            format_duration(self.duration),
            format_size(self.body_size),
            pool,
        );
    }
}

/// `Nµs` below a millisecond, `N.Nms` below a second, `N.Ns` above.
pub(crate) fn format_duration(duration: Duration) -> String {
    let us = duration.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if us < 1_000_000 {
        format!("{:.1}ms", us as f64 / 1_000.0)
    } else {
        format!("{:.1}s", us as f64 / 1_000_000.0)
    }
}

/// Decimal units: `B`, `kB`, `MB`, `GB`.
pub(crate) fn format_size(size: usize) -> String {
    let size = size as f64;
    if size < 1_000.0 {
        format!("{size}B")
    } else if size < 1_000_000.0 {
        format!("{:.1}kB", size / 1_000.0)
    } else if size < 1_000_000_000.0 {
        format!("{:.1}MB", size / 1_000_000.0)
    } else {
        format!("{:.1}GB", size / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_scale_by_magnitude() {
        assert_eq!(format_duration(Duration::from_micros(0)), "0µs");
        assert_eq!(format_duration(Duration::from_micros(999)), "999µs");
        assert_eq!(format_duration(Duration::from_micros(1_000)), "1.0ms");
        assert_eq!(format_duration(Duration::from_micros(12_345)), "12.3ms");
        assert_eq!(format_duration(Duration::from_micros(999_949)), "999.9ms");
        assert_eq!(format_duration(Duration::from_micros(1_500_000)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90.0s");
    }

    #[test]
    fn sizes_use_decimal_units() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(999), "999B");
        assert_eq!(format_size(1_000), "1.0kB");
        assert_eq!(format_size(5_200), "5.2kB");
        assert_eq!(format_size(1_000_000), "1.0MB");
        assert_eq!(format_size(2_500_000_000), "2.5GB");
    }
}
