//! Strategy values plugged into `AuthenticatedSender`, one per remote
//! service, each also knowing how its batches are keyed and encoded.

pub mod alarm;
pub mod metering;
pub mod metric;

pub use alarm::AlarmBackend;
pub use metering::MeteringBackend;
pub use metric::MetricBackend;

use chrono::{DateTime, Utc};

/// `Fri Sep  4 08:59:09 2015`, the layout the metering service parses.
pub(crate) fn asctime(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a %b %e %H:%M:%S %Y").to_string()
}

/// `2015-09-04T08:59:09.991646`, ISO-8601 without offset.
pub(crate) fn iso_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_layouts() {
        let ts = Utc.with_ymd_and_hms(2015, 9, 4, 8, 59, 9).unwrap()
            + chrono::Duration::microseconds(991_646);
        assert_eq!(asctime(ts), "Fri Sep  4 08:59:09 2015");
        assert_eq!(iso_timestamp(ts), "2015-09-04T08:59:09.991646");
    }
}
