use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Offset in seconds between the unix epoch and the NTP epoch.
const NTP_EPOCH_OFFSET: u64 = 0x83AA_7E80;

/// Anchors a monotonic [`Instant`] to wall-clock time so NTP timestamps can
/// be produced for any later instant without consulting the system clock
/// again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NtpAnchor {
    instant: Instant,
    since_unix_epoch: Duration,
}

impl NtpAnchor {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            since_unix_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_secs(0)),
        }
    }

    /// Unix time corresponding to the given instant.
    pub fn unix(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.instant) + self.since_unix_epoch
    }

    /// 64-bit NTP timestamp corresponding to the given instant.
    pub fn ntp(&self, now: Instant) -> u64 {
        unix_to_ntp(self.unix(now))
    }

    /// Middle 32 bits of the NTP timestamp for the given instant, the form
    /// RTCP uses in LSR/DLSR fields.
    pub fn compact_ntp(&self, now: Instant) -> u32 {
        compact_ntp(self.ntp(now))
    }
}

pub fn unix_to_ntp(since_unix_epoch: Duration) -> u64 {
    let u = since_unix_epoch.as_nanos() as u64;

    let mut s = u / 1_000_000_000;
    s += NTP_EPOCH_OFFSET;
    let mut f = u % 1_000_000_000;
    f <<= 32;
    f /= 1_000_000_000;
    s <<= 32;

    s | f
}

pub fn ntp_to_unix(ntp: u64) -> Duration {
    let mut s = ntp >> 32;
    let mut f = ntp & 0xFFFF_FFFF;
    f *= 1_000_000_000;
    f >>= 32;
    s -= NTP_EPOCH_OFFSET;
    let u = s * 1_000_000_000 + f;

    Duration::new(u / 1_000_000_000, (u % 1_000_000_000) as u32)
}

/// Middle 32 bits of a 64-bit NTP timestamp.
pub fn compact_ntp(ntp: u64) -> u32 {
    (ntp >> 16) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntp_round_trip() {
        let unix = Duration::new(1_700_000_000, 123_456_789);
        let ntp = unix_to_ntp(unix);
        let back = ntp_to_unix(ntp);

        // Fractional part loses precision below ~0.23 ns
        let diff = if back > unix { back - unix } else { unix - back };
        assert!(diff < Duration::from_nanos(2), "diff {diff:?}");
    }

    #[test]
    fn test_compact_ntp_is_middle_bits() {
        let ntp = 0x1234_5678_9ABC_DEF0u64;
        assert_eq!(compact_ntp(ntp), 0x5678_9ABC);
    }

    #[test]
    fn test_anchor_monotonic() {
        let anchor = NtpAnchor::now();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(2);
        let delta = anchor.unix(t1) - anchor.unix(t0);
        assert_eq!(delta, Duration::from_secs(2));
    }
}
