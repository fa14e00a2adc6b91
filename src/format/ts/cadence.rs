//! Table emission cadence.
//!
//! Each SI table owns a `TableCadence` combining three criteria: a period
//! in transport packets, a wall-clock period in 90 kHz ticks, and an
//! external force. A table is also emitted the first time a timestamp is
//! seen so a decoder joining at stream start acquires the full SI set
//! immediately.

use super::types::TS_PACKET_SIZE;

/// Emission state for one SI table.
#[derive(Debug, Clone)]
pub struct TableCadence {
    packet_count: i64,
    packet_period: i64,
    last_ts: Option<i64>,
    /// Wall-clock period in seconds; when set by the user it is the sole
    /// periodic criterion
    period_secs: Option<f64>,
}

impl TableCadence {
    /// Creates a cadence with the given packet period. A finite user
    /// `period_secs` disables the packet criterion. The counter starts one
    /// short of the period so the first poll fires.
    pub fn new(packet_period: i64, period_secs: Option<f64>) -> Self {
        let packet_period = if period_secs.is_some() {
            i64::MAX
        } else {
            packet_period
        };
        Self {
            packet_count: packet_period - 1,
            packet_period,
            last_ts: None,
            period_secs,
        }
    }

    /// Converts a period in milliseconds to transport packets at `mux_rate`
    /// bits per second.
    pub fn period_packets(mux_rate: u32, period_ms: u32) -> i64 {
        (mux_rate as i64 * period_ms as i64) / (TS_PACKET_SIZE as i64 * 8 * 1000)
    }

    /// Arms the cadence so the next poll emits unconditionally.
    pub fn force_next(&mut self) {
        self.packet_count = self.packet_period - 1;
    }

    /// Advances the packet counter and reports whether the table is due.
    /// On emission the counter resets and `last_ts` ratchets forward.
    pub fn poll(&mut self, dts: Option<i64>, force: bool) -> bool {
        self.packet_count += 1;

        let wall_clock_due = match (dts, self.last_ts, self.period_secs) {
            (Some(_), None, _) => true,
            (Some(d), Some(l), Some(p)) => (d - l) as f64 >= p * 90_000.0,
            _ => false,
        };

        let due = self.packet_count == self.packet_period || wall_clock_due || force;
        if due {
            self.packet_count = 0;
            if let Some(d) = dts {
                self.last_ts = Some(self.last_ts.map_or(d, |l| l.max(d)));
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_poll_fires() {
        let mut c = TableCadence::new(40, None);
        assert!(c.poll(None, false));
        assert!(!c.poll(None, false));
    }

    #[test]
    fn packet_period_cycle() {
        let mut c = TableCadence::new(4, None);
        assert!(c.poll(None, false));
        assert!(!c.poll(None, false));
        assert!(!c.poll(None, false));
        assert!(!c.poll(None, false));
        assert!(c.poll(None, false));
    }

    #[test]
    fn first_timestamp_fires() {
        let mut c = TableCadence::new(1000, None);
        assert!(c.poll(None, false)); // counter start
        assert!(!c.poll(None, false));
        // first dts seen -> due regardless of counter
        assert!(c.poll(Some(90_000), false));
        assert!(!c.poll(Some(90_001), false));
    }

    #[test]
    fn wall_clock_period_governs_when_user_set() {
        let mut c = TableCadence::new(4, Some(1.0));
        assert!(c.poll(Some(0), false)); // first timestamp
        for i in 1..=10 {
            // far more than 4 packets without reaching one second
            assert!(!c.poll(Some(i * 8000), false));
        }
        assert!(c.poll(Some(90_000), false));
    }

    #[test]
    fn force_and_rearm() {
        let mut c = TableCadence::new(100, None);
        assert!(c.poll(None, false));
        assert!(c.poll(None, true));
        assert!(!c.poll(None, false));
        c.force_next();
        assert!(c.poll(None, false));
    }

    #[test]
    fn period_conversion() {
        // 3 Mbit/s, 100 ms -> 199 packets
        assert_eq!(TableCadence::period_packets(3_000_000, 100), 199);
        // 20 ms PCR at the same rate
        assert_eq!(TableCadence::period_packets(3_000_000, 20), 39);
    }
}
