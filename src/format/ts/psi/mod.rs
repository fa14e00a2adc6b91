//! Service-information table builders.
//!
//! One module per table. Builders are pure functions over the mux
//! configuration, the service arena and per-stream views; the section
//! writer wraps their output with the section header and CRC.

pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod tot;

use chrono::{DateTime, Timelike, Utc};

use crate::av::StreamConfig;

use super::config::TSConfig;

/// Per-stream view handed to the PMT builder.
pub(crate) struct EsInfo<'a> {
    pub pid: u16,
    pub stream_index: usize,
    pub config: &'a StreamConfig,
}

/// Timestamp stamped into TOT and EIT; a configured fixed time wins over
/// the wall clock.
pub(crate) fn table_time(cfg: &TSConfig) -> DateTime<Utc> {
    cfg.table_time.unwrap_or_else(Utc::now)
}

fn bcd(v: u32) -> u8 {
    ((v / 10) << 4) as u8 | (v % 10) as u8
}

/// Encodes a UTC time as the 5-byte MJD + BCD hh:mm:ss field used by
/// TOT and EIT (EN 300 468 annex C).
pub(crate) fn mjd_utc_bytes(t: DateTime<Utc>) -> [u8; 5] {
    // MJD epoch 1858-11-17 is 40587 days before the Unix epoch
    let mjd = (t.timestamp().div_euclid(86_400) + 40_587) as u16;
    [
        (mjd >> 8) as u8,
        mjd as u8,
        bcd(t.hour()),
        bcd(t.minute()),
        bcd(t.second()),
    ]
}

/// Encodes a duration in seconds as 3 BCD bytes hh:mm:ss.
pub(crate) fn bcd_duration(secs: u32) -> [u8; 3] {
    [bcd(secs / 3600), bcd(secs / 60 % 60), bcd(secs % 60)]
}
