//! Time offset table.
//!
//! The TOT travels as a short (private) section: no table_id_extension or
//! section numbering, but still CRC-protected. The builder returns the
//! section up to (not including) the CRC; the section writer appends the
//! checksum and packetizes.

use bytes::{BufMut, BytesMut};

use crate::format::ts::config::TSConfig;
use crate::format::ts::section::{DescScope, Len16Scope};
use crate::format::ts::types::TID_TOT;

use super::{mjd_utc_bytes, table_time};

/// Builds the complete TOT section minus its trailing CRC.
pub(crate) fn build(cfg: &TSConfig) -> BytesMut {
    let mut buf = BytesMut::with_capacity(48);
    let now = table_time(cfg);

    buf.put_u8(TID_TOT);
    // section_length counts everything after itself including the CRC
    let section_len = Len16Scope::open(&mut buf, 0xB000);

    buf.put_slice(&mjd_utc_bytes(now));

    let descs = Len16Scope::open(&mut buf, 0xF000);

    // Local time offset descriptor
    let desc = DescScope::open(&mut buf, 0x58);
    buf.put_slice(cfg.country_code.as_bytes());
    // country region id 6 bits | reserved '1' | polarity 0
    buf.put_u8(0x03 << 2 | 0x2);
    buf.put_u16(0x0000); // local time offset
    buf.put_slice(&mjd_utc_bytes(now + chrono::Duration::days(365)));
    buf.put_u16(0x0100); // next time offset
    desc.close(&mut buf);

    descs.close(&mut buf);
    section_len.close_extra(&mut buf, 4);

    buf
}
