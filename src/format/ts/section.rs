//! PSI/SI section writer.
//!
//! Wraps a table payload into a CRC-protected section and chunks it into
//! 188-byte transport packets on the table's PID, maintaining the PID's
//! continuity counter. Also provides the length-patching scopes used by the
//! table builders for the nested descriptor-loop length fields.

use bytes::{BufMut, BytesMut};
use crc::{Crc, CRC_32_MPEG_2};

use crate::error::{MuxError, Result};

use super::types::{SECTION_LENGTH, TID_SDT, TS_PACKET_SIZE};

/// CRC-32/MPEG-2 protecting every emitted section (ISO 13818-1 annex A:
/// polynomial 0x04C11DB7, initial 0xFFFFFFFF, no reflection, no xor-out).
const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Per-table packetisation state: the PID the table travels on and its
/// 4-bit continuity counter.
#[derive(Debug, Clone)]
pub struct SectionContext {
    /// PID the table's packets are emitted on
    pub pid: u16,
    /// 4-bit continuity counter for that PID
    pub cc: u8,
}

impl SectionContext {
    /// Creates a context for `pid`. The counter starts at 15 so it wraps
    /// to 0 on the first emitted packet.
    pub fn new(pid: u16) -> Self {
        Self { pid, cc: 15 }
    }

    /// Appends the CRC to a fully built section and chunks it into
    /// transport packets.
    ///
    /// The caller's `section` must leave the trailing 4 CRC bytes
    /// unwritten; the checksum covers everything before them.
    pub fn write_section(&mut self, section: &mut BytesMut) -> BytesMut {
        let sum = CRC_MPEG.checksum(section);
        section.put_u32(sum);
        self.packetize(section)
    }

    /// Serialises the standard long-section header around `payload`,
    /// appends the CRC and chunks into transport packets.
    ///
    /// The reserved_future_use prefix is 0xF000 for the SDT, 0xB000 for
    /// every other table.
    pub fn write_section1(
        &mut self,
        table_id: u8,
        table_id_ext: u16,
        version: u8,
        sec_num: u8,
        last_sec_num: u8,
        payload: &[u8],
    ) -> Result<BytesMut> {
        let flags: u16 = if table_id == TID_SDT { 0xF000 } else { 0xB000 };

        let tot_len = 3 + 5 + payload.len() + 4;
        if tot_len > SECTION_LENGTH {
            return Err(MuxError::InvalidData(format!(
                "section too large: {} > {}",
                tot_len, SECTION_LENGTH
            )));
        }

        let mut section = BytesMut::with_capacity(tot_len);
        section.put_u8(table_id);
        // 5 byte header + 4 byte CRC follow the length field
        section.put_u16(flags | (payload.len() as u16 + 5 + 4));
        section.put_u16(table_id_ext);
        section.put_u8(0xC1 | (version << 1)); // current_next_indicator = 1
        section.put_u8(sec_num);
        section.put_u8(last_sec_num);
        section.put_slice(payload);

        Ok(self.write_section(&mut section))
    }

    /// Chunks a complete section into 188-byte packets.
    ///
    /// The first packet carries payload_unit_start and a zero pointer
    /// field; the last one is padded with 0xFF.
    fn packetize(&mut self, section: &[u8]) -> BytesMut {
        let mut out = BytesMut::with_capacity(section.len() / 184 * TS_PACKET_SIZE + TS_PACKET_SIZE);
        let mut remaining = section;
        let mut first = true;

        while !remaining.is_empty() {
            self.cc = (self.cc + 1) & 0x0F;

            let mut b = (self.pid >> 8) as u8;
            if first {
                b |= 0x40;
            }
            let start = out.len();
            out.put_u8(0x47);
            out.put_u8(b);
            out.put_u8(self.pid as u8);
            out.put_u8(0x10 | self.cc);
            if first {
                out.put_u8(0); // pointer field
            }

            let space = TS_PACKET_SIZE - (out.len() - start);
            let len = space.min(remaining.len());
            out.put_slice(&remaining[..len]);
            remaining = &remaining[len..];

            let left = TS_PACKET_SIZE - (out.len() - start);
            out.put_bytes(0xFF, left);

            first = false;
        }

        out
    }
}

/// Two-byte length field patched after its contents are written.
///
/// `prefix` supplies the four high bits (0xF000 for descriptor loops,
/// running_status/free_CA combinations for SDT and EIT).
pub struct Len16Scope {
    at: usize,
    prefix: u16,
}

impl Len16Scope {
    /// Reserves the length slot at the current cursor.
    pub fn open(buf: &mut BytesMut, prefix: u16) -> Self {
        let at = buf.len();
        buf.put_u16(0);
        Self { at, prefix }
    }

    /// Patches the slot with the number of bytes written since `open`.
    pub fn close(self, buf: &mut BytesMut) {
        self.close_extra(buf, 0);
    }

    /// Patches the slot, adding `extra` bytes the caller will append later
    /// (the TOT length covers its yet-unwritten CRC).
    pub fn close_extra(self, buf: &mut BytesMut, extra: u16) {
        let len = (buf.len() - self.at - 2) as u16 + extra;
        let val = self.prefix | len;
        buf[self.at] = (val >> 8) as u8;
        buf[self.at + 1] = val as u8;
    }
}

/// Descriptor scope: writes the tag, reserves the one-byte length and
/// patches it on close.
pub struct DescScope {
    at: usize,
}

impl DescScope {
    /// Writes `tag` and reserves the length slot.
    pub fn open(buf: &mut BytesMut, tag: u8) -> Self {
        buf.put_u8(tag);
        let at = buf.len();
        buf.put_u8(0);
        Self { at }
    }

    /// Patches the length with the bytes written since `open`.
    pub fn close(self, buf: &mut BytesMut) {
        buf[self.at] = (buf.len() - self.at - 1) as u8;
    }
}

/// Bare one-byte length slot (event-name and text lengths inside the
/// short-event descriptor).
pub struct Len8Scope {
    at: usize,
}

impl Len8Scope {
    /// Reserves the length slot at the current cursor.
    pub fn open(buf: &mut BytesMut) -> Self {
        let at = buf.len();
        buf.put_u8(0);
        Self { at }
    }

    /// Patches the length with the bytes written since `open`.
    pub fn close(self, buf: &mut BytesMut) {
        buf[self.at] = (buf.len() - self.at - 1) as u8;
    }
}

/// Writes a length-prefixed string, the DVB text encoding used by the
/// service and network name fields.
pub fn put_str8(buf: &mut BytesMut, s: &str) {
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_packet_section() {
        let mut ctx = SectionContext::new(0x0000);
        let payload = [0x00, 0x01, 0xE1, 0x00];
        let out = ctx.write_section1(0x00, 1, 0, 0, 0, &payload).unwrap();

        assert_eq!(out.len(), TS_PACKET_SIZE);
        assert_eq!(out[0], 0x47);
        assert_eq!(out[1], 0x40); // payload_unit_start, PID 0
        assert_eq!(out[2], 0x00);
        assert_eq!(out[3], 0x10); // payload only, cc wrapped to 0
        assert_eq!(out[4], 0x00); // pointer field
        assert_eq!(out[5], 0x00); // table id
        // section_length = payload + 9
        assert_eq!(out[6], 0xB0);
        assert_eq!(out[7], payload.len() as u8 + 9);
        // trailing CRC over table id .. payload
        let crc_at = 5 + 3 + 5 + payload.len();
        let expected = CRC_MPEG.checksum(&out[5..crc_at]);
        let got = u32::from_be_bytes([out[crc_at], out[crc_at + 1], out[crc_at + 2], out[crc_at + 3]]);
        assert_eq!(got, expected);
        // 0xFF padding to the end
        assert!(out[crc_at + 4..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn sdt_reserved_prefix() {
        let mut ctx = SectionContext::new(0x0011);
        let out = ctx.write_section1(TID_SDT, 1, 0, 0, 0, &[0, 1, 0xFF]).unwrap();
        assert_eq!(out[6] & 0xF0, 0xF0);
    }

    #[test]
    fn multi_packet_section_continuity() {
        let mut ctx = SectionContext::new(0x1000);
        let payload = vec![0xAB; 400];
        let out = ctx.write_section1(0x02, 1, 0, 0, 0, &payload).unwrap();

        assert_eq!(out.len() % TS_PACKET_SIZE, 0);
        assert_eq!(out.len() / TS_PACKET_SIZE, 3);
        // first packet has PUSI, the rest do not
        assert_eq!(out[1] & 0x40, 0x40);
        assert_eq!(out[TS_PACKET_SIZE + 1] & 0x40, 0x00);
        // continuity counters advance mod 16
        for (i, pkt) in out.chunks(TS_PACKET_SIZE).enumerate() {
            assert_eq!(pkt[3] & 0x0F, (i as u8) & 0x0F);
        }
    }

    #[test]
    fn oversized_section_rejected() {
        let mut ctx = SectionContext::new(0x1000);
        let payload = vec![0u8; SECTION_LENGTH];
        assert!(ctx.write_section1(0x02, 1, 0, 0, 0, &payload).is_err());
    }

    #[test]
    fn crc_parameters_match_mpeg2() {
        // the PSI CRC must not reflect or xor; spot-check a known vector
        assert_eq!(CRC_MPEG.checksum(&[0x01, 0x01]), 0xD66FB816);
    }

    #[test]
    fn length_scopes_patch_back() {
        let mut buf = BytesMut::new();
        let outer = Len16Scope::open(&mut buf, 0xF000);
        let desc = DescScope::open(&mut buf, 0x48);
        buf.put_slice(&[1, 2, 3]);
        desc.close(&mut buf);
        outer.close(&mut buf);

        // outer length covers tag + len + 3 content bytes
        assert_eq!(&buf[..], &[0xF0, 0x05, 0x48, 0x03, 1, 2, 3]);
    }

    #[test]
    fn len8_scope() {
        let mut buf = BytesMut::new();
        let len = Len8Scope::open(&mut buf);
        buf.put_slice(b"abc");
        len.close(&mut buf);
        assert_eq!(&buf[..], &[3, b'a', b'b', b'c']);
    }
}
