//! PES header serialisation.
//!
//! The packetiser builds one header per PES packet and copies it into the
//! first transport packet. Timestamps use the classic '0010'/'0011'
//! marker-bit encoding; Dirac video and Blu-ray AC-3 carry a 3-byte PES
//! extension; DVB teletext headers are padded to a fixed 0x24 bytes.

use bytes::{BufMut, BytesMut};

use crate::av::{CodecId, MediaKind};

/// Fixed part of a PES header preceding the optional fields.
const PES_FIXED_HEADER: usize = 9;

/// PES extension carried after the timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PesExtension {
    /// No extension bytes
    None,
    /// Extended stream id 0x60 for Dirac video
    DiracStreamId,
    /// Extended stream id 0x71 required by Blu-ray AC-3 players
    BlurayAc3,
}

/// One PES packet header, fully determined before serialisation.
#[derive(Debug, Clone)]
pub struct PesHeader {
    /// PES stream id byte
    pub stream_id: u8,
    /// PES_packet_length; zero for video or oversized payloads
    pub packet_length: u16,
    /// Data alignment indicator (subtitle and data streams)
    pub data_alignment: bool,
    /// Presentation timestamp, 90 kHz
    pub pts: Option<i64>,
    /// Emitted only when it differs from the PTS; the caller enforces that
    pub dts: Option<i64>,
    /// Optional 3-byte PES extension
    pub extension: PesExtension,
    /// Pad the optional header to 0x24 bytes (DVB teletext)
    pub teletext: bool,
}

impl PesHeader {
    /// Length of the optional header data following the
    /// PES_header_data_length byte.
    pub fn header_data_length(&self) -> usize {
        let mut len = 0;
        if self.pts.is_some() {
            len += 5;
        }
        if self.dts.is_some() {
            len += 5;
        }
        if self.extension != PesExtension::None {
            len += 3;
        }
        if self.teletext {
            len = 0x24;
        }
        len
    }

    /// Total serialised size.
    pub fn wire_len(&self) -> usize {
        PES_FIXED_HEADER + self.header_data_length()
    }

    /// Serialises the header.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let header_data_length = self.header_data_length();

        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        let mut val = 0x80u8; // marker '10'
        if self.data_alignment {
            val |= 0x04;
        }
        buf.put_u8(val);

        let mut flags = 0u8;
        if self.pts.is_some() {
            flags |= 0x80;
        }
        if self.dts.is_some() {
            flags |= 0x40;
        }
        if self.extension != PesExtension::None {
            flags |= 0x01;
        }
        buf.put_u8(flags);
        buf.put_u8(header_data_length as u8);

        let before = buf.len();
        if let Some(pts) = self.pts {
            write_timestamp(buf, flags >> 6, pts);
        }
        if let Some(dts) = self.dts {
            write_timestamp(buf, 1, dts);
        }
        match self.extension {
            PesExtension::None => {}
            PesExtension::DiracStreamId => {
                buf.put_u8(0x01); // PES_extension_flag_2
                buf.put_u8(0x80 | 0x01); // marker + extension length
                buf.put_u8(0x60); // extended stream id
            }
            PesExtension::BlurayAc3 => {
                buf.put_u8(0x01);
                buf.put_u8(0x80 | 0x01);
                buf.put_u8(0x71);
            }
        }

        let written = buf.len() - before;
        buf.put_bytes(0xFF, header_data_length - written);
    }
}

/// Selects the PES stream id for a stream, honouring a caller-forced id on
/// data streams.
pub fn stream_id_for(codec: CodecId, m2ts: bool, forced: Option<u8>) -> u8 {
    match codec.kind() {
        MediaKind::Video => {
            if codec == CodecId::Dirac {
                0xFD
            } else {
                0xE0
            }
        }
        MediaKind::Audio
            if matches!(codec, CodecId::Mp2 | CodecId::Mp3 | CodecId::Aac | CodecId::AacLatm) =>
        {
            0xC0
        }
        MediaKind::Audio if codec == CodecId::Ac3 && m2ts => 0xFD,
        MediaKind::Data => forced.unwrap_or(0xFC),
        _ => 0xBD,
    }
}

/// Writes a 33-bit timestamp with the 4-bit marker prefix and the three
/// interleaved marker bits.
fn write_timestamp(buf: &mut BytesMut, fourbits: u8, ts: i64) {
    buf.put_u8(fourbits << 4 | (((ts >> 30) & 0x07) as u8) << 1 | 1);
    buf.put_u16((((ts >> 15) & 0x7FFF) as u16) << 1 | 1);
    buf.put_u16((((ts) & 0x7FFF) as u16) << 1 | 1);
}
