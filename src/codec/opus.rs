//! Opus TS carriage.
//!
//! Opus packets gain a control header (ETSI TS 101 154 annex G) in front
//! of each elementary-stream frame, and the PMT advertises the channel
//! mapping extracted from the OpusHead extradata (RFC 7845).

use bytes::{BufMut, Bytes, BytesMut};
use log::{error, warn};

/// Frame durations in 48 kHz samples, indexed by the TOC configuration
/// number (`toc >> 3`).
const DURATIONS: [u16; 32] = [
    480, 960, 1920, 2880, // Silk NB
    480, 960, 1920, 2880, // Silk MB
    480, 960, 1920, 2880, // Silk WB
    480, 960, // Hybrid SWB
    480, 960, // Hybrid FB
    120, 240, 480, 960, // CELT NB
    120, 240, 480, 960, // CELT WB
    120, 240, 480, 960, // CELT SWB
    120, 240, 480, 960, // CELT FB
];

/// Streams per coupled-channel layout, indexed by channel count.
const COUPLED_STREAM_COUNTS: [u8; 9] = [1, 0, 1, 1, 2, 2, 2, 3, 3];

const CHANNEL_MAP_A: [[u8; 8]; 8] = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 2, 1, 0, 0, 0, 0, 0],
    [0, 1, 2, 3, 0, 0, 0, 0],
    [0, 4, 1, 2, 3, 0, 0, 0],
    [0, 4, 1, 2, 3, 5, 0, 0],
    [0, 4, 1, 2, 3, 5, 6, 0],
    [0, 6, 1, 2, 3, 4, 5, 7],
];

const CHANNEL_MAP_B: [[u8; 8]; 8] = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 2, 0, 0, 0, 0, 0],
    [0, 1, 2, 3, 0, 0, 0, 0],
    [0, 1, 2, 3, 4, 0, 0, 0],
    [0, 1, 2, 3, 4, 5, 0, 0],
    [0, 1, 2, 3, 4, 5, 6, 0],
    [0, 1, 2, 3, 4, 5, 6, 7],
];

/// True when the packet already carries a TS control header.
pub fn is_ts_framed(data: &[u8]) -> bool {
    data.len() >= 2 && (u16::from_be_bytes([data[0], data[1]]) >> 5) == 0x3FF
}

/// Counts the samples (at 48 kHz) in one Opus packet from its TOC byte.
/// Returns 0 for packets too short or longer than the 120 ms limit.
pub fn packet_samples(data: &[u8]) -> u32 {
    if data.is_empty() {
        return 0;
    }

    let toc = data[0];
    let frame_duration = u32::from(DURATIONS[usize::from(toc >> 3)]);
    let nframes = match toc & 3 {
        0 => 1,
        1 | 2 => 2,
        _ => {
            if data.len() < 2 {
                return 0;
            }
            u32::from(data[1] & 63)
        }
    };

    let duration = nframes * frame_duration;
    if duration > 5760 {
        warn!("Opus packet duration > 120 ms, invalid");
        return 0;
    }
    duration
}

/// Builds the TS control header plus payload for one Opus packet.
///
/// `trim_start`/`trim_end` are in 48 kHz samples and emitted only when
/// present.
pub fn control_frame(data: &[u8], trim_start: Option<u16>, trim_end: Option<u16>) -> Bytes {
    let size_bytes = data.len() / 255 + 1;
    let mut out = BytesMut::with_capacity(2 + size_bytes + 4 + data.len());

    out.put_u8(0x7F);
    let mut flags = 0xE0u8;
    if trim_start.is_some() {
        flags |= 0x10;
    }
    if trim_end.is_some() {
        flags |= 0x08;
    }
    out.put_u8(flags);

    let mut n = data.len() as isize;
    loop {
        out.put_u8(n.min(255) as u8);
        n -= 255;
        if n < 0 {
            break;
        }
    }

    if let Some(trim) = trim_start {
        out.put_u16(trim);
    }
    if let Some(trim) = trim_end {
        out.put_u16(trim);
    }

    out.put_slice(data);
    out.freeze()
}

/// Channel-mapping byte for the DVB Opus audio descriptor.
///
/// Families 0 (RTP, mono/stereo) and 1 (Vorbis order) are expressible;
/// anything else logs an error and yields 0xFF.
pub fn channel_mapping_byte(extradata: Option<&[u8]>, channels: u8) -> u8 {
    let channels_idx = usize::from(channels);

    if let Some(head) = extradata.filter(|e| e.len() >= 19) {
        if head[18] == 0 && channels <= 2 {
            // RTP mapping family
            return channels;
        }
        if head[18] == 1 && (1..=8).contains(&channels) && head.len() >= 21 + channels_idx {
            // Vorbis mapping family
            let coupled = COUPLED_STREAM_COUNTS[channels_idx];
            let map = &head[21..21 + channels_idx];
            if head[19] == channels - coupled
                && head[20] == coupled
                && map == &CHANNEL_MAP_A[channels_idx - 1][..channels_idx]
            {
                return channels;
            }
            if channels >= 2
                && head[19] == channels
                && head[20] == 0
                && map == &CHANNEL_MAP_B[channels_idx - 1][..channels_idx]
            {
                return channels | 0x80;
            }
            error!("Unsupported Opus Vorbis-style channel mapping");
            return 0xFF;
        }
        error!("Unsupported Opus channel mapping for family {}", head[18]);
        return 0xFF;
    }

    if channels <= 2 {
        // assume RTP mapping family
        return channels;
    }
    error!("Unsupported Opus channel mapping");
    0xFF
}
