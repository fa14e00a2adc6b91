//! H.264 Annex-B handling.
//!
//! Transport streams carry H.264 as Annex-B byte streams. Incoming packets
//! are validated for a start code, and key frames get an access unit
//! delimiter (and the SPS/PPS extradata when the access unit carries none)
//! prepended so receivers can tune in mid-stream.

use bytes::{BufMut, Bytes, BytesMut};
use log::{error, warn};

use crate::error::{MuxError, Result};

const NAL_SLICE: u8 = 1;
const NAL_IDR_SLICE: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_AUD: u8 = 9;

fn has_annexb_startcode(data: &[u8]) -> bool {
    data.len() >= 5
        && (u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == 0x0000_0001
            || (data[0] == 0 && data[1] == 0 && data[2] == 1))
}

/// Validates the Annex-B start code. Missing start codes are fatal on the
/// first frame and a warning afterwards, matching decoder tolerance.
pub fn check_startcode(data: &[u8], nb_frames: u64) -> Result<()> {
    if !has_annexb_startcode(data) {
        if nb_frames == 0 {
            error!(
                "H.264 bitstream malformed, no startcode found; convert the \
                 stream to Annex-B before muxing"
            );
            return Err(MuxError::InvalidData(
                "H.264 bitstream is not in Annex-B format".into(),
            ));
        }
        warn!("H.264 bitstream error, startcode missing, size {}", data.len());
    }
    Ok(())
}

/// Finds the next NAL unit at or after `from`, returning the index of its
/// header byte.
fn next_nal(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            return Some(i + 3);
        }
        i += 1;
    }
    None
}

/// Prepares an H.264 access unit for PES carriage.
///
/// Returns a replacement buffer when an access unit delimiter had to be
/// prepended; `None` means the packet is already well-formed. On key
/// frames without an in-band SPS the extradata is injected after the AUD.
pub fn prepare_payload(
    data: &[u8],
    key: bool,
    extradata: Option<&[u8]>,
    nb_frames: u64,
) -> Result<Option<Bytes>> {
    check_startcode(data, nb_frames)?;

    let extradata = extradata.unwrap_or(&[]);
    let mut extradd = if key { extradata.len() } else { 0 };
    // extradata must itself be Annex-B to be injectable
    if extradd > 0
        && extradata.len() >= 3
        && u32::from(extradata[0]) << 16 | u32::from(extradata[1]) << 8 | u32::from(extradata[2])
            > 1
    {
        extradd = 0;
    }

    let mut at = 0;
    let mut nal_type = 0xFF;
    while let Some(hdr) = next_nal(data, at) {
        nal_type = data[hdr] & 0x1F;
        if nal_type == NAL_SPS {
            extradd = 0;
        }
        if nal_type == NAL_AUD || nal_type == NAL_IDR_SLICE || nal_type == NAL_SLICE {
            break;
        }
        at = hdr;
    }

    if nal_type != NAL_IDR_SLICE {
        extradd = 0;
    }
    if nal_type == NAL_AUD {
        return Ok(None);
    }

    let mut out = BytesMut::with_capacity(6 + extradd + data.len());
    // AUD: any slice type, plus the rbsp stop bit
    out.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0]);
    out.put_slice(&extradata[..extradd]);
    out.put_slice(data);
    Ok(Some(out.freeze()))
}
