use crate::av::CodecId;

use super::config::{FLAG_AAC_LATM, FLAG_SYSTEM_B};

// Constants
/// Size of a Transport Stream packet in bytes
pub const TS_PACKET_SIZE: usize = 188;
/// Clock frequency for PTS/DTS in Hz
pub const PTS_HZ: i64 = 90_000;
/// Clock frequency for the Program Clock Reference in Hz
pub const PCR_HZ: i64 = 27_000_000;

// PIDs fixed by ISO 13818-1 / EN 300 468
/// PID for the Program Association Table
pub const PID_PAT: u16 = 0x0000;
/// PID for the Network Information Table
pub const PID_NIT: u16 = 0x0010;
/// PID for the Service Description Table
pub const PID_SDT: u16 = 0x0011;
/// PID for the Event Information Table
pub const PID_EIT: u16 = 0x0012;
/// PID for the Time Offset Table
pub const PID_TOT: u16 = 0x0014;
/// PID for null (stuffing) packets
pub const PID_NULL: u16 = 0x1FFF;

// Table IDs
/// Table id of the PAT
pub const TID_PAT: u8 = 0x00;
/// Table id of the PMT
pub const TID_PMT: u8 = 0x02;
/// Table id of the NIT (actual network)
pub const TID_NIT: u8 = 0x40;
/// Table id of the SDT (actual TS)
pub const TID_SDT: u8 = 0x42;
/// Table id of the TOT
pub const TID_TOT: u8 = 0x73;
/// Table id of the EIT, present/following, actual TS
pub const TID_EIT: u8 = 0x4E;

/// Largest section the writer accepts. The 12-bit section_length keeps its
/// two top bits zero, so the payload may not push the total past 1021+3.
pub const SECTION_LENGTH: usize = 1020;

// Elementary stream types (ISO 13818-1 table 2-29 plus registrations)
/// Stream type for MPEG-1/2 video
pub const STREAM_TYPE_VIDEO_MPEG2: u8 = 0x02;
/// Stream type for MPEG-1 layer 1/2/3 audio
pub const STREAM_TYPE_AUDIO_MPEG1: u8 = 0x03;
/// Stream type for private data (AC-3 under System B, Opus, KLV, ...)
pub const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;
/// Stream type for AAC in ADTS
pub const STREAM_TYPE_AUDIO_AAC: u8 = 0x0F;
/// Stream type for MPEG-4 part 2 video
pub const STREAM_TYPE_VIDEO_MPEG4: u8 = 0x10;
/// Stream type for AAC in LATM
pub const STREAM_TYPE_AUDIO_AAC_LATM: u8 = 0x11;
/// Stream type for H.264 video
pub const STREAM_TYPE_VIDEO_H264: u8 = 0x1B;
/// Stream type for HEVC video
pub const STREAM_TYPE_VIDEO_HEVC: u8 = 0x24;
/// Stream type for AVS video
pub const STREAM_TYPE_VIDEO_CAVS: u8 = 0x42;
/// Stream type for AC-3 audio (System A)
pub const STREAM_TYPE_AUDIO_AC3: u8 = 0x81;
/// Stream type for TrueHD audio
pub const STREAM_TYPE_AUDIO_TRUEHD: u8 = 0x83;
/// Stream type for E-AC-3 audio (System A)
pub const STREAM_TYPE_AUDIO_EAC3: u8 = 0x87;
/// Stream type for DTS audio
pub const STREAM_TYPE_AUDIO_DTS: u8 = 0x8A;
/// Stream type for Dirac video
pub const STREAM_TYPE_VIDEO_DIRAC: u8 = 0xD1;
/// Stream type for VC-1 video
pub const STREAM_TYPE_VIDEO_VC1: u8 = 0xEA;

// ETSI 300 468 service_type values
/// Digital television service
pub const SERVICE_TYPE_DIGITAL_TV: u8 = 0x01;
/// Digital radio service
pub const SERVICE_TYPE_DIGITAL_RADIO: u8 = 0x02;
/// Teletext service
pub const SERVICE_TYPE_TELETEXT: u8 = 0x03;
/// Advanced codec digital radio service
pub const SERVICE_TYPE_ADVANCED_CODEC_DIGITAL_RADIO: u8 = 0x0A;
/// MPEG-2 HD digital television service
pub const SERVICE_TYPE_MPEG2_DIGITAL_HDTV: u8 = 0x11;
/// Advanced codec SD digital television service
pub const SERVICE_TYPE_ADVANCED_CODEC_DIGITAL_SDTV: u8 = 0x16;
/// Advanced codec HD digital television service
pub const SERVICE_TYPE_ADVANCED_CODEC_DIGITAL_HDTV: u8 = 0x19;
/// ISDB-Tb partial-reception (one-seg) television service
pub const SERVICE_TYPE_ONE_SEG: u8 = 0xC0;

/// Maps a codec onto the PMT stream_type byte.
///
/// `flags` carries the mux flags: LATM switches AAC to 0x11, System-B
/// demotes (E-)AC-3 to private data with a DVB descriptor alongside.
pub fn stream_type_for(codec: CodecId, flags: u32) -> u8 {
    use CodecId::*;
    match codec {
        Mpeg1Video | Mpeg2Video => STREAM_TYPE_VIDEO_MPEG2,
        Mpeg4Part2 => STREAM_TYPE_VIDEO_MPEG4,
        H264 => STREAM_TYPE_VIDEO_H264,
        Hevc => STREAM_TYPE_VIDEO_HEVC,
        Avs => STREAM_TYPE_VIDEO_CAVS,
        Dirac => STREAM_TYPE_VIDEO_DIRAC,
        Vc1 => STREAM_TYPE_VIDEO_VC1,
        Mp2 | Mp3 => STREAM_TYPE_AUDIO_MPEG1,
        Aac => {
            if flags & FLAG_AAC_LATM != 0 {
                STREAM_TYPE_AUDIO_AAC_LATM
            } else {
                STREAM_TYPE_AUDIO_AAC
            }
        }
        AacLatm => STREAM_TYPE_AUDIO_AAC_LATM,
        Ac3 => {
            if flags & FLAG_SYSTEM_B != 0 {
                STREAM_TYPE_PRIVATE_DATA
            } else {
                STREAM_TYPE_AUDIO_AC3
            }
        }
        Eac3 => {
            if flags & FLAG_SYSTEM_B != 0 {
                STREAM_TYPE_PRIVATE_DATA
            } else {
                STREAM_TYPE_AUDIO_EAC3
            }
        }
        Dts => STREAM_TYPE_AUDIO_DTS,
        TrueHd => STREAM_TYPE_AUDIO_TRUEHD,
        _ => STREAM_TYPE_PRIVATE_DATA,
    }
}

/// Encodes a 27 MHz PCR into its 33+6+9 bit wire layout.
///
/// Returns the number of bytes written (always 6).
pub fn write_pcr_bits(buf: &mut [u8], pcr: i64) -> usize {
    let pcr_low = pcr % 300;
    let pcr_high = pcr / 300;

    buf[0] = (pcr_high >> 25) as u8;
    buf[1] = (pcr_high >> 17) as u8;
    buf[2] = (pcr_high >> 9) as u8;
    buf[3] = (pcr_high >> 1) as u8;
    buf[4] = ((pcr_high << 7) as u8) | ((pcr_low >> 8) as u8) | 0x7E;
    buf[5] = pcr_low as u8;

    6
}
