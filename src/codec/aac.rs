//! AAC re-framing.
//!
//! Raw AAC access units (no ADTS sync word) cannot travel in a transport
//! stream directly. The muxer re-frames them using the stream's
//! AudioSpecificConfig extradata: ADTS by default, LATM (AudioSyncStream)
//! when the mux runs with the LATM flag.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MuxError, Result};
use crate::utils::{BitReader, BitWriter};

/// Parsed MPEG-4 AudioSpecificConfig.
#[derive(Debug, Clone)]
pub struct AacConfig {
    /// Audio object type (2 = LC)
    pub object_type: u8,
    /// Sampling frequency index into [`SAMPLE_RATES`]
    pub sample_rate_index: u8,
    /// Channel configuration (1 = mono, 2 = stereo, ...)
    pub channel_config: u8,
}

/// AAC sampling frequencies by index (ISO 14496-3 table 1.18).
pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// True when the packet already carries an ADTS sync word.
pub fn is_adts(data: &[u8]) -> bool {
    data.len() >= 2 && (u16::from_be_bytes([data[0], data[1]]) & 0xFFF0) == 0xFFF0
}

/// Parses the leading fields of an AudioSpecificConfig.
pub fn parse_config(extradata: &[u8]) -> Result<AacConfig> {
    let mut reader = BitReader::new(extradata);
    let object_type = reader.read_bits(5)? as u8;
    if object_type == 31 {
        return Err(MuxError::NotSupported(
            "escaped AAC audio object types cannot be framed".into(),
        ));
    }
    let sample_rate_index = reader.read_bits(4)? as u8;
    if sample_rate_index == 15 {
        // explicit 24-bit frequency follows; ADTS cannot express it
        return Err(MuxError::NotSupported(
            "explicit AAC sampling frequency cannot be framed".into(),
        ));
    }
    let channel_config = reader.read_bits(4)? as u8;

    Ok(AacConfig {
        object_type,
        sample_rate_index,
        channel_config,
    })
}

/// ADTS frame emitter built from a parsed AudioSpecificConfig.
#[derive(Debug, Clone)]
pub struct AdtsEncoder {
    config: AacConfig,
}

impl AdtsEncoder {
    /// Builds an encoder from AudioSpecificConfig extradata.
    pub fn new(extradata: &[u8]) -> Result<Self> {
        let config = parse_config(extradata)?;
        // the 2-bit ADTS profile field only encodes object types 1..4
        if !(1..=4).contains(&config.object_type) {
            return Err(MuxError::NotSupported(format!(
                "AAC object type {} not allowed in ADTS",
                config.object_type
            )));
        }
        Ok(Self { config })
    }

    /// Wraps one raw AAC frame in a 7-byte ADTS header.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes> {
        let frame_len = payload.len() + 7;
        if frame_len >= 1 << 13 {
            return Err(MuxError::InvalidData("AAC frame too large for ADTS".into()));
        }

        let mut w = BitWriter::new();
        w.write_bits(0xFFF, 12); // sync word
        w.write_bit(false); // MPEG-4
        w.write_bits(0, 2); // layer
        w.write_bit(true); // no CRC
        w.write_bits(u32::from(self.config.object_type) - 1, 2);
        w.write_bits(u32::from(self.config.sample_rate_index), 4);
        w.write_bit(false); // private
        w.write_bits(u32::from(self.config.channel_config), 3);
        w.write_bits(0, 4); // original/copy, home, copyright bits
        w.write_bits(frame_len as u32, 13);
        w.write_bits(0x7FF, 11); // buffer fullness: VBR
        w.write_bits(0, 2); // one raw data block

        let mut out = BytesMut::with_capacity(frame_len);
        out.put_slice(&w.finish());
        out.put_slice(payload);
        Ok(out.freeze())
    }
}

/// LATM (AudioSyncStream) frame emitter. Each frame carries an in-band
/// StreamMuxConfig so receivers can join at any sync point.
#[derive(Debug, Clone)]
pub struct LatmEncoder {
    asc: Vec<u8>,
}

impl LatmEncoder {
    /// Builds an encoder from AudioSpecificConfig extradata.
    pub fn new(extradata: &[u8]) -> Result<Self> {
        // validate up front so framing cannot fail mid-stream
        parse_config(extradata)?;
        Ok(Self {
            asc: extradata.to_vec(),
        })
    }

    /// Wraps one raw AAC frame as an AudioSyncStream element.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes> {
        let mut w = BitWriter::new();
        // AudioMuxElement with in-band mux config
        w.write_bit(false); // useSameStreamMux
        w.write_bit(false); // audioMuxVersion
        w.write_bit(true); // allStreamsSameTimeFraming
        w.write_bits(0, 6); // numSubFrames
        w.write_bits(0, 4); // numProgram
        w.write_bits(0, 3); // numLayer
        w.copy_bits(&self.asc, self.asc.len() * 8);
        w.write_bits(0, 3); // frameLengthType
        w.write_bits(0xFF, 8); // latmBufferFullness
        w.write_bit(false); // otherDataPresent
        w.write_bit(false); // crcCheckPresent

        // PayloadLengthInfo, 255-terminated
        let mut n = payload.len();
        while n >= 255 {
            w.write_bits(255, 8);
            n -= 255;
        }
        w.write_bits(n as u32, 8);
        w.copy_bits(payload, payload.len() * 8);

        let mux_element = w.finish();
        if mux_element.len() >= 1 << 13 {
            return Err(MuxError::InvalidData("AAC frame too large for LATM".into()));
        }

        let mut out = BytesMut::with_capacity(3 + mux_element.len());
        let mut sync = BitWriter::new();
        sync.write_bits(0x2B7, 11);
        sync.write_bits(mux_element.len() as u32, 13);
        out.put_slice(&sync.finish());
        out.put_slice(&mux_element);
        Ok(out.freeze())
    }
}
