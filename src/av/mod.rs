//! Core audio/video types: codec identification, per-stream configuration
//! and the input [`Packet`] unit.

/// The input compressed-frame unit
pub mod packet;
pub use packet::Packet;

use bytes::Bytes;

/// Broad media category of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video elementary streams
    Video,
    /// Audio elementary streams
    Audio,
    /// Subtitle and teletext streams
    Subtitle,
    /// Private and metadata streams
    Data,
}

/// Codec of an elementary stream.
///
/// The set mirrors what the PMT stream-type table can express; anything
/// else is carried as private data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // variant names are the codec names
pub enum CodecId {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4Part2,
    H264,
    Hevc,
    Avs,
    Dirac,
    Vc1,
    Mp2,
    Mp3,
    Aac,
    AacLatm,
    Ac3,
    Eac3,
    Dts,
    TrueHd,
    Opus,
    S302m,
    DvbSubtitle,
    DvbTeletext,
    SmpteKlv,
    BinaryData,
}

impl CodecId {
    /// The broad media category this codec belongs to.
    pub fn kind(self) -> MediaKind {
        use CodecId::*;
        match self {
            Mpeg1Video | Mpeg2Video | Mpeg4Part2 | H264 | Hevc | Avs | Dirac | Vc1 => {
                MediaKind::Video
            }
            Mp2 | Mp3 | Aac | AacLatm | Ac3 | Eac3 | Dts | TrueHd | Opus | S302m => {
                MediaKind::Audio
            }
            DvbSubtitle | DvbTeletext => MediaKind::Subtitle,
            SmpteKlv | BinaryData => MediaKind::Data,
        }
    }
}

/// A rational time base, `num / den` seconds per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl Rational {
    /// Creates a time base of `num / den` seconds per tick.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }
}

/// Rescales a timestamp from `tb` to the 90 kHz transport clock.
pub fn rescale_to_90k(ts: i64, tb: Rational) -> i64 {
    (ts as i128 * tb.num as i128 * 90_000 / tb.den as i128) as i64
}

/// Accessibility/content dispositions that feed descriptor emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disposition {
    /// Audio without narration
    pub clean_effects: bool,
    /// Content prepared for the hard of hearing
    pub hearing_impaired: bool,
    /// Content prepared for the visually impaired
    pub visual_impaired: bool,
}

/// Static description of one elementary stream, supplied at `write_header`
/// time by the upstream demuxer or encoder.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Stream codec
    pub codec: CodecId,
    /// Caller-chosen stream id. Values below 16 are reserved and get a
    /// calculated PID; values below 0x1FFF become the PID directly.
    pub stream_id: i32,
    /// Time base of this stream's packet timestamps
    pub time_base: Rational,
    /// Comma-separated ISO 639-2 language codes, if known
    pub language: Option<String>,
    /// Disposition flags
    pub disposition: Disposition,
    /// Codec extradata (SPS/PPS, AudioSpecificConfig, Opus head, DVB
    /// subtitle page ids, teletext records)
    pub extradata: Option<Bytes>,
    /// Audio sample rate in Hz (0 if not audio / unknown)
    pub sample_rate: u32,
    /// Audio channel count
    pub channels: u8,
    /// Audio samples per frame (0 if unknown)
    pub frame_size: u32,
    /// Codec delay in samples at the stream's sample rate (Opus pre-skip)
    pub initial_padding: u32,
}

impl StreamConfig {
    /// Creates a stream description with neutral defaults for `codec`.
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            stream_id: -1,
            time_base: Rational::new(1, 90_000),
            language: None,
            disposition: Disposition::default(),
            extradata: None,
            sample_rate: 0,
            channels: 0,
            frame_size: 0,
            initial_padding: 0,
        }
    }

    /// Sets the caller stream id (PID request).
    pub fn with_stream_id(mut self, id: i32) -> Self {
        self.stream_id = id;
        self
    }

    /// Sets the packet time base.
    pub fn with_time_base(mut self, tb: Rational) -> Self {
        self.time_base = tb;
        self
    }

    /// Sets the language code list.
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    /// Sets the codec extradata.
    pub fn with_extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = Some(extradata.into());
        self
    }

    /// Sets audio parameters.
    pub fn with_audio_params(mut self, sample_rate: u32, channels: u8, frame_size: u32) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.frame_size = frame_size;
        self
    }

    /// Sets the codec delay (Opus pre-skip).
    pub fn with_initial_padding(mut self, samples: u32) -> Self {
        self.initial_padding = samples;
        self
    }

    /// Sets disposition flags.
    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_kinds() {
        assert_eq!(CodecId::H264.kind(), MediaKind::Video);
        assert_eq!(CodecId::Opus.kind(), MediaKind::Audio);
        assert_eq!(CodecId::DvbTeletext.kind(), MediaKind::Subtitle);
        assert_eq!(CodecId::SmpteKlv.kind(), MediaKind::Data);
    }

    #[test]
    fn rescale_to_transport_clock() {
        // 1 second in a 1/1000 time base is 90000 ticks
        assert_eq!(rescale_to_90k(1000, Rational::new(1, 1000)), 90_000);
        // identity for native 90 kHz
        assert_eq!(rescale_to_90k(1234, Rational::new(1, 90_000)), 1234);
        // negative timestamps keep their sign
        assert_eq!(rescale_to_90k(-500, Rational::new(1, 1000)), -45_000);
    }
}
