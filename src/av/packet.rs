use bytes::Bytes;

/// A single compressed-frame unit handed to the multiplexer.
///
/// Timing is expressed in the owning stream's time base (see
/// [`StreamConfig::time_base`](crate::av::StreamConfig)); the muxer rescales
/// to the 90 kHz transport clock internally.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The compressed media data
    pub data: Bytes,
    /// Presentation timestamp in the stream's time base
    pub pts: Option<i64>,
    /// Decoding timestamp in the stream's time base
    pub dts: Option<i64>,
    /// Index of the stream this packet belongs to
    pub stream_index: usize,
    /// Whether this packet starts a key frame (random access point)
    pub is_key: bool,
    /// Caller-forced PES stream id (data streams; 0xBD selects asynchronous
    /// KLV carriage, which drops PTS/DTS)
    pub forced_stream_id: Option<u8>,
    /// Trailing samples the decoder should discard, at the stream's sample
    /// rate (Opus end trimming)
    pub skip_samples_end: u32,
}

impl Packet {
    /// Creates a new packet with the given data and default metadata.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            stream_index: 0,
            is_key: false,
            forced_stream_id: None,
            skip_samples_end: 0,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the decoding timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the stream index.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Marks the packet as a key frame.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Forces the PES stream id used when this packet is emitted.
    pub fn with_forced_stream_id(mut self, stream_id: u8) -> Self {
        self.forced_stream_id = Some(stream_id);
        self
    }

    /// Declares trailing samples to trim (Opus).
    pub fn with_skip_samples_end(mut self, samples: u32) -> Self {
        self.skip_samples_end = samples;
        self
    }
}
