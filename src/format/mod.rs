//! Media container implementations.

use crate::av::{Packet, StreamConfig};
use crate::Result;

pub mod ts;

/// Common trait for format muxers.
#[async_trait::async_trait]
pub trait Muxer: Send {
    /// Declare the elementary streams and prepare internal state.
    async fn write_header(&mut self, streams: &[StreamConfig]) -> Result<()>;

    /// Write one compressed-frame unit.
    async fn write_packet(&mut self, packet: &Packet) -> Result<()>;

    /// Write any trailing data and flush the sink.
    async fn write_trailer(&mut self) -> Result<()>;

    /// Drain buffered payloads without closing the stream.
    async fn flush(&mut self) -> Result<()>;
}

pub use self::ts::TSMuxer;
