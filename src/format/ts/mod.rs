//! # MPEG Transport Stream multiplexing
//!
//! A broadcast-grade TS muxer: PES packetisation with adaptation-field,
//! PCR and stuffing rules; periodic PAT/PMT/SDT/NIT/TOT/EIT emission with
//! CRC-protected sections; DVB and ISDB-Tb descriptor sets including the
//! one-seg partial-reception sub-service; optional M2TS framing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use isdbmux::av::{CodecId, Packet, StreamConfig};
//! use isdbmux::format::ts::{TSConfig, TSMuxer};
//! use isdbmux::format::Muxer;
//!
//! # async fn run() -> isdbmux::Result<()> {
//! let file = tokio::fs::File::create("out.ts").await?;
//! let mut muxer = TSMuxer::new(file, TSConfig::default());
//!
//! let streams = vec![
//!     StreamConfig::new(CodecId::H264),
//!     StreamConfig::new(CodecId::Aac).with_audio_params(48_000, 2, 1024),
//! ];
//! muxer.write_header(&streams).await?;
//!
//! let frame = Packet::new(vec![0, 0, 0, 1, 0x09, 0xF0])
//!     .with_stream_index(0)
//!     .with_pts(0)
//!     .with_dts(0)
//!     .with_key_flag(true);
//! muxer.write_packet(&frame).await?;
//! muxer.write_trailer().await?;
//! # Ok(())
//! # }
//! ```

/// Table emission cadence control
pub mod cadence;

/// Muxer option schema
pub mod config;

/// The TS muxer itself
pub mod muxer;

/// PES header serialisation
pub mod pes;

/// Service-information table builders
pub mod psi;

/// PSI/SI section writer
pub mod section;

/// Service registry and ISDB-Tb service-id synthesis
pub mod service;

/// Core TS constants and helpers
pub mod types;

pub use config::TSConfig;
pub use muxer::{BitstreamAdvice, TSMuxer};
pub use section::SectionContext;
pub use service::Service;
pub use types::{PID_EIT, PID_NIT, PID_NULL, PID_PAT, PID_SDT, PID_TOT, TS_PACKET_SIZE};
