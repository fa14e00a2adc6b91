#![doc(html_root_url = "https://docs.rs/isdbmux/0.1.0")]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # isdbmux - MPEG-2 Transport Stream multiplexer
//!
//! `isdbmux` emits a single continuous MPEG-2 transport stream from one or
//! more elementary streams (video, audio, subtitles, data). The output
//! conforms to ISO/IEC 13818-1 with the DVB (ETSI EN 300 468) and ISDB-Tb
//! (ABNT NBR 15603) service-information extensions used by Brazilian
//! digital terrestrial broadcasting, including the one-seg
//! partial-reception sub-service.
//!
//! ## Features
//!
//! - PES packetisation with adaptation fields, PCR pacing and stuffing
//! - Periodic, interleaved PAT/PMT/SDT/NIT/TOT/EIT emission with
//!   CRC-32/MPEG-2 protected sections
//! - ISDB-Tb transmission profiles with synthesised service ids and
//!   one-seg signalling (partial-reception and terrestrial-delivery
//!   descriptors)
//! - Per-codec adaptation: H.264 AUD insertion, AAC ADTS/LATM re-framing,
//!   HEVC validation, Opus TS control headers
//! - CBR output with null-packet padding, or VBR
//! - Optional M2TS (192-byte packet) framing
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use isdbmux::av::{CodecId, Packet, StreamConfig};
//! use isdbmux::format::ts::{TSConfig, TSMuxer};
//! use isdbmux::format::Muxer;
//!
//! #[tokio::main]
//! async fn main() -> isdbmux::Result<()> {
//!     let file = tokio::fs::File::create("out.ts").await?;
//!     let config = TSConfig {
//!         transmission_profile: 1, // FHD + one-seg
//!         original_network_id: 0x0640,
//!         ..Default::default()
//!     };
//!     let mut muxer = TSMuxer::new(file, config);
//!
//!     let streams = vec![
//!         StreamConfig::new(CodecId::H264),
//!         StreamConfig::new(CodecId::Aac).with_audio_params(48_000, 2, 1024),
//!     ];
//!     muxer.write_header(&streams).await?;
//!     // feed packets with muxer.write_packet(...), then:
//!     muxer.write_trailer().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! - `av`: codec identification, stream configuration and the input packet
//! - `codec`: per-codec bitstream adaptation
//! - `format`: the muxer trait and the TS implementation
//! - `error`: error types
//! - `utils`: bit-level I/O helpers

/// Audio/video base types
pub mod av;

/// Codec adaptation layer
pub mod codec;

/// Error types and utilities
pub mod error;

/// Media format implementations
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use error::{MuxError, Result};
