//! Codec adaptation layer.
//!
//! Per-codec quirks applied to each compressed-frame unit before PES
//! packetisation: Annex-B validation and access-unit-delimiter insertion
//! for H.264, start-code validation for HEVC, ADTS/LATM re-framing for raw
//! AAC, and the Opus TS control header with sample accounting.

pub mod aac;
pub mod h264;
pub mod hevc;
pub mod opus;
