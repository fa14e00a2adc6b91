//! Multiplexer option schema.
//!
//! `TSConfig` mirrors the option set of a broadcast-grade TS muxer: DVB
//! identifiers, ISDB-Tb transmission parameters, PID layout, rate control
//! and table cadence. Every field has a broadcast-sane default.

use chrono::{DateTime, Utc};

/// Re-emit PAT/PMT (and the rest of the SI set) before the next packet.
pub const FLAG_REEMIT_PAT_PMT: u32 = 0x01;
/// Use LATM packetization for AAC.
pub const FLAG_AAC_LATM: u32 = 0x02;
/// Re-emit PAT and PMT at each video frame.
pub const FLAG_PAT_PMT_AT_FRAMES: u32 = 0x04;
/// Conform to System B (DVB) instead of System A (ATSC).
pub const FLAG_SYSTEM_B: u32 = 0x08;

/// PCR retransmission time in milliseconds.
pub const PCR_RETRANS_TIME: u32 = 20;
/// PAT/PMT retransmission time in milliseconds.
pub const PAT_RETRANS_TIME: u32 = 100;
/// SDT retransmission time in milliseconds.
pub const SDT_RETRANS_TIME: u32 = 500;
/// NIT retransmission time in milliseconds (the Brazilian standard only
/// requires 10 s; this errs low like the reference transmitters).
pub const NIT_RETRANS_TIME: u32 = 50;
/// TOT retransmission time in milliseconds.
pub const TOT_RETRANS_TIME: u32 = 100;
/// EIT retransmission time in milliseconds.
pub const EIT_RETRANS_TIME: u32 = 500;

/// A PES header is generated at least every this many TS packets.
const DEFAULT_PES_HEADER_FREQ: usize = 16;
/// Default minimum PES payload before a flush.
pub const DEFAULT_PES_PAYLOAD_SIZE: usize = (DEFAULT_PES_HEADER_FREQ - 1) * 184 + 170;

/// Static multiplexer configuration, fixed for the lifetime of a mux.
#[derive(Debug, Clone)]
pub struct TSConfig {
    /// transport_stream_id announced in PAT/SDT
    pub transport_stream_id: u16,
    /// original_network_id announced in SDT/NIT
    pub original_network_id: u16,
    /// service_id of the single default service (ignored when a
    /// transmission profile synthesises services)
    pub service_id: u16,
    /// ISDB-Tb area code carried in the terrestrial delivery descriptor
    pub area_code: u16,
    /// Guard interval index (0..3)
    pub guard_interval: u8,
    /// Transmission mode index (0..3)
    pub transmission_mode: u8,
    /// UHF physical channel number (14..69)
    pub physical_channel: u16,
    /// Remote-control key id carried in the TS information descriptor
    pub virtual_channel: u16,
    /// ISDB-Tb service layout: 0 = single service, 1 = FHD + one-seg,
    /// 2 = 4×SD + one-seg, 3 = 2×HD + one-seg
    pub transmission_profile: u8,
    /// SDT service_type for the default (non-profile) service
    pub service_type: u8,
    /// First PID used for PMTs; services get consecutive PIDs from here
    pub pmt_start_pid: u16,
    /// First PID used for elementary streams with auto-assigned ids
    pub start_pid: u16,
    /// M2TS (192-byte packet) framing; `None` infers from `output_name`
    pub m2ts_mode: Option<bool>,
    /// Output file name, only consulted for m2ts auto-detection
    pub output_name: Option<String>,
    /// Mux rate in bits per second; 1 selects VBR
    pub mux_rate: u32,
    /// Minimum PES payload size before an audio flush
    pub pes_payload_size: usize,
    /// `FLAG_*` bit set
    pub flags: u32,
    /// Suppress the DTS/PTS delay offset; `None` = off (apply offset)
    pub copyts: Option<bool>,
    /// Version number stamped into every table (0..31)
    pub tables_version: u8,
    /// Write PES_packet_length = 0 for video packets
    pub omit_video_pes_length: bool,
    /// Maximum muxing delay in microseconds; drives PCR lead and audio
    /// buffering
    pub max_delay_us: i64,
    /// PCR retransmission time in milliseconds
    pub pcr_period_ms: u32,
    /// PAT/PMT retransmission limit in seconds; when set it becomes the
    /// sole cadence criterion
    pub pat_period: Option<f64>,
    /// SDT retransmission limit in seconds
    pub sdt_period: Option<f64>,
    /// NIT retransmission limit in seconds
    pub nit_period: Option<f64>,
    /// TOT retransmission limit in seconds
    pub tot_period: Option<f64>,
    /// EIT retransmission limit in seconds
    pub eit_period: Option<f64>,
    /// Provider name for the SDT service descriptor
    pub provider_name: String,
    /// Service name for the default service
    pub service_name: String,
    /// Network name for NIT
    pub network_name: String,
    /// ISO 3166 country code for parental rating and time offset
    pub country_code: String,
    /// Parental rating byte (RSV|SEX|VIOLENCE|DRUGS|RATING)
    pub parental_rating: u8,
    /// Event name advertised in EIT present/following
    pub event_name: String,
    /// Event text advertised in EIT
    pub event_text: String,
    /// Event duration in seconds, BCD-encoded into EIT
    pub event_duration_secs: u32,
    /// Use the TSID as EIT table_id_extension instead of the last
    /// service id (the historically emitted value)
    pub eit_use_tsid: bool,
    /// Fixed timestamp for TOT/EIT tables; `None` uses the wall clock
    pub table_time: Option<DateTime<Utc>>,
}

impl Default for TSConfig {
    fn default() -> Self {
        Self {
            transport_stream_id: 0x0001,
            original_network_id: 0x0001,
            service_id: 0x0001,
            area_code: 0x0001,
            guard_interval: 1,
            transmission_mode: 1,
            physical_channel: 20,
            virtual_channel: 20,
            transmission_profile: 0,
            service_type: 0x01,
            pmt_start_pid: 0x1000,
            start_pid: 0x0100,
            m2ts_mode: None,
            output_name: None,
            mux_rate: 1,
            pes_payload_size: DEFAULT_PES_PAYLOAD_SIZE,
            flags: 0,
            copyts: None,
            tables_version: 0,
            omit_video_pes_length: true,
            max_delay_us: 700_000,
            pcr_period_ms: PCR_RETRANS_TIME,
            pat_period: None,
            sdt_period: None,
            nit_period: None,
            tot_period: None,
            eit_period: None,
            provider_name: "isdbmux".to_string(),
            service_name: "Service01".to_string(),
            network_name: "ISDB-Tb TV".to_string(),
            country_code: "BRA".to_string(),
            parental_rating: 0x01,
            event_name: "Event01".to_string(),
            event_text: String::new(),
            event_duration_secs: 3600,
            eit_use_tsid: false,
            table_time: None,
        }
    }
}

impl TSConfig {
    /// True when the mux runs at a constant bit rate.
    pub fn is_cbr(&self) -> bool {
        self.mux_rate > 1
    }

    /// Maximum muxing delay in 90 kHz ticks.
    pub(crate) fn max_delay_90k(&self) -> i64 {
        self.max_delay_us * 90_000 / 1_000_000
    }
}
