//! The transport-stream multiplexer.
//!
//! `TSMuxer` owns every piece of mutable mux state: the service arena,
//! per-stream packetisation state, table cadences and the output byte
//! position that drives PCR generation. All operations take the muxer by
//! exclusive reference; there are no internal threads or timers.

use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, error, warn};
use tokio::io::{self, AsyncWrite, AsyncWriteExt};

use crate::av::{rescale_to_90k, CodecId, MediaKind, Packet, StreamConfig};
use crate::codec::{aac, h264, hevc, opus};
use crate::error::{MuxError, Result};
use crate::format::Muxer as FormatMuxer;

use super::cadence::TableCadence;
use super::config::{
    TSConfig, EIT_RETRANS_TIME, FLAG_PAT_PMT_AT_FRAMES, FLAG_REEMIT_PAT_PMT, NIT_RETRANS_TIME,
    PAT_RETRANS_TIME, SDT_RETRANS_TIME, TOT_RETRANS_TIME,
};
use super::pes::{stream_id_for, PesExtension, PesHeader};
use super::psi::{self, EsInfo};
use super::section::SectionContext;
use super::service::{build_services, Service};
use super::types::{
    write_pcr_bits, PCR_HZ, PID_EIT, PID_NIT, PID_NULL, PID_PAT, PID_SDT, PID_TOT, TID_EIT,
    TID_NIT, TID_PAT, TID_PMT, TID_SDT, TS_PACKET_SIZE,
};

/// Bitstream filters the caller should insert upstream, reported by
/// [`TSMuxer::check_bitstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamAdvice {
    /// Convert length-prefixed H.264 to Annex-B
    H264Mp4ToAnnexB,
    /// Convert length-prefixed HEVC to Annex-B
    HevcMp4ToAnnexB,
}

/// AAC re-framing context attached to streams that need it.
enum AacFramer {
    Adts(aac::AdtsEncoder),
    Latm(aac::LatmEncoder),
}

impl AacFramer {
    fn frame(&self, payload: &[u8]) -> Result<Bytes> {
        match self {
            AacFramer::Adts(enc) => enc.frame(payload),
            AacFramer::Latm(enc) => enc.frame(payload),
        }
    }
}

/// Per-elementary-stream packetisation state.
struct TSWriteStream {
    config: StreamConfig,
    pid: u16,
    cc: u8,
    /// Index of the owning service in the muxer's arena
    service_index: usize,
    payload: BytesMut,
    payload_pts: Option<i64>,
    payload_dts: Option<i64>,
    payload_key: bool,
    prev_payload_key: bool,
    first_pts_check: bool,
    nb_frames: u64,
    aac_framer: Option<AacFramer>,
    opus_queued_samples: u32,
    opus_pending_trim_start: u32,
}

/// MPEG-TS multiplexer writing to an async byte sink.
pub struct TSMuxer<W: AsyncWrite + Unpin + Send> {
    writer: io::BufWriter<W>,
    config: TSConfig,
    services: Vec<Service>,
    streams: Vec<TSWriteStream>,
    pat: SectionContext,
    sdt: SectionContext,
    nit: SectionContext,
    tot: SectionContext,
    eit: SectionContext,
    pat_cadence: TableCadence,
    sdt_cadence: TableCadence,
    nit_cadence: TableCadence,
    tot_cadence: TableCadence,
    eit_cadence: TableCadence,
    /// Runtime copy of the config flags; REEMIT_PAT_PMT is a one-shot here
    flags: u32,
    m2ts_mode: bool,
    copyts: bool,
    first_pcr: i64,
    /// Bytes pushed to the sink so far, the CBR clock source
    position: u64,
    initialized: bool,
}

impl<W: AsyncWrite + Unpin + Send> TSMuxer<W> {
    /// Creates a muxer over `writer`. No bytes are written until packets
    /// arrive.
    pub fn new(writer: W, config: TSConfig) -> Self {
        let flags = config.flags;
        Self {
            writer: io::BufWriter::new(writer),
            services: Vec::new(),
            streams: Vec::new(),
            pat: SectionContext::new(PID_PAT),
            sdt: SectionContext::new(PID_SDT),
            nit: SectionContext::new(PID_NIT),
            tot: SectionContext::new(PID_TOT),
            eit: SectionContext::new(PID_EIT),
            pat_cadence: TableCadence::new(1, None),
            sdt_cadence: TableCadence::new(1, None),
            nit_cadence: TableCadence::new(1, None),
            tot_cadence: TableCadence::new(1, None),
            eit_cadence: TableCadence::new(1, None),
            flags,
            m2ts_mode: false,
            copyts: false,
            first_pcr: 0,
            position: 0,
            initialized: false,
            config,
        }
    }

    /// Arms the one-shot header re-emission: every SI table goes out
    /// before the next packet.
    pub fn resend_headers(&mut self) {
        self.flags |= FLAG_REEMIT_PAT_PMT;
    }

    /// Consumes the muxer and returns the underlying writer. Any buffered
    /// bytes not yet flushed are discarded; call
    /// [`write_trailer`](crate::format::Muxer::write_trailer) first.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Advises whether the caller should convert this packet's stream to
    /// Annex-B before muxing.
    pub fn check_bitstream(&self, packet: &Packet) -> Option<BitstreamAdvice> {
        let codec = self.streams.get(packet.stream_index)?.config.codec;
        let data = &packet.data;
        if data.len() < 5 {
            return None;
        }
        let has_startcode = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == 1
            || (data[0] == 0 && data[1] == 0 && data[2] == 1);
        match codec {
            CodecId::H264 if !has_startcode => Some(BitstreamAdvice::H264Mp4ToAnnexB),
            CodecId::Hevc if !has_startcode => Some(BitstreamAdvice::HevcMp4ToAnnexB),
            _ => None,
        }
    }

    /// PCR for the current output position:
    /// `(position + 11) · 8 · 27 MHz / mux_rate + first_pcr`. The +11
    /// points at the last byte of the PCR base in flight.
    fn current_pcr(&self) -> i64 {
        ((self.position as i128 + 11) * 8 * PCR_HZ as i128 / self.config.mux_rate as i128) as i64
            + self.first_pcr
    }

    /// Writes one 188-byte packet to the sink, prefixing the M2TS
    /// timestamp when enabled.
    async fn write_ts_packet(&mut self, packet: &[u8; TS_PACKET_SIZE]) -> Result<()> {
        if self.m2ts_mode {
            let tp_extra_header = (self.current_pcr() % 0x3FFF_FFFF) as u32;
            self.writer.write_all(&tp_extra_header.to_be_bytes()).await?;
            self.position += 4;
        }
        self.writer.write_all(packet).await?;
        self.position += TS_PACKET_SIZE as u64;
        Ok(())
    }

    /// Writes a buffer of pre-chunked 188-byte section packets.
    async fn write_section_packets(&mut self, packets: BytesMut) -> Result<()> {
        for chunk in packets.chunks(TS_PACKET_SIZE) {
            let mut packet = [0u8; TS_PACKET_SIZE];
            packet.copy_from_slice(chunk);
            self.write_ts_packet(&packet).await?;
        }
        Ok(())
    }

    async fn write_pat_and_pmts(&mut self) -> Result<()> {
        let payload = psi::pat::build(&self.services);
        let packets = self.pat.write_section1(
            TID_PAT,
            self.config.transport_stream_id,
            self.config.tables_version,
            0,
            0,
            &payload,
        )?;
        self.write_section_packets(packets).await?;

        for index in 0..self.services.len() {
            let streams: Vec<EsInfo> = self
                .streams
                .iter()
                .enumerate()
                .filter(|(_, s)| s.service_index == index)
                .map(|(i, s)| EsInfo {
                    pid: s.pid,
                    stream_index: i,
                    config: &s.config,
                })
                .collect();
            let payload = psi::pmt::build(&self.config, &self.services[index], &streams);
            let sid = self.services[index].sid;
            match self.services[index].pmt.write_section1(
                TID_PMT,
                sid,
                self.config.tables_version,
                0,
                0,
                &payload,
            ) {
                Ok(packets) => self.write_section_packets(packets).await?,
                // an overflowing PMT degrades the table, never the mux
                Err(err) => error!("dropping PMT for service 0x{:04X}: {}", sid, err),
            }
        }
        Ok(())
    }

    async fn write_sdt(&mut self) -> Result<()> {
        let payload = psi::sdt::build(&self.config, &self.services);
        let packets = self.sdt.write_section1(
            TID_SDT,
            self.config.transport_stream_id,
            self.config.tables_version,
            0,
            0,
            &payload,
        )?;
        self.write_section_packets(packets).await
    }

    async fn write_nit(&mut self) -> Result<()> {
        let payload = psi::nit::build(&self.config, &self.services);
        let packets = self.nit.write_section1(
            TID_NIT,
            self.config.original_network_id,
            self.config.tables_version,
            0,
            0,
            &payload,
        )?;
        self.write_section_packets(packets).await
    }

    async fn write_tot(&mut self) -> Result<()> {
        let mut section = psi::tot::build(&self.config);
        let packets = self.tot.write_section(&mut section);
        self.write_section_packets(packets).await
    }

    async fn write_eit(&mut self) -> Result<()> {
        let payload = psi::eit::build(&self.config, &self.services);
        // the historical table_id_extension is the last service's sid, not
        // the TSID the standard asks for; see eit_use_tsid
        let table_id_ext = if self.config.eit_use_tsid {
            self.config.transport_stream_id
        } else {
            self.services.last().map_or(0, |s| s.sid)
        };
        let packets = self.eit.write_section1(
            TID_EIT,
            table_id_ext,
            self.config.tables_version,
            0,
            0,
            &payload,
        )?;
        self.write_section_packets(packets).await
    }

    /// Polls every table cadence in the fixed order SDT, NIT, TOT, EIT,
    /// then PAT with the per-service PMTs. Called once per outgoing PES
    /// transport packet.
    async fn retransmit_si_info(&mut self, force_pat: bool, dts: Option<i64>) -> Result<()> {
        if self.sdt_cadence.poll(dts, false) {
            self.write_sdt().await?;
        }
        if self.nit_cadence.poll(dts, false) {
            self.write_nit().await?;
        }
        if self.tot_cadence.poll(dts, false) {
            self.write_tot().await?;
        }
        if self.eit_cadence.poll(dts, false) {
            self.write_eit().await?;
        }
        if self.pat_cadence.poll(dts, force_pat) {
            self.write_pat_and_pmts().await?;
        }
        Ok(())
    }

    /// Writes a null packet; the continuity counter is not consumed
    /// (ISO 13818-1 2.4.3.3).
    async fn insert_null_packet(&mut self) -> Result<()> {
        let mut buf = [0xFFu8; TS_PACKET_SIZE];
        buf[0] = 0x47;
        buf[1] = (PID_NULL >> 8) as u8;
        buf[2] = PID_NULL as u8;
        buf[3] = 0x10;
        self.write_ts_packet(&buf).await
    }

    /// Writes an adaptation-only packet carrying just a PCR on the given
    /// stream's PID, without consuming a continuity counter value.
    async fn insert_pcr_only(&mut self, stream_index: usize) -> Result<()> {
        let pid = self.streams[stream_index].pid;
        let cc = self.streams[stream_index].cc;
        let pcr = self.current_pcr();

        let mut buf = [0xFFu8; TS_PACKET_SIZE];
        buf[0] = 0x47;
        buf[1] = (pid >> 8) as u8;
        buf[2] = pid as u8;
        buf[3] = 0x20 | cc; // adaptation field only
        buf[4] = (TS_PACKET_SIZE - 5) as u8;
        buf[5] = 0x10; // PCR present
        write_pcr_bits(&mut buf[6..12], pcr);
        self.write_ts_packet(&buf).await
    }

    /// Adds a PES header to the front of the payload and segments it into
    /// an integer number of transport packets. The final packet is padded
    /// by growing its adaptation field.
    async fn write_pes(
        &mut self,
        stream_index: usize,
        payload: &[u8],
        pts: Option<i64>,
        dts: Option<i64>,
        key: bool,
        forced_stream_id: Option<u8>,
    ) -> Result<()> {
        let delay = self.config.max_delay_90k();
        let codec = self.streams[stream_index].config.codec;
        let kind = codec.kind();
        let pid = self.streams[stream_index].pid;
        let service_index = self.streams[stream_index].service_index;
        let is_dvb_subtitle = codec == CodecId::DvbSubtitle;
        let is_dvb_teletext = codec == CodecId::DvbTeletext;

        let mut force_pat =
            kind == MediaKind::Video && key && !self.streams[stream_index].prev_payload_key;
        if self.flags & FLAG_PAT_PMT_AT_FRAMES != 0 && kind == MediaKind::Video {
            force_pat = true;
        }

        let stream_id = stream_id_for(codec, self.m2ts_mode, forced_stream_id);
        let (mut pts, mut dts) = (pts, dts);
        if kind == MediaKind::Data && stream_id == 0xBD {
            // asynchronous KLV carries no timestamps
            pts = None;
            dts = None;
        }

        let extension = if codec == CodecId::Dirac {
            PesExtension::DiracStreamId
        } else if self.m2ts_mode && codec == CodecId::Ac3 {
            PesExtension::BlurayAc3
        } else {
            PesExtension::None
        };

        let header = PesHeader {
            stream_id,
            packet_length: 0,
            data_alignment: kind == MediaKind::Subtitle || kind == MediaKind::Data,
            pts,
            dts: if dts.is_some() && pts.is_some() && dts != pts {
                dts
            } else {
                None
            },
            extension,
            teletext: is_dvb_teletext,
        };

        let mut packet_length = payload.len() + header.header_data_length() + 3;
        if is_dvb_subtitle {
            packet_length += 3;
        }
        if packet_length > 0xFFFF {
            packet_length = 0;
        }
        if self.config.omit_video_pes_length && kind == MediaKind::Video {
            packet_length = 0;
        }

        let mut header = header;
        header.packet_length = packet_length as u16;

        let mut pes_prefix = BytesMut::with_capacity(header.wire_len() + 2);
        header.write_to(&mut pes_prefix);
        if is_dvb_subtitle {
            // data_identifier 0x20, subtitle_stream_id 0x00
            pes_prefix.put_u8(0x20);
            pes_prefix.put_u8(0x00);
        }

        // DVB subtitles gain a trailing end_of_PES marker byte
        let mut remaining = payload.len() + usize::from(is_dvb_subtitle);
        let mut payload = payload;
        let mut is_start = true;

        while remaining > 0 {
            self.retransmit_si_info(force_pat, dts).await?;
            force_pat = false;

            let mut write_pcr = false;
            if pid == self.services[service_index].pcr_pid {
                let service = &mut self.services[service_index];
                // VBR pcr period is based on frames
                if self.config.is_cbr() || is_start {
                    service.pcr_packet_count += 1;
                }
                if service.pcr_packet_count >= service.pcr_packet_period {
                    service.pcr_packet_count = 0;
                    write_pcr = true;
                }
            }

            if self.config.is_cbr() {
                if let Some(d) = dts {
                    if d - self.current_pcr() / 300 > delay {
                        // pcr insert gets priority over null packet insert
                        if write_pcr {
                            self.insert_pcr_only(stream_index).await?;
                        } else {
                            self.insert_null_packet().await?;
                        }
                        continue;
                    }
                }
            }

            let mut buf = [0u8; TS_PACKET_SIZE];
            buf[0] = 0x47;
            buf[1] = (pid >> 8) as u8 | if is_start { 0x40 } else { 0 };
            buf[2] = pid as u8;
            let cc = {
                let stream = &mut self.streams[stream_index];
                stream.cc = (stream.cc + 1) & 0x0F;
                stream.cc
            };
            buf[3] = 0x10 | cc;

            if key && is_start && pts.is_some() {
                // random access point
                if pid == self.services[service_index].pcr_pid {
                    write_pcr = true;
                }
                set_af_flag(&mut buf, 0x40);
            }
            if write_pcr {
                set_af_flag(&mut buf, 0x10);
                let pcr = if self.config.is_cbr() {
                    self.current_pcr()
                } else {
                    (dts.unwrap_or(0) - delay) * 300
                };
                if let Some(d) = dts {
                    if d < pcr / 300 {
                        warn!("dts < pcr, TS is invalid");
                    }
                }
                let at = ts_payload_start(&buf);
                let written = write_pcr_bits(&mut buf[at..at + 6], pcr);
                extend_af(&mut buf, written as u8);
            }

            let mut q = ts_payload_start(&buf);
            if is_start {
                buf[q..q + pes_prefix.len()].copy_from_slice(&pes_prefix);
                q += pes_prefix.len();
                is_start = false;
            }

            let header_len = q;
            let len = (TS_PACKET_SIZE - header_len).min(remaining);
            let stuffing_len = TS_PACKET_SIZE - header_len - len;
            if stuffing_len > 0 {
                if buf[3] & 0x20 != 0 {
                    // adaptation field present: grow it
                    let afc_len = buf[4] as usize + 1;
                    buf.copy_within(4 + afc_len..header_len, 4 + afc_len + stuffing_len);
                    buf[4] += stuffing_len as u8;
                    buf[4 + afc_len..4 + afc_len + stuffing_len].fill(0xFF);
                } else {
                    buf.copy_within(4..header_len, 4 + stuffing_len);
                    buf[3] |= 0x20;
                    buf[4] = (stuffing_len - 1) as u8;
                    if stuffing_len >= 2 {
                        buf[5] = 0x00;
                        buf[6..4 + stuffing_len].fill(0xFF);
                    }
                }
            }

            if is_dvb_subtitle && remaining == len {
                // the last byte is the end_of_PES_data_field_marker
                buf[TS_PACKET_SIZE - len..TS_PACKET_SIZE - 1]
                    .copy_from_slice(&payload[..len - 1]);
                buf[TS_PACKET_SIZE - 1] = 0xFF;
                payload = &payload[len - 1..];
            } else {
                buf[TS_PACKET_SIZE - len..].copy_from_slice(&payload[..len]);
                payload = &payload[len..];
            }
            remaining -= len;

            self.write_ts_packet(&buf).await?;
        }

        self.streams[stream_index].prev_payload_key = key;
        Ok(())
    }

    /// Emits the buffered PES payload of one stream, if any.
    async fn flush_stream(&mut self, index: usize, forced_stream_id: Option<u8>) -> Result<()> {
        if self.streams[index].payload.is_empty() {
            return Ok(());
        }
        let buffered = std::mem::take(&mut self.streams[index].payload);
        let pts = self.streams[index].payload_pts;
        let dts = self.streams[index].payload_dts;
        let key = self.streams[index].payload_key;

        self.write_pes(index, &buffered, pts, dts, key, forced_stream_id)
            .await?;

        let stream = &mut self.streams[index];
        stream.payload = buffered;
        stream.payload.clear();
        stream.opus_queued_samples = 0;
        Ok(())
    }

    fn prepare_opus(&mut self, index: usize, packet: &Packet) -> Result<(Bytes, u32)> {
        if packet.data.len() < 2 {
            return Err(MuxError::InvalidData("Opus packet too short".into()));
        }
        if opus::is_ts_framed(&packet.data) {
            warn!("Got MPEG-TS formatted Opus data, unhandled");
            return Ok((packet.data.clone(), 0));
        }

        let samples = opus::packet_samples(&packet.data);
        let stream = &mut self.streams[index];

        let trim_start = if stream.opus_pending_trim_start > 0 {
            let trim = stream.opus_pending_trim_start.min(samples);
            stream.opus_pending_trim_start -= trim;
            Some(trim as u16)
        } else {
            None
        };

        let sample_rate = stream.config.sample_rate.max(1);
        let trim_end_scaled = packet.skip_samples_end as u64 * 48_000 / sample_rate as u64;
        let trim_end = if trim_end_scaled > 0 {
            let limit = samples - trim_start.map_or(0, u32::from);
            Some((trim_end_scaled as u32).min(limit) as u16)
        } else {
            None
        };

        Ok((
            opus::control_frame(&packet.data, trim_start, trim_end),
            samples,
        ))
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatMuxer for TSMuxer<W> {
    /// Validates PIDs, allocates services and per-stream buffers, computes
    /// emission periods and picks the PCR stream. Writes no bytes.
    async fn write_header(&mut self, streams: &[StreamConfig]) -> Result<()> {
        if self.initialized {
            return Err(MuxError::InvalidConfig("muxer already initialized".into()));
        }
        if streams.is_empty() {
            return Err(MuxError::InvalidConfig("no streams to mux".into()));
        }

        self.services = build_services(&self.config);
        let pmt_pids: Vec<u16> = self.services.iter().map(|s| s.pmt.pid).collect();
        let mut video_pcr_stream = None;

        for (i, stream_config) in streams.iter().enumerate() {
            let pid = if stream_config.stream_id < 16 {
                // PID values below 16 are reserved; such ids get a
                // calculated PID
                self.config.start_pid + i as u16
            } else if stream_config.stream_id < 0x1FFF {
                stream_config.stream_id as u16
            } else {
                return Err(MuxError::InvalidConfig(format!(
                    "invalid stream id {}, must be less than 8191",
                    stream_config.stream_id
                )));
            };

            if pmt_pids.contains(&pid) || self.streams.iter().any(|s| s.pid == pid) {
                return Err(MuxError::InvalidConfig(format!(
                    "duplicate stream pid 0x{:04X}",
                    pid
                )));
            }

            let service_index = i % self.services.len();
            let aac_framer = if stream_config.codec == CodecId::Aac {
                match stream_config.extradata.as_deref() {
                    Some(extradata) if !extradata.is_empty() => {
                        Some(if self.flags & super::config::FLAG_AAC_LATM != 0 {
                            AacFramer::Latm(aac::LatmEncoder::new(extradata)?)
                        } else {
                            AacFramer::Adts(aac::AdtsEncoder::new(extradata)?)
                        })
                    }
                    _ => None,
                }
            } else {
                None
            };

            let opus_pending_trim_start = if stream_config.codec == CodecId::Opus
                && stream_config.sample_rate > 0
            {
                (stream_config.initial_padding as u64 * 48_000 / stream_config.sample_rate as u64)
                    as u32
            } else {
                0
            };

            if stream_config.codec.kind() == MediaKind::Video
                && self.services[service_index].pcr_pid == 0x1FFF
            {
                self.services[service_index].pcr_pid = pid;
                video_pcr_stream = Some(i);
            }

            self.streams.push(TSWriteStream {
                config: stream_config.clone(),
                pid,
                cc: 15,
                service_index,
                payload: BytesMut::with_capacity(self.config.pes_payload_size),
                payload_pts: None,
                payload_dts: None,
                payload_key: false,
                prev_payload_key: false,
                first_pts_check: true,
                nb_frames: 0,
                aac_framer,
                opus_queued_samples: 0,
                opus_pending_trim_start,
            });
        }

        // if no video stream claimed a PCR, the first stream carries it
        let last_service = self.streams.last().map(|s| s.service_index).unwrap_or(0);
        let pcr_stream = match video_pcr_stream {
            Some(i) => i,
            None if self.services[last_service].pcr_pid == 0x1FFF => {
                let service_index = self.streams[0].service_index;
                self.services[service_index].pcr_pid = self.streams[0].pid;
                0
            }
            None => 0,
        };

        let mux_rate = self.config.mux_rate;
        let (pcr_period, sdt_period, pat_period, nit_period, tot_period, eit_period);
        if self.config.is_cbr() {
            pcr_period = TableCadence::period_packets(mux_rate, self.config.pcr_period_ms);
            sdt_period = TableCadence::period_packets(mux_rate, SDT_RETRANS_TIME);
            pat_period = TableCadence::period_packets(mux_rate, PAT_RETRANS_TIME);
            nit_period = TableCadence::period_packets(mux_rate, NIT_RETRANS_TIME);
            tot_period = TableCadence::period_packets(mux_rate, TOT_RETRANS_TIME);
            eit_period = TableCadence::period_packets(mux_rate, EIT_RETRANS_TIME);

            self.copyts = self.config.copyts.unwrap_or(false);
            if !self.copyts {
                self.first_pcr = self.config.max_delay_us * (PCR_HZ / 1_000_000);
            }
        } else {
            // arbitrary packet periods; PAT/PMT are also written on video
            // key frames
            sdt_period = 200;
            pat_period = 40;
            nit_period = 200;
            tot_period = 200;
            eit_period = 200;
            self.copyts = self.config.copyts.unwrap_or(false);

            let pcr_cfg = &self.streams[pcr_stream].config;
            pcr_period = if pcr_cfg.codec.kind() == MediaKind::Audio {
                let frame_size = if pcr_cfg.frame_size == 0 {
                    warn!("frame size not set");
                    512
                } else {
                    pcr_cfg.frame_size
                };
                (pcr_cfg.sample_rate as i64 / (10 * frame_size as i64)).max(1)
            } else {
                // delta PCR capped at 0.1 s, approximated by the frame rate
                let tb = pcr_cfg.time_base;
                (tb.den as i64 / (10 * tb.num as i64)).max(1)
            };
        }

        let pcr_service = self.streams[pcr_stream].service_index;
        self.services[pcr_service].pcr_packet_period = pcr_period;
        // output a PCR as soon as possible
        self.services[pcr_service].pcr_packet_count = pcr_period;

        self.pat_cadence = TableCadence::new(pat_period, self.config.pat_period);
        self.sdt_cadence = TableCadence::new(sdt_period, self.config.sdt_period);
        self.nit_cadence = TableCadence::new(nit_period, self.config.nit_period);
        self.tot_cadence = TableCadence::new(tot_period, self.config.tot_period);
        self.eit_cadence = TableCadence::new(eit_period, self.config.eit_period);

        self.m2ts_mode = self.config.m2ts_mode.unwrap_or_else(|| {
            self.config
                .output_name
                .as_deref()
                .is_some_and(|name| name.ends_with(".m2ts"))
        });

        if self.config.is_cbr() {
            debug!(
                "muxrate {}, pcr every {} pkts, sdt every {}, pat/pmt every {} pkts, \
                 nit every {} pkts, tot every {} pkts, eit every {} pkts",
                mux_rate, pcr_period, sdt_period, pat_period, nit_period, tot_period, eit_period
            );
        } else {
            debug!("muxrate VBR, pcr every {} pkts", pcr_period);
        }

        self.initialized = true;
        Ok(())
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        if !self.initialized {
            return Err(MuxError::InvalidConfig("muxer not initialized".into()));
        }
        let index = packet.stream_index;
        if index >= self.streams.len() {
            return Err(MuxError::InvalidData(format!(
                "invalid stream index {}",
                index
            )));
        }

        if self.flags & FLAG_REEMIT_PAT_PMT != 0 {
            self.pat_cadence.force_next();
            self.sdt_cadence.force_next();
            self.nit_cadence.force_next();
            self.tot_cadence.force_next();
            self.eit_cadence.force_next();
            self.flags &= !FLAG_REEMIT_PAT_PMT;
        }

        let delay = self.config.max_delay_90k() * 2;
        let time_base = self.streams[index].config.time_base;
        let mut pts = packet.pts.map(|t| rescale_to_90k(t, time_base));
        let mut dts = packet.dts.map(|t| rescale_to_90k(t, time_base));
        if !self.copyts {
            pts = pts.map(|t| t + delay);
            dts = dts.map(|t| t + delay);
        }

        if self.streams[index].first_pts_check && pts.is_none() {
            error!("first pts value must be set");
            return Err(MuxError::InvalidData(
                "first pts value must be set".into(),
            ));
        }
        self.streams[index].first_pts_check = false;

        let codec = self.streams[index].config.codec;
        let mut buf: Bytes = packet.data.clone();
        let mut opus_samples = 0u32;

        match codec {
            CodecId::H264 => {
                let stream = &self.streams[index];
                if let Some(replaced) = h264::prepare_payload(
                    &packet.data,
                    packet.is_key,
                    stream.config.extradata.as_deref(),
                    stream.nb_frames,
                )? {
                    buf = replaced;
                }
            }
            CodecId::Hevc => {
                hevc::check_startcode(&packet.data, self.streams[index].nb_frames)?;
            }
            CodecId::Aac => {
                if packet.data.len() < 2 {
                    return Err(MuxError::InvalidData("AAC packet too short".into()));
                }
                if !aac::is_adts(&packet.data) {
                    match &self.streams[index].aac_framer {
                        Some(framer) => buf = framer.frame(&packet.data)?,
                        None => error!(
                            "AAC bitstream not in ADTS format and extradata missing"
                        ),
                    }
                }
            }
            CodecId::Opus => {
                let (framed, samples) = self.prepare_opus(index, packet)?;
                buf = framed;
                opus_samples = samples;
            }
            _ => {}
        }
        self.streams[index].nb_frames += 1;

        // drain other streams whose buffers have aged past half the delay
        if dts.is_some() {
            for j in 0..self.streams.len() {
                let due = {
                    let other = &self.streams[j];
                    !other.payload.is_empty()
                        && (other.payload_dts.is_none()
                            || matches!((dts, other.payload_dts), (Some(d), Some(p))
                                if d - p > delay / 2))
                };
                if due {
                    self.flush_stream(j, packet.forced_stream_id).await?;
                }
            }
        }

        let flush_own = {
            let stream = &self.streams[index];
            !stream.payload.is_empty()
                && (stream.payload.len() + buf.len() > self.config.pes_payload_size
                    || matches!((dts, stream.payload_dts), (Some(d), Some(p))
                        if d - p >= self.config.max_delay_90k())
                    || stream.opus_queued_samples + opus_samples >= 5760 /* 120ms */)
        };
        if flush_own {
            self.flush_stream(index, packet.forced_stream_id).await?;
        }

        if codec.kind() != MediaKind::Audio || buf.len() > self.config.pes_payload_size {
            // video and subtitle packets become a single PES each
            self.write_pes(index, &buf, pts, dts, packet.is_key, packet.forced_stream_id)
                .await?;
            self.streams[index].opus_queued_samples = 0;
            return Ok(());
        }

        let stream = &mut self.streams[index];
        if stream.payload.is_empty() {
            stream.payload_pts = pts;
            stream.payload_dts = dts;
            stream.payload_key = packet.is_key;
        }
        stream.payload.extend_from_slice(&buf);
        stream.opus_queued_samples += opus_samples;

        Ok(())
    }

    /// Drains every buffered audio payload as a final PES packet.
    async fn flush(&mut self) -> Result<()> {
        for index in 0..self.streams.len() {
            self.flush_stream(index, None).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_trailer(&mut self) -> Result<()> {
        self.flush().await
    }
}

/// Sets an adaptation-field flag, materialising an empty adaptation field
/// first when the packet has none.
fn set_af_flag(packet: &mut [u8; TS_PACKET_SIZE], flag: u8) {
    if packet[3] & 0x20 == 0 {
        packet[3] |= 0x20;
        packet[4] = 1; // one byte: just the flags
        packet[5] = 0;
    }
    packet[5] |= flag;
}

/// Extends the adaptation field length by `size` bytes.
fn extend_af(packet: &mut [u8; TS_PACKET_SIZE], size: u8) {
    debug_assert!(packet[3] & 0x20 != 0);
    packet[4] += size;
}

/// Offset of the payload area, after any adaptation field.
fn ts_payload_start(packet: &[u8; TS_PACKET_SIZE]) -> usize {
    if packet[3] & 0x20 != 0 {
        5 + packet[4] as usize
    } else {
        4
    }
}
