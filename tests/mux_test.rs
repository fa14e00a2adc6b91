//! End-to-end multiplexer tests: drive the facade with synthetic
//! elementary streams and re-parse the emitted transport stream.

use std::collections::HashMap;
use std::io::Cursor;

use crc::{Crc, CRC_32_MPEG_2};
use isdbmux::av::{CodecId, Packet, StreamConfig};
use isdbmux::format::ts::{TSConfig, TSMuxer, TS_PACKET_SIZE};
use isdbmux::format::Muxer;
use pretty_assertions::assert_eq;
use tokio::runtime::Runtime;

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

const H264_EXTRADATA: &[u8] = &[
    0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1F, 0xE9, 0x01, 0x40, 0x7B,
];
// AAC-LC, 44.1 kHz, stereo AudioSpecificConfig
const AAC_EXTRADATA: &[u8] = &[0x12, 0x10];

fn idr_frame() -> Vec<u8> {
    let mut frame = vec![0x00, 0x00, 0x00, 0x01, 0x65];
    frame.extend_from_slice(&[0x88; 64]);
    frame
}

fn non_idr_frame() -> Vec<u8> {
    let mut frame = vec![0x00, 0x00, 0x00, 0x01, 0x41];
    frame.extend_from_slice(&[0x9A; 48]);
    frame
}

fn mux<F>(config: TSConfig, streams: Vec<StreamConfig>, feed: F) -> Vec<u8>
where
    F: FnOnce(&mut TSMuxer<Cursor<Vec<u8>>>) -> Vec<Packet>,
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut muxer = TSMuxer::new(Cursor::new(Vec::new()), config);
        muxer.write_header(&streams).await.unwrap();
        let packets = feed(&mut muxer);
        for packet in &packets {
            muxer.write_packet(packet).await.unwrap();
        }
        muxer.write_trailer().await.unwrap();
        muxer.into_inner().into_inner()
    })
}

fn ts_packets(data: &[u8]) -> Vec<&[u8]> {
    assert_eq!(data.len() % TS_PACKET_SIZE, 0, "not a whole packet count");
    data.chunks(TS_PACKET_SIZE).collect()
}

fn pid_of(packet: &[u8]) -> u16 {
    (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2])
}

fn has_pusi(packet: &[u8]) -> bool {
    packet[1] & 0x40 != 0
}

fn payload_of(packet: &[u8]) -> &[u8] {
    if packet[3] & 0x20 != 0 {
        &packet[5 + packet[4] as usize..]
    } else {
        &packet[4..]
    }
}

/// Reassembles the `n`-th section carried on `pid`.
fn section_on_pid(data: &[u8], pid: u16, n: usize) -> Vec<u8> {
    let packets = ts_packets(data);
    let mut seen = 0usize;
    for (i, packet) in packets.iter().enumerate() {
        if pid_of(packet) != pid || !has_pusi(packet) {
            continue;
        }
        if seen < n {
            seen += 1;
            continue;
        }
        let payload = payload_of(packet);
        let pointer = payload[0] as usize;
        let mut section = payload[1 + pointer..].to_vec();
        let total = 3 + ((usize::from(section[1] & 0x0F) << 8) | usize::from(section[2]));
        for cont in packets.iter().skip(i + 1) {
            if section.len() >= total {
                break;
            }
            if pid_of(cont) == pid && !has_pusi(cont) {
                section.extend_from_slice(payload_of(cont));
            }
        }
        section.truncate(total);
        return section;
    }
    panic!("no section {} found on pid 0x{:04X}", n, pid);
}

/// First PES header + payload start on `pid`: returns the bytes of the
/// first transport packet from the PES header onwards.
fn first_pes(data: &[u8], pid: u16) -> Vec<u8> {
    for packet in ts_packets(data) {
        if pid_of(packet) == pid && has_pusi(packet) {
            return payload_of(packet).to_vec();
        }
    }
    panic!("no PES found on pid 0x{:04X}", pid);
}

fn pes_payload(pes: &[u8]) -> &[u8] {
    assert_eq!(&pes[..3], &[0x00, 0x00, 0x01]);
    let header_data_len = pes[8] as usize;
    &pes[9 + header_data_len..]
}

fn assert_universal_invariants(data: &[u8]) {
    let mut counters: HashMap<u16, u8> = HashMap::new();

    for packet in ts_packets(data) {
        assert_eq!(packet[0], 0x47, "sync byte");
        let pid = pid_of(packet);
        let afc = (packet[3] >> 4) & 0x3;
        let cc = packet[3] & 0x0F;

        // continuity advances only on packets that carry payload
        if afc == 0b01 || afc == 0b11 {
            if pid != 0x1FFF {
                if let Some(prev) = counters.get(&pid) {
                    assert_eq!(cc, (prev + 1) & 0x0F, "continuity on pid 0x{:04X}", pid);
                }
                counters.insert(pid, cc);
            }
        }
    }

    // every SI section's trailing CRC verifies
    for pid in [0x0000u16, 0x0010, 0x0011, 0x0012, 0x0014] {
        if ts_packets(data)
            .iter()
            .any(|p| pid_of(p) == pid && has_pusi(p))
        {
            let section = section_on_pid(data, pid, 0);
            let body = &section[..section.len() - 4];
            let stored = u32::from_be_bytes(section[section.len() - 4..].try_into().unwrap());
            assert_eq!(CRC_MPEG.checksum(body), stored, "crc on pid 0x{:04X}", pid);
        }
    }
}

#[test]
fn s1_default_profile_h264_aac() {
    let streams = vec![
        StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA),
        StreamConfig::new(CodecId::Aac)
            .with_extradata(AAC_EXTRADATA)
            .with_audio_params(44_100, 2, 1024),
    ];
    let data = mux(TSConfig::default(), streams, |_| {
        vec![
            Packet::new(idr_frame())
                .with_stream_index(0)
                .with_pts(0)
                .with_dts(0)
                .with_key_flag(true),
            Packet::new(vec![0x21; 128])
                .with_stream_index(1)
                .with_pts(0)
                .with_dts(0),
            Packet::new(non_idr_frame())
                .with_stream_index(0)
                .with_pts(3600)
                .with_dts(3600),
        ]
    });

    assert_universal_invariants(&data);

    // PAT: sid 1 -> PMT 0x1000
    let pat = section_on_pid(&data, 0x0000, 0);
    assert_eq!(pat[0], 0x00);
    assert_eq!(&pat[3..5], &[0x00, 0x01]); // TSID
    assert_eq!(&pat[8..12], &[0x00, 0x01, 0xF0, 0x00]);

    // PMT on 0x1000: H.264 on 0x0100 (the PCR PID), AAC on 0x0101
    let pmt = section_on_pid(&data, 0x1000, 0);
    assert_eq!(pmt[0], 0x02);
    assert_eq!(&pmt[3..5], &[0x00, 0x01]); // sid
    let pcr_pid = (u16::from(pmt[8] & 0x1F) << 8) | u16::from(pmt[9]);
    assert_eq!(pcr_pid, 0x0100);
    let program_info_len = ((usize::from(pmt[10] & 0x0F)) << 8) | usize::from(pmt[11]);
    let mut at = 12 + program_info_len;
    let mut es = Vec::new();
    while at + 5 <= pmt.len() - 4 {
        let stream_type = pmt[at];
        let pid = (u16::from(pmt[at + 1] & 0x1F) << 8) | u16::from(pmt[at + 2]);
        let info_len = ((usize::from(pmt[at + 3] & 0x0F)) << 8) | usize::from(pmt[at + 4]);
        es.push((stream_type, pid));
        at += 5 + info_len;
    }
    assert_eq!(es, vec![(0x1B, 0x0100), (0x0F, 0x0101)]);

    // SDT advertises a digital TV service named Service01
    let sdt = section_on_pid(&data, 0x0011, 0);
    assert_eq!(sdt[0], 0x42);
    assert_eq!(&sdt[11..14], &[0x00, 0x01, 0xFC]); // sid + EIT flags
    assert_eq!(sdt[16], 0x48); // service descriptor
    assert_eq!(sdt[18], 0x01); // service_type digital TV
    let provider_len = usize::from(sdt[19]);
    let name_at = 20 + provider_len;
    let name_len = usize::from(sdt[name_at]);
    assert_eq!(&sdt[name_at + 1..name_at + 1 + name_len], b"Service01");

    // S6: the keyframe PES payload gains AUD then extradata then the IDR
    let pes = first_pes(&data, 0x0100);
    let payload = pes_payload(&pes);
    assert_eq!(&payload[..6], &[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0]);
    assert_eq!(&payload[6..6 + H264_EXTRADATA.len()], H264_EXTRADATA);
    assert_eq!(
        &payload[6 + H264_EXTRADATA.len()..6 + H264_EXTRADATA.len() + 5],
        &[0x00, 0x00, 0x00, 0x01, 0x65]
    );

    // the AAC payload was re-framed with an ADTS header
    let audio_pes = first_pes(&data, 0x0101);
    let audio = pes_payload(&audio_pes);
    assert_eq!(u16::from_be_bytes([audio[0], audio[1]]) & 0xFFF0, 0xFFF0);
}

#[test]
fn s2_isdb_profile_1() {
    let config = TSConfig {
        transmission_profile: 1,
        original_network_id: 0x0640,
        ..Default::default()
    };
    let streams = vec![
        StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA),
        StreamConfig::new(CodecId::Aac)
            .with_extradata(AAC_EXTRADATA)
            .with_audio_params(44_100, 2, 1024),
    ];
    let data = mux(config, streams, |_| {
        vec![Packet::new(idr_frame())
            .with_stream_index(0)
            .with_pts(0)
            .with_dts(0)
            .with_key_flag(true)]
    });

    assert_universal_invariants(&data);

    // PAT lists both synthesised services
    let pat = section_on_pid(&data, 0x0000, 0);
    assert_eq!(&pat[8..10], &[0xC8, 0x00]);
    assert_eq!(&pat[12..14], &[0xC8, 0x19]);

    // SDT: full-seg then one-seg service type
    let sdt = section_on_pid(&data, 0x0011, 0);
    let mut at = 11;
    let mut types = Vec::new();
    for _ in 0..2 {
        let sid = u16::from_be_bytes([sdt[at], sdt[at + 1]]);
        let loop_len = ((usize::from(sdt[at + 3] & 0x0F)) << 8) | usize::from(sdt[at + 4]);
        types.push((sid, sdt[at + 7]));
        at += 5 + loop_len;
    }
    assert_eq!(types, vec![(0xC800, 0x01), (0xC819, 0xC0)]);

    // NIT: exactly one partial-reception descriptor, for the one-seg sid
    let nit = section_on_pid(&data, 0x0010, 0);
    let mut partial = Vec::new();
    let mut i = 0;
    while i + 3 < nit.len() {
        if nit[i] == 0xFB && nit[i + 1] == 0x02 {
            partial.push(u16::from_be_bytes([nit[i + 2], nit[i + 3]]));
        }
        i += 1;
    }
    assert_eq!(partial, vec![0xC819]);
}

#[test]
fn s3_resend_headers_reemits_every_table() {
    let rt = Runtime::new().unwrap();
    let data = rt.block_on(async {
        let mut muxer = TSMuxer::new(Cursor::new(Vec::new()), TSConfig::default());
        let streams = vec![StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA)];
        muxer.write_header(&streams).await.unwrap();

        let p1 = Packet::new(idr_frame())
            .with_stream_index(0)
            .with_pts(0)
            .with_dts(0)
            .with_key_flag(true);
        let p2 = Packet::new(non_idr_frame())
            .with_stream_index(0)
            .with_pts(3600)
            .with_dts(3600);
        let p3 = Packet::new(non_idr_frame())
            .with_stream_index(0)
            .with_pts(7200)
            .with_dts(7200);

        muxer.write_packet(&p1).await.unwrap();
        muxer.write_packet(&p2).await.unwrap();
        muxer.resend_headers();
        muxer.write_packet(&p3).await.unwrap();
        muxer.write_trailer().await.unwrap();
        muxer.into_inner().into_inner()
    });

    assert_universal_invariants(&data);

    let count = |pid: u16| {
        ts_packets(&data)
            .iter()
            .filter(|p| pid_of(p) == pid && has_pusi(p))
            .count()
    };
    // startup emission plus the forced one, for every table
    assert_eq!(count(0x0000), 2, "PAT");
    assert_eq!(count(0x1000), 2, "PMT");
    assert_eq!(count(0x0011), 2, "SDT");
    assert_eq!(count(0x0010), 2, "NIT");
    assert_eq!(count(0x0014), 2, "TOT");
    assert_eq!(count(0x0012), 2, "EIT");
}

#[test]
fn s4_forced_pat_on_keyframe() {
    let config = TSConfig {
        flags: isdbmux::format::ts::config::FLAG_PAT_PMT_AT_FRAMES,
        ..Default::default()
    };
    let streams = vec![StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA)];
    let data = mux(config, streams, |_| {
        vec![
            Packet::new(non_idr_frame())
                .with_stream_index(0)
                .with_pts(0)
                .with_dts(0),
            Packet::new(idr_frame())
                .with_stream_index(0)
                .with_pts(3600)
                .with_dts(3600)
                .with_key_flag(true),
        ]
    });

    assert_universal_invariants(&data);

    // a PAT and a PMT sit between the two video PES packets
    let packets = ts_packets(&data);
    let pes_starts: Vec<usize> = packets
        .iter()
        .enumerate()
        .filter(|(_, p)| pid_of(p) == 0x0100 && has_pusi(p))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(pes_starts.len(), 2);
    let between: Vec<u16> = packets[pes_starts[0]..pes_starts[1]]
        .iter()
        .filter(|p| has_pusi(p))
        .map(|p| pid_of(p))
        .collect();
    assert!(between.contains(&0x0000), "PAT between frames: {:?}", between);
    assert!(between.contains(&0x1000), "PMT between frames: {:?}", between);
}

#[test]
fn s5_opus_pending_trim_start() {
    let streams = vec![StreamConfig::new(CodecId::Opus)
        .with_audio_params(48_000, 2, 960)
        .with_initial_padding(312)];
    // CELT 20 ms mono-config packet: 960 samples, enough to absorb the trim
    let mut opus_packet = vec![19 << 3];
    opus_packet.extend_from_slice(&[0x55; 32]);

    let data = mux(TSConfig::default(), streams, |_| {
        vec![
            Packet::new(opus_packet.clone())
                .with_stream_index(0)
                .with_pts(0)
                .with_dts(0),
            Packet::new(opus_packet.clone())
                .with_stream_index(0)
                .with_pts(960)
                .with_dts(960),
        ]
    });

    assert_universal_invariants(&data);

    let pes = first_pes(&data, 0x0100);
    let payload = pes_payload(&pes);
    // control header: trim_start flag, one length byte, then 312 big-endian
    assert_eq!(payload[0], 0x7F);
    assert_eq!(payload[1], 0xE0 | 0x10);
    assert_eq!(payload[2], 33);
    assert_eq!(&payload[3..5], &[0x01, 0x38]);
    // the second packet in the same PES carries no trim flag: the pending
    // trim was fully consumed
    let second_at = 5 + 33;
    assert_eq!(payload[second_at], 0x7F);
    assert_eq!(payload[second_at + 1], 0xE0);
}

#[test]
fn dvb_subtitle_pes_framing() {
    let streams = vec![StreamConfig::new(CodecId::DvbSubtitle).with_language("por")];
    let data = mux(TSConfig::default(), streams, |_| {
        vec![Packet::new(vec![0x0F; 40])
            .with_stream_index(0)
            .with_pts(0)
            .with_dts(0)]
    });

    let pes = first_pes(&data, 0x0100);
    assert_eq!(pes[3], 0xBD); // private stream 1
    assert_eq!(pes[6], 0x84); // marker + data alignment
    let payload = pes_payload(&pes);
    assert_eq!(&payload[..2], &[0x20, 0x00]);
    // subtitle PES ends with the end_of_PES_data_field_marker
    let sub_packets: Vec<&[u8]> = ts_packets(&data)
        .into_iter()
        .filter(|p| pid_of(p) == 0x0100)
        .collect();
    let last = sub_packets.last().unwrap();
    assert_eq!(last[TS_PACKET_SIZE - 1], 0xFF);
}

#[test]
fn cbr_output_paces_to_mux_rate() {
    let config = TSConfig {
        mux_rate: 1_000_000,
        ..Default::default()
    };
    let streams = vec![StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA)];
    let data = mux(config, streams, |_| {
        (0..40)
            .map(|i| {
                let mut frame = non_idr_frame();
                frame.extend_from_slice(&[0x33; 400]);
                Packet::new(frame)
                    .with_stream_index(0)
                    .with_pts(i * 3600)
                    .with_dts(i * 3600)
            })
            .collect()
    });

    assert_universal_invariants(&data);

    // null packets pad the stream up to the mux rate
    assert!(
        ts_packets(&data).iter().any(|p| pid_of(p) == 0x1FFF),
        "expected null padding packets at CBR"
    );

    // PCR values on the PCR PID are strictly monotonic and reflect the
    // byte position at the configured rate
    let mut pcrs = Vec::new();
    let mut offset = 0usize;
    for packet in ts_packets(&data) {
        if pid_of(packet) == 0x0100 && packet[3] & 0x20 != 0 && packet[4] >= 7 && packet[5] & 0x10 != 0
        {
            let base = (u64::from(packet[6]) << 25)
                | (u64::from(packet[7]) << 17)
                | (u64::from(packet[8]) << 9)
                | (u64::from(packet[9]) << 1)
                | u64::from(packet[10] >> 7);
            let ext = (u64::from(packet[10] & 0x01) << 8) | u64::from(packet[11]);
            pcrs.push((offset, base * 300 + ext));
        }
        offset += TS_PACKET_SIZE;
    }
    assert!(pcrs.len() >= 2, "need PCRs to measure, got {}", pcrs.len());
    for pair in pcrs.windows(2) {
        assert!(pair[1].1 > pair[0].1, "PCR must be strictly monotonic");
    }
    let (first, last) = (pcrs[0], pcrs[pcrs.len() - 1]);
    let measured =
        (last.0 - first.0) as f64 * 8.0 * 27_000_000.0 / (last.1 - first.1) as f64;
    let err = (measured - 1_000_000.0).abs() / 1_000_000.0;
    assert!(err < 0.01, "measured rate {measured} off by {err}");
}

#[test]
fn m2ts_mode_prefixes_every_packet() {
    let config = TSConfig {
        m2ts_mode: Some(true),
        ..Default::default()
    };
    let streams = vec![StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA)];
    let rt = Runtime::new().unwrap();
    let data = rt.block_on(async {
        let mut muxer = TSMuxer::new(Cursor::new(Vec::new()), config);
        muxer.write_header(&streams).await.unwrap();
        muxer
            .write_packet(
                &Packet::new(idr_frame())
                    .with_stream_index(0)
                    .with_pts(0)
                    .with_dts(0)
                    .with_key_flag(true),
            )
            .await
            .unwrap();
        muxer.write_trailer().await.unwrap();
        muxer.into_inner().into_inner()
    });

    assert_eq!(data.len() % 192, 0);
    for packet in data.chunks(192) {
        assert_eq!(packet[4], 0x47, "sync byte after tp_extra_header");
    }
}

#[test]
fn duplicate_pids_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut muxer = TSMuxer::new(Cursor::new(Vec::new()), TSConfig::default());
        let streams = vec![
            StreamConfig::new(CodecId::H264).with_stream_id(0x0100),
            StreamConfig::new(CodecId::Aac).with_stream_id(0x0100),
        ];
        assert!(muxer.write_header(&streams).await.is_err());

        let mut muxer = TSMuxer::new(Cursor::new(Vec::new()), TSConfig::default());
        let streams = vec![StreamConfig::new(CodecId::H264).with_stream_id(0x1FFF)];
        assert!(muxer.write_header(&streams).await.is_err());
    });
}

#[test]
fn first_packet_requires_pts() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut muxer = TSMuxer::new(Cursor::new(Vec::new()), TSConfig::default());
        let streams = vec![StreamConfig::new(CodecId::H264).with_extradata(H264_EXTRADATA)];
        muxer.write_header(&streams).await.unwrap();
        let packet = Packet::new(idr_frame()).with_stream_index(0).with_key_flag(true);
        assert!(muxer.write_packet(&packet).await.is_err());
    });
}
