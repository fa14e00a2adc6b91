//! Event information table (present/following, actual TS).

use bytes::{BufMut, BytesMut};

use crate::format::ts::config::TSConfig;
use crate::format::ts::section::{DescScope, Len16Scope, Len8Scope};
use crate::format::ts::service::Service;
use crate::format::ts::types::TID_EIT;

use super::{bcd_duration, mjd_utc_bytes, table_time};

/// Builds the EIT payload: transport/network identity, then one event per
/// service. One-seg services carry the short-event and parental-rating
/// descriptors; full-seg services additionally advertise component,
/// audio-component and content descriptors.
pub(crate) fn build(cfg: &TSConfig, services: &[Service]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(512);
    let start = mjd_utc_bytes(table_time(cfg));
    let duration = bcd_duration(cfg.event_duration_secs);

    buf.put_u16(cfg.transport_stream_id);
    buf.put_u16(cfg.original_network_id);
    buf.put_u8(0); // segment_last_section_number
    buf.put_u8(TID_EIT); // last_table_id

    for service in services {
        buf.put_u16(service.sid);
        buf.put_slice(&start);
        buf.put_slice(&duration);
        // running_status = 4 (running), free_CA_mode = 0
        let desc_list = Len16Scope::open(&mut buf, 4 << 13);

        write_short_event(cfg, &mut buf);
        write_parental_rating(cfg, &mut buf);

        if !service.one_seg() {
            write_component(&mut buf);
            write_audio_component(&mut buf);
            write_content(&mut buf);
        }

        desc_list.close(&mut buf);
    }

    buf
}

fn write_short_event(cfg: &TSConfig, buf: &mut BytesMut) {
    let desc = DescScope::open(buf, 0x4D);
    buf.put_slice(b"por");
    let name_len = Len8Scope::open(buf);
    buf.put_slice(cfg.event_name.as_bytes());
    name_len.close(buf);
    let text_len = Len8Scope::open(buf);
    buf.put_slice(cfg.event_text.as_bytes());
    text_len.close(buf);
    desc.close(buf);
}

fn write_parental_rating(cfg: &TSConfig, buf: &mut BytesMut) {
    let desc = DescScope::open(buf, 0x55);
    buf.put_slice(cfg.country_code.as_bytes());
    buf.put_u8(cfg.parental_rating);
    desc.close(buf);
}

fn write_component(buf: &mut BytesMut) {
    let desc = DescScope::open(buf, 0x50);
    buf.put_u8(0x05); // stream_content: video
    buf.put_u8(0xB3); // component_type: 1080i 16:9
    buf.put_u8(0x00); // component_tag
    buf.put_slice(b"por");
    buf.put_slice(b"Video");
    desc.close(buf);
}

fn write_audio_component(buf: &mut BytesMut) {
    let desc = DescScope::open(buf, 0xC4);
    buf.put_u8(0x06); // stream_content
    buf.put_u8(0x03); // component_type: stereo
    buf.put_u8(0x10); // component_tag
    buf.put_u8(0x53); // stream_type: ISO/IEC 14496-3 audio
    buf.put_u8(0xFF); // simulcast_group_tag
    buf.put_u8(0); // ES_multi_lingual_flag
    buf.put_u8(1); // main_component_flag
    buf.put_u8(1); // quality_indicator
    buf.put_u8(0x2F); // sampling_rate / reserved
    buf.put_slice(b"por");
    buf.put_slice(b"Audio");
    desc.close(buf);
}

fn write_content(buf: &mut BytesMut) {
    let desc = DescScope::open(buf, 0x54);
    buf.put_u8(0x02); // content_nibble
    buf.put_u8(0xEE); // user_byte
    desc.close(buf);
}
