//! Service description table.

use bytes::{BufMut, BytesMut};

use crate::format::ts::config::TSConfig;
use crate::format::ts::section::{put_str8, DescScope, Len16Scope};
use crate::format::ts::service::Service;
use crate::format::ts::types::{SERVICE_TYPE_DIGITAL_TV, SERVICE_TYPE_ONE_SEG};

/// Builds the SDT payload: the originating network id followed by one
/// service loop entry per service, each carrying a service descriptor.
pub(crate) fn build(cfg: &TSConfig, services: &[Service]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u16(cfg.original_network_id);
    buf.put_u8(0xFF);

    for service in services {
        buf.put_u16(service.sid);
        // reserved + EIT_schedule_flag 0 + EIT_present_following_flag 0
        buf.put_u8(0xFC);
        // running_status = 4 (running), free_CA_mode = 0
        let desc_list = Len16Scope::open(&mut buf, 4 << 13);

        let desc = DescScope::open(&mut buf, 0x48);
        buf.put_u8(if service.one_seg() {
            SERVICE_TYPE_ONE_SEG
        } else {
            SERVICE_TYPE_DIGITAL_TV
        });
        put_str8(&mut buf, &service.provider_name);
        put_str8(&mut buf, &service.name);
        desc.close(&mut buf);

        desc_list.close(&mut buf);
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::service::build_services;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_service_entry() {
        let cfg = TSConfig::default();
        let services = build_services(&cfg);
        let payload = build(&cfg, &services);

        assert_eq!(&payload[..3], &[0x00, 0x01, 0xFF]);
        // sid, EIT flags byte
        assert_eq!(&payload[3..6], &[0x00, 0x01, 0xFC]);
        // running_status 4, free_CA 0
        assert_eq!(payload[6] >> 5, 4);
        // service descriptor with digital TV type
        assert_eq!(payload[8], 0x48);
        assert_eq!(payload[10], SERVICE_TYPE_DIGITAL_TV);
        let provider_len = payload[11] as usize;
        assert_eq!(&payload[12..12 + provider_len], b"isdbmux");
        let name_at = 12 + provider_len;
        let name_len = payload[name_at] as usize;
        assert_eq!(&payload[name_at + 1..name_at + 1 + name_len], b"Service01");
    }

    #[test]
    fn one_seg_service_type() {
        let cfg = TSConfig {
            transmission_profile: 1,
            original_network_id: 0x0640,
            ..Default::default()
        };
        let services = build_services(&cfg);
        let payload = build(&cfg, &services);

        // walk the two service entries
        let mut at = 3;
        let mut types = Vec::new();
        for _ in 0..2 {
            let loop_len = (((payload[at + 3] & 0x0F) as usize) << 8) | payload[at + 4] as usize;
            types.push(payload[at + 7]);
            at += 5 + loop_len;
        }
        assert_eq!(types, vec![SERVICE_TYPE_DIGITAL_TV, SERVICE_TYPE_ONE_SEG]);
    }
}
