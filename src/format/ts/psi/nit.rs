//! Network information table with the ISDB-Tb descriptor set.

use bytes::{BufMut, BytesMut};

use crate::format::ts::config::TSConfig;
use crate::format::ts::section::{put_str8, DescScope, Len16Scope};
use crate::format::ts::service::Service;

/// Frequency field of the terrestrial delivery system descriptor, in
/// 1/7 MHz units for UHF channel `physical_channel`.
///
/// This reproduces the historically emitted integer arithmetic
/// `(473 + 6·(CH − 14) + 1/7) · 7`, whose `1/7` term truncates to zero.
/// The standard-intent value is one unit higher; receivers deployed
/// against the reference transmitter expect this one.
pub(crate) fn frequency_units(physical_channel: u16) -> u16 {
    (473 + 6 * (physical_channel - 14)) * 7
}

/// Builds the NIT payload: network descriptors, then one transport-stream
/// loop entry carrying the ISDB-Tb transport descriptors.
pub(crate) fn build(cfg: &TSConfig, services: &[Service]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);

    let network_descs = Len16Scope::open(&mut buf, 0xF000);

    // Network name descriptor
    buf.put_u8(0x40);
    put_str8(&mut buf, &cfg.network_name);

    // System management descriptor: broadcast flag '00' (open TV),
    // broadcast id '000011', additional id from field captures
    let desc = DescScope::open(&mut buf, 0xFE);
    buf.put_u8(0x03);
    buf.put_u8(0x01);
    desc.close(&mut buf);

    network_descs.close(&mut buf);

    let ts_loop = Len16Scope::open(&mut buf, 0xF000);
    buf.put_u16(cfg.transport_stream_id);
    buf.put_u16(cfg.original_network_id);
    let transport_descs = Len16Scope::open(&mut buf, 0xF000);

    // TS information descriptor
    let desc = DescScope::open(&mut buf, 0xCD);
    buf.put_u8(cfg.virtual_channel as u8); // remote control key id
    buf.put_u8((cfg.network_name.len() as u8) << 2 | 0x2);
    buf.put_slice(cfg.network_name.as_bytes());
    for service in services {
        // transmission type: 0x0F layer A (full-seg), 0xAF layer C (one-seg)
        buf.put_u8(if service.one_seg() { 0xAF } else { 0x0F });
        buf.put_u8(0x01); // services of this transmission type
        buf.put_u16(service.sid);
    }
    desc.close(&mut buf);

    // Service list descriptor
    let desc = DescScope::open(&mut buf, 0x41);
    for service in services {
        buf.put_u16(service.sid);
        buf.put_u8(0x01); // digital TV service
    }
    desc.close(&mut buf);

    // Partial reception descriptor, one per one-seg service
    for service in services {
        if service.partial_reception() {
            let desc = DescScope::open(&mut buf, 0xFB);
            buf.put_u16(service.sid);
            desc.close(&mut buf);
        }
    }

    // Terrestrial delivery system descriptor
    let desc = DescScope::open(&mut buf, 0xFA);
    buf.put_u16(
        cfg.area_code << 4 | (cfg.guard_interval as u16) << 2 | cfg.transmission_mode as u16,
    );
    buf.put_u16(frequency_units(cfg.physical_channel));
    desc.close(&mut buf);

    transport_descs.close(&mut buf);
    ts_loop.close(&mut buf);

    buf
}
