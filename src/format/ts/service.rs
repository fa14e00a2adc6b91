//! Service registry.
//!
//! Services live in a flat arena owned by the muxer; streams refer to
//! their service by index, never by reference. ISDB-Tb transmission
//! profiles synthesise the service ids from the original network id:
//! bits [15:5] carry the network id, bits [4:3] the service class
//! (0b00 full-seg TV, 0b11 one-seg) and bits [2:0] a sub-index.

use log::warn;

use super::config::TSConfig;
use super::section::SectionContext;

/// One broadcast service: identity, PMT carriage and PCR pacing state.
#[derive(Debug, Clone)]
pub struct Service {
    /// 16-bit service id
    pub sid: u16,
    /// Service name announced in SDT
    pub name: String,
    /// Provider name announced in SDT
    pub provider_name: String,
    /// PMT PID and continuity counter
    pub pmt: SectionContext,
    /// PID carrying this service's PCR; 0x1FFF until a stream adopts it
    pub pcr_pid: u16,
    /// Packets emitted on the PCR PID since the last PCR
    pub pcr_packet_count: i64,
    /// PCR emission period in packets
    pub pcr_packet_period: i64,
}

impl Service {
    fn new(cfg: &TSConfig, index: usize, sid: u16, name: &str) -> Self {
        let svc = Self {
            sid,
            name: name.to_string(),
            provider_name: cfg.provider_name.clone(),
            pmt: SectionContext::new(cfg.pmt_start_pid + index as u16),
            pcr_pid: 0x1FFF,
            pcr_packet_count: 0,
            pcr_packet_period: 0,
        };
        if svc.one_seg() != svc.one_seg_legacy() {
            warn!(
                "service 0x{:04X}: the legacy one-seg detector (sid & 3) would \
                 report {}, signalling follows the service-class bit ({})",
                sid,
                svc.one_seg_legacy(),
                svc.one_seg()
            );
        }
        svc
    }

    /// One-seg test on the service-class bit of the sid, used by the SDT
    /// service descriptor, the NIT transmission-type records and the EIT
    /// descriptor sets.
    pub fn one_seg(&self) -> bool {
        self.sid & 0x08 != 0
    }

    /// Strict partial-reception test on both service-class bits, used by
    /// the NIT partial-reception descriptor loop.
    pub fn partial_reception(&self) -> bool {
        (self.sid & 0x18) >> 3 == 0x3
    }

    /// The one-seg detector historically shipped by reference
    /// transmitters (`sid & 3`, an operator-precedence accident). Kept so
    /// mismatches against the class-bit detector can be reported.
    pub fn one_seg_legacy(&self) -> bool {
        self.sid & (0x18 >> 3) != 0
    }
}

/// Synthesises a service id from the network id, service class and
/// sub-index.
fn isdb_sid(onid: u16, class: u16, index: u16) -> u16 {
    (onid & 0x7FF) << 5 | class << 3 | index
}

/// Builds the service arena for the configured transmission profile.
pub fn build_services(cfg: &TSConfig) -> Vec<Service> {
    let onid = cfg.original_network_id;
    let mut services = Vec::new();
    let mut push = |services: &mut Vec<Service>, sid: u16, name: &str| {
        let index = services.len();
        services.push(Service::new(cfg, index, sid, name));
    };

    match cfg.transmission_profile {
        // One FHD service and one one-seg service
        1 => {
            push(&mut services, isdb_sid(onid, 0x0, 0x0), "SVC HD Full Seg");
            push(&mut services, isdb_sid(onid, 0x3, 0x1), "SVC LD 1-Seg");
        }
        // Four SD services and one one-seg service
        2 => {
            push(&mut services, isdb_sid(onid, 0x0, 0x0), "SVC SD - 1");
            push(&mut services, isdb_sid(onid, 0x0, 0x1), "SVC SD - 2");
            push(&mut services, isdb_sid(onid, 0x0, 0x2), "SVC SD - 3");
            push(&mut services, isdb_sid(onid, 0x0, 0x3), "SVC SD - 4");
            push(&mut services, isdb_sid(onid, 0x3, 0x4), "SVC LD 1-Seg");
        }
        // Two HD services and one one-seg service
        3 => {
            push(&mut services, isdb_sid(onid, 0x0, 0x0), "SVC HD - 1");
            push(&mut services, isdb_sid(onid, 0x0, 0x1), "SVC HD - 2");
            push(&mut services, isdb_sid(onid, 0x3, 0x4), "SVC LD 1-Seg");
        }
        _ => {
            let name = cfg.service_name.clone();
            push(&mut services, cfg.service_id, &name);
        }
    }

    services
}
