//! Program association table.

use bytes::{BufMut, BytesMut};

use crate::format::ts::service::Service;

/// Builds the PAT payload: one `{service_id, PMT PID}` entry per service.
pub(crate) fn build(services: &[Service]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(services.len() * 4);
    for service in services {
        buf.put_u16(service.sid);
        buf.put_u16(0xE000 | service.pmt.pid);
    }
    buf
}
