//! HEVC Annex-B validation.
//!
//! HEVC access units are carried as-is; the muxer only verifies that the
//! bitstream already uses Annex-B start codes.

use log::{error, warn};

use crate::error::{MuxError, Result};

/// Validates the Annex-B start code. Missing start codes are fatal on the
/// first frame and a warning afterwards.
pub fn check_startcode(data: &[u8], nb_frames: u64) -> Result<()> {
    let ok = data.len() >= 5
        && (u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == 0x0000_0001
            || (data[0] == 0 && data[1] == 0 && data[2] == 1));
    if !ok {
        if nb_frames == 0 {
            error!("HEVC bitstream malformed, no startcode found");
            return Err(MuxError::InvalidData(
                "HEVC bitstream is not in Annex-B format".into(),
            ));
        }
        warn!("HEVC bitstream error, startcode missing, size {}", data.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startcode_forms_accepted() {
        assert!(check_startcode(&[0x00, 0x00, 0x00, 0x01, 0x40, 0x01], 0).is_ok());
        assert!(check_startcode(&[0x00, 0x00, 0x01, 0x40, 0x01], 0).is_ok());
    }

    #[test]
    fn missing_startcode() {
        assert!(check_startcode(&[0x40, 0x01, 0x00, 0x00, 0x00], 0).is_err());
        assert!(check_startcode(&[0x40, 0x01, 0x00, 0x00, 0x00], 1).is_ok());
    }
}
