//! Program map table, including the per-stream descriptor loops.

use bytes::{BufMut, BytesMut};
use log::error;

use crate::av::{CodecId, MediaKind};
use crate::codec::opus;
use crate::format::ts::config::{TSConfig, FLAG_SYSTEM_B};
use crate::format::ts::section::{DescScope, Len16Scope};
use crate::format::ts::service::Service;
use crate::format::ts::types::{stream_type_for, SECTION_LENGTH};

use super::EsInfo;

/// Builds the PMT payload for one service.
///
/// The PMT must fit a single section. When a stream entry would overflow
/// it, the entry and everything after it are dropped from the table (their
/// PES is still muxed) and a diagnostic names the offending stream.
pub(crate) fn build(cfg: &TSConfig, service: &Service, streams: &[EsInfo]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);
    let mut err = None;

    buf.put_u16(0xE000 | service.pcr_pid);

    let program_info = Len16Scope::open(&mut buf, 0xF000);
    // Parental rating descriptor, mandatory for ISDB-Tb program loops
    let desc = DescScope::open(&mut buf, 0x55);
    buf.put_slice(cfg.country_code.as_bytes());
    buf.put_u8(cfg.parental_rating);
    desc.close(&mut buf);
    program_info.close(&mut buf);

    for es in streams {
        if buf.len() > SECTION_LENGTH - 32 {
            err = Some(es.stream_index);
            break;
        }

        buf.put_u8(stream_type_for(es.config.codec, cfg.flags));
        buf.put_u16(0xE000 | es.pid);
        let es_info = Len16Scope::open(&mut buf, 0xF000);

        let mut overflow = false;
        match es.config.codec.kind() {
            MediaKind::Audio => {
                if write_audio_descriptors(cfg, &mut buf, es).is_err() {
                    err = Some(es.stream_index);
                    overflow = true;
                }
            }
            MediaKind::Subtitle => write_subtitle_descriptors(&mut buf, es),
            MediaKind::Video => write_video_descriptors(&mut buf, es),
            MediaKind::Data => {
                if es.config.codec == CodecId::SmpteKlv {
                    registration(&mut buf, b"KLVA");
                }
            }
        }

        es_info.close(&mut buf);
        if overflow {
            break;
        }
    }

    if let Some(index) = err {
        error!(
            "The PMT section cannot fit stream {} and all following streams. \
             Try reducing the number of languages in the audio streams or the \
             total number of streams.",
            index
        );
    }

    buf
}

fn registration(buf: &mut BytesMut, fourcc: &[u8; 4]) {
    buf.put_u8(0x05);
    buf.put_u8(4);
    buf.put_slice(fourcc);
}

fn write_audio_descriptors(cfg: &TSConfig, buf: &mut BytesMut, es: &EsInfo) -> Result<(), ()> {
    let system_b = cfg.flags & FLAG_SYSTEM_B != 0;

    match es.config.codec {
        // AC-3 / E-AC-3 descriptors per A038 DVB SI, all fields omitted
        CodecId::Ac3 if system_b => {
            buf.put_slice(&[0x6A, 0x01, 0x00]);
        }
        CodecId::Eac3 if system_b => {
            buf.put_slice(&[0x7A, 0x01, 0x00]);
        }
        CodecId::S302m => registration(buf, b"BSSD"),
        CodecId::Opus => {
            // 6 bytes registration descriptor, 4 bytes Opus audio descriptor
            if buf.len() > SECTION_LENGTH - 6 - 4 {
                return Err(());
            }
            registration(buf, b"Opus");
            buf.put_u8(0x7F); // DVB extension descriptor
            buf.put_u8(2);
            buf.put_u8(0x80);
            buf.put_u8(opus::channel_mapping_byte(
                es.config.extradata.as_deref(),
                es.config.channels,
            ));
        }
        _ => {}
    }

    if let Some(lang) = &es.config.language {
        let desc_start = buf.len();
        buf.put_u8(0x0A); // ISO 639 language descriptor
        let len_at = buf.len();
        buf.put_u8(0);
        let mut written: usize = 0;
        let mut overflow = false;

        for code in lang.split(',') {
            if written >= 255 / 4 * 4 {
                break;
            }
            if buf.len() > SECTION_LENGTH - 4 {
                overflow = true;
                break;
            }
            if code.len() != 3 {
                continue;
            }
            buf.put_slice(code.as_bytes());
            let audio_type = if es.config.disposition.clean_effects {
                0x01
            } else if es.config.disposition.hearing_impaired {
                0x02
            } else if es.config.disposition.visual_impaired {
                0x03
            } else {
                0x00
            };
            buf.put_u8(audio_type);
            written += 4;
        }

        if written == 0 {
            buf.truncate(desc_start);
        } else {
            buf[len_at] = written as u8;
        }
        if overflow {
            return Err(());
        }
    }

    Ok(())
}

fn write_subtitle_descriptors(buf: &mut BytesMut, es: &EsInfo) {
    let language = es
        .config
        .language
        .as_deref()
        .filter(|l| l.len() >= 3)
        .unwrap_or("und");
    let extradata = es.config.extradata.as_deref().unwrap_or(&[]);

    match es.config.codec {
        CodecId::DvbSubtitle => {
            let desc = DescScope::open(buf, 0x59);
            let mut extradata_copied = 0;

            for code in language.split(',') {
                if code.len() < 3 {
                    continue;
                }
                buf.put_slice(&code.as_bytes()[..3]);

                if extradata.len() - extradata_copied >= 5 {
                    // subtitling_type then composition/ancillary page ids
                    buf.put_u8(extradata[extradata_copied + 4]);
                    buf.put_slice(&extradata[extradata_copied..extradata_copied + 4]);
                    extradata_copied += 5;
                } else {
                    // 0x10: normal, 0x20: for the hard of hearing; both with
                    // no monitor aspect ratio criticality
                    buf.put_u8(if es.config.disposition.hearing_impaired {
                        0x20
                    } else {
                        0x10
                    });
                    if extradata.len() == 4 && extradata_copied == 0 {
                        // old 4-byte extradata layout
                        buf.put_slice(extradata);
                        extradata_copied += 4;
                    } else {
                        buf.put_u16(1); // composition_page_id
                        buf.put_u16(1); // ancillary_page_id
                    }
                }
            }
            desc.close(buf);
        }
        CodecId::DvbTeletext => {
            let desc = DescScope::open(buf, 0x56);
            let mut extradata_copied = 0;

            for code in language.split(',') {
                if code.len() < 3 {
                    continue;
                }
                buf.put_slice(&code.as_bytes()[..3]);

                if extradata.len() > extradata_copied + 1 {
                    buf.put_slice(&extradata[extradata_copied..extradata_copied + 2]);
                    extradata_copied += 2;
                } else {
                    // teletext_type 0x01 (initial page), magazine 0, page 0x00
                    buf.put_u8(0x08);
                    buf.put_u8(0x00);
                }
            }
            desc.close(buf);
        }
        _ => {}
    }
}

fn write_video_descriptors(buf: &mut BytesMut, es: &EsInfo) {
    match es.config.codec {
        CodecId::Dirac => registration(buf, b"drac"),
        CodecId::Vc1 => registration(buf, b"VC-1"),
        _ => {}
    }
}
