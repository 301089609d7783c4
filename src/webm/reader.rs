use super::ebml;
use super::writer::{AudioSettings, TrackEntry, TrackType, VideoSettings};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub track_number: u64,
    /// Absolute timecode in milliseconds
    pub timecode: i64,
    pub keyframe: bool,
    pub size: usize,
}

/// Summary of a WebM file.
#[derive(Debug, Clone, Default)]
pub struct WebmInfo {
    pub doc_type: String,
    pub tracks: Vec<TrackEntry>,
    pub clusters: usize,
    pub blocks: Vec<BlockInfo>,
}

impl WebmInfo {
    pub fn block_count(&self, track_number: u64) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.track_number == track_number)
            .count()
    }

    pub fn video(&self) -> Option<&VideoSettings> {
        self.tracks.iter().find_map(|t| t.video.as_ref())
    }
}

pub fn probe(path: impl AsRef<Path>) -> io::Result<WebmInfo> {
    let data = std::fs::read(path)?;
    parse(&data)
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Walk the element stream. Segment, Cluster and Tracks are entered rather
/// than skipped, which also copes with their unknown-size live form. A file
/// cut off in the middle of a block yields everything before it.
pub fn parse(data: &[u8]) -> io::Result<WebmInfo> {
    let mut info = WebmInfo::default();
    let mut cluster_timecode = 0i64;
    let mut pos = 0;

    while pos < data.len() {
        let header = ebml::read_id(&data[pos..]).and_then(|(id, id_len)| {
            ebml::read_vint(&data[pos + id_len..]).map(|(size, size_len)| (id, id_len, size, size_len))
        });
        let (id, id_len, size, size_len) = match header {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        let body_start = pos + id_len + size_len;

        match id {
            ebml::SEGMENT | ebml::CLUSTER | ebml::TRACKS => {
                if id == ebml::CLUSTER {
                    info.clusters += 1;
                }
                pos = body_start;
                continue;
            }
            _ => {}
        }

        let size = size.ok_or_else(|| invalid("unknown size on a leaf element"))? as usize;
        let body_end = body_start + size;
        if body_end > data.len() {
            break;
        }
        let body = &data[body_start..body_end];

        match id {
            ebml::EBML => info.doc_type = parse_doc_type(body)?,
            ebml::TRACK_ENTRY => info.tracks.push(parse_track_entry(body)?),
            ebml::TIMECODE => cluster_timecode = ebml::read_uint(body) as i64,
            ebml::SIMPLE_BLOCK => info.blocks.push(parse_simple_block(body, cluster_timecode)?),
            _ => {}
        }
        pos = body_end;
    }

    Ok(info)
}

/// Iterate the children of a sized master element.
fn children(body: &[u8]) -> io::Result<Vec<(u32, &[u8])>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let (id, id_len) = ebml::read_id(&body[pos..])?;
        let (size, size_len) = ebml::read_vint(&body[pos + id_len..])?;
        let size = size.ok_or_else(|| invalid("unknown size inside a sized element"))? as usize;
        let start = pos + id_len + size_len;
        let end = start + size;
        if end > body.len() {
            return Err(invalid("child element overruns its parent"));
        }
        out.push((id, &body[start..end]));
        pos = end;
    }
    Ok(out)
}

fn parse_doc_type(body: &[u8]) -> io::Result<String> {
    for (id, value) in children(body)? {
        if id == ebml::DOC_TYPE {
            return Ok(String::from_utf8_lossy(value).into_owned());
        }
    }
    Ok(String::new())
}

fn parse_track_entry(body: &[u8]) -> io::Result<TrackEntry> {
    let mut entry = TrackEntry {
        name: String::new(),
        track_number: 0,
        codec_id: String::new(),
        track_type: TrackType::Video,
        audio: None,
        video: None,
    };
    for (id, value) in children(body)? {
        match id {
            ebml::TRACK_NUMBER => entry.track_number = ebml::read_uint(value),
            ebml::NAME => entry.name = String::from_utf8_lossy(value).into_owned(),
            ebml::CODEC_ID => entry.codec_id = String::from_utf8_lossy(value).into_owned(),
            ebml::TRACK_TYPE => {
                entry.track_type = match ebml::read_uint(value) {
                    1 => TrackType::Video,
                    2 => TrackType::Audio,
                    _ => return Err(invalid("unsupported track type")),
                }
            }
            ebml::VIDEO => {
                let mut video = VideoSettings {
                    pixel_width: 0,
                    pixel_height: 0,
                };
                for (id, value) in children(value)? {
                    match id {
                        ebml::PIXEL_WIDTH => video.pixel_width = ebml::read_uint(value),
                        ebml::PIXEL_HEIGHT => video.pixel_height = ebml::read_uint(value),
                        _ => {}
                    }
                }
                entry.video = Some(video);
            }
            ebml::AUDIO => {
                let mut audio = AudioSettings {
                    sampling_frequency: 8000.0,
                    channels: 1,
                };
                for (id, value) in children(value)? {
                    match id {
                        ebml::SAMPLING_FREQUENCY => audio.sampling_frequency = ebml::read_float(value)?,
                        ebml::CHANNELS => audio.channels = ebml::read_uint(value),
                        _ => {}
                    }
                }
                entry.audio = Some(audio);
            }
            _ => {}
        }
    }
    Ok(entry)
}

fn parse_simple_block(body: &[u8], cluster_timecode: i64) -> io::Result<BlockInfo> {
    let (track_number, len) = ebml::read_vint(body)?;
    let track_number = track_number.ok_or_else(|| invalid("invalid track number"))?;
    if body.len() < len + 3 {
        return Err(invalid("short SimpleBlock"));
    }
    let relative = i16::from_be_bytes([body[len], body[len + 1]]) as i64;
    let flags = body[len + 2];
    Ok(BlockInfo {
        track_number,
        timecode: cluster_timecode + relative,
        keyframe: flags & 0x80 != 0,
        size: body.len() - len - 3,
    })
}
