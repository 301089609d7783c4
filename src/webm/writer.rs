use super::ebml;
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use tracing::warn;

const MUXING_APP: &str = concat!("webm-recorder-", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Video = 1,
    Audio = 2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub channels: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub pixel_width: u64,
    pub pixel_height: u64,
}

/// One entry of the Tracks element.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub name: String,
    pub track_number: u64,
    pub codec_id: String,
    pub track_type: TrackType,
    pub audio: Option<AudioSettings>,
    pub video: Option<VideoSettings>,
}

impl TrackEntry {
    pub fn opus(track_number: u64, sampling_frequency: u32, channels: u16) -> Self {
        Self {
            name: "Audio".to_string(),
            track_number,
            codec_id: "A_OPUS".to_string(),
            track_type: TrackType::Audio,
            audio: Some(AudioSettings {
                sampling_frequency: sampling_frequency as f64,
                channels: channels as u64,
            }),
            video: None,
        }
    }

    pub fn vp8(track_number: u64, width: u32, height: u32) -> Self {
        Self {
            name: "Video".to_string(),
            track_number,
            codec_id: "V_VP8".to_string(),
            track_type: TrackType::Video,
            audio: None,
            video: Some(VideoSettings {
                pixel_width: width as u64,
                pixel_height: height as u64,
            }),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut body = BytesMut::new();
        ebml::put_uint(&mut body, ebml::TRACK_NUMBER, self.track_number);
        ebml::put_uint(&mut body, ebml::TRACK_UID, self.track_number);
        ebml::put_string(&mut body, ebml::NAME, &self.name);
        ebml::put_string(&mut body, ebml::CODEC_ID, &self.codec_id);
        ebml::put_uint(&mut body, ebml::TRACK_TYPE, self.track_type as u64);
        if let Some(video) = &self.video {
            let mut v = BytesMut::new();
            ebml::put_uint(&mut v, ebml::PIXEL_WIDTH, video.pixel_width);
            ebml::put_uint(&mut v, ebml::PIXEL_HEIGHT, video.pixel_height);
            ebml::put_master(&mut body, ebml::VIDEO, &v);
        }
        if let Some(audio) = &self.audio {
            let mut a = BytesMut::new();
            ebml::put_float(&mut a, ebml::SAMPLING_FREQUENCY, audio.sampling_frequency);
            ebml::put_uint(&mut a, ebml::CHANNELS, audio.channels);
            ebml::put_master(&mut body, ebml::AUDIO, &a);
        }
        ebml::put_master(buf, ebml::TRACK_ENTRY, &body);
    }
}

/// Output shared by every block writer of one file.
struct Sink {
    out: Option<BufWriter<Box<dyn Write + Send>>>,
    cluster_timecode: Option<i64>,
    open_writers: usize,
}

impl Sink {
    fn write_block(&mut self, track_number: u64, keyframe: bool, timecode: i64, data: &[u8]) -> io::Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "webm writer is closed"))?;

        let relative = self
            .cluster_timecode
            .map(|start| timecode - start)
            .filter(|rel| (i16::MIN as i64..=i16::MAX as i64).contains(rel));

        let mut buf = BytesMut::with_capacity(data.len() + 32);
        let relative = match relative {
            Some(rel) => rel as i16,
            None => {
                // cluster boundaries are a good place to hand data to the OS
                out.flush()?;
                ebml::put_id(&mut buf, ebml::CLUSTER);
                ebml::put_unknown_size(&mut buf);
                ebml::put_uint(&mut buf, ebml::TIMECODE, timecode.max(0) as u64);
                self.cluster_timecode = Some(timecode.max(0));
                (timecode - timecode.max(0)) as i16
            }
        };

        let mut header = BytesMut::with_capacity(12);
        ebml::put_vint(&mut header, track_number);
        header.put_i16(relative);
        header.put_u8(if keyframe { 0x80 } else { 0x00 });

        ebml::put_id(&mut buf, ebml::SIMPLE_BLOCK);
        ebml::put_vint(&mut buf, (header.len() + data.len()) as u64);
        buf.put_slice(&header);
        buf.put_slice(data);

        out.write_all(&buf)
    }

    fn release(&mut self) -> io::Result<()> {
        self.open_writers = self.open_writers.saturating_sub(1);
        if self.open_writers == 0 {
            if let Some(mut out) = self.out.take() {
                out.flush()?;
            }
        }
        Ok(())
    }
}

/// Writes SimpleBlocks for one track. The file is flushed and closed once
/// every writer created alongside this one has been closed.
pub struct BlockWriter {
    sink: Arc<Mutex<Sink>>,
    track_number: u64,
    closed: bool,
}

impl BlockWriter {
    pub fn track_number(&self) -> u64 {
        self.track_number
    }

    /// Append one frame at `timecode` milliseconds.
    pub fn write(&mut self, keyframe: bool, timecode: i64, data: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "block writer is closed"));
        }
        self.sink
            .lock()
            .write_block(self.track_number, keyframe, timecode, data)?;
        Ok(data.len())
    }

    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink.lock().release()
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close WebM block writer on drop: {}", e);
        }
    }
}

/// Start a live WebM stream on `out` and return one writer per entry, in
/// entry order.
///
/// The Segment and every Cluster are written with unknown size so nothing
/// needs to be patched when the stream ends.
pub fn new_simple_block_writer<W>(out: W, entries: &[TrackEntry]) -> io::Result<Vec<BlockWriter>>
where
    W: Write + Send + 'static,
{
    let mut out: BufWriter<Box<dyn Write + Send>> = BufWriter::new(Box::new(out));

    let mut buf = BytesMut::new();

    let mut header = BytesMut::new();
    ebml::put_uint(&mut header, ebml::EBML_VERSION, 1);
    ebml::put_uint(&mut header, ebml::EBML_READ_VERSION, 1);
    ebml::put_uint(&mut header, ebml::EBML_MAX_ID_LENGTH, 4);
    ebml::put_uint(&mut header, ebml::EBML_MAX_SIZE_LENGTH, 8);
    ebml::put_string(&mut header, ebml::DOC_TYPE, "webm");
    ebml::put_uint(&mut header, ebml::DOC_TYPE_VERSION, 2);
    ebml::put_uint(&mut header, ebml::DOC_TYPE_READ_VERSION, 2);
    ebml::put_master(&mut buf, ebml::EBML, &header);

    ebml::put_id(&mut buf, ebml::SEGMENT);
    ebml::put_unknown_size(&mut buf);

    let mut info = BytesMut::new();
    ebml::put_uint(&mut info, ebml::TIMECODE_SCALE, 1_000_000);
    ebml::put_string(&mut info, ebml::MUXING_APP, MUXING_APP);
    ebml::put_string(&mut info, ebml::WRITING_APP, MUXING_APP);
    ebml::put_master(&mut buf, ebml::INFO, &info);

    let mut tracks = BytesMut::new();
    for entry in entries {
        entry.encode(&mut tracks);
    }
    ebml::put_master(&mut buf, ebml::TRACKS, &tracks);

    out.write_all(&buf)?;
    out.flush()?;

    let sink = Arc::new(Mutex::new(Sink {
        out: Some(out),
        cluster_timecode: None,
        open_writers: entries.len(),
    }));

    Ok(entries
        .iter()
        .map(|entry| BlockWriter {
            sink: Arc::clone(&sink),
            track_number: entry.track_number,
            closed: false,
        })
        .collect())
}
