//! MJPEG stream client.
//!
//! The video source is a continuous HTTP byte stream with JPEG frames
//! delimited by SOI (`FF D8`) / EOI (`FF D9`) markers. Bytes outside a
//! marker pair are discarded; frames that fail to decode are skipped.

use std::io::Read;
use std::time::Duration;

use image::RgbImage;
use thiserror::Error;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 4096;
/// Reassembly buffer cap. A stream that never yields an EOI marker would
/// otherwise grow the buffer without bound.
const MAX_BUFFER: usize = 8 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream connection failed: {0}")]
    Connect(String),
    #[error("stream read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// A source of decoded video frames.
pub trait FrameSource {
    /// Next decodable frame, or `None` when the stream ends cleanly.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, StreamError>;
}

/// Reassembles JPEG frames out of a continuous MJPEG byte stream.
pub struct MjpegStream<R: Read> {
    reader: R,
    buf: Vec<u8>,
}

impl MjpegStream<Box<dyn Read + Send>> {
    /// Connect to an MJPEG HTTP endpoint. Only the connection phase is
    /// time-bounded — the body is an endless stream by design.
    pub fn connect(url: &str, connect_timeout: Duration) -> Result<Self, StreamError> {
        let agent = ureq::Agent::config_builder()
            .timeout_connect(Some(connect_timeout))
            .build()
            .new_agent();

        let response = agent
            .get(url)
            .call()
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        tracing::info!(url, status = response.status().as_u16(), "video stream connected");

        let reader: Box<dyn Read + Send> = Box::new(response.into_body().into_reader());
        Ok(Self::from_reader(reader))
    }
}

impl<R: Read> MjpegStream<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Pull bytes until one complete SOI..EOI run is available, or the
    /// stream ends.
    fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(jpeg) = self.extract_frame() {
                return Ok(Some(jpeg));
            }
            if self.buf.len() > MAX_BUFFER {
                tracing::warn!(buffered = self.buf.len(), "no frame marker found, discarding buffer");
                self.buf.clear();
            }
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Find one complete frame in the buffer and drain through it. Garbage
    /// before the SOI marker is dropped even when the frame is incomplete.
    fn extract_frame(&mut self) -> Option<Vec<u8>> {
        let start = find_marker(&self.buf, &SOI)?;
        if start > 0 {
            self.buf.drain(..start);
        }
        let end = find_marker(&self.buf[2..], &EOI)? + 2;
        let jpeg: Vec<u8> = self.buf.drain(..end + 2).collect();
        Some(jpeg)
    }
}

impl<R: Read> FrameSource for MjpegStream<R> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, StreamError> {
        loop {
            let Some(jpeg) = self.next_jpeg()? else {
                return Ok(None);
            };
            match image::load_from_memory(&jpeg) {
                Ok(img) => return Ok(Some(img.to_rgb8())),
                Err(e) => {
                    tracing::warn!(bytes = jpeg.len(), error = %e, "undecodable frame, skipping");
                }
            }
        }
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tiny_jpeg() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, image::Rgb([200, 30, 90]));
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut out)
            .encode_image(&img)
            .unwrap();
        out
    }

    /// Reader that hands out at most `step` bytes per read call, to exercise
    /// reassembly across chunk boundaries.
    struct Dribble {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Dribble {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_jpeg_helper_has_markers() {
        let jpeg = tiny_jpeg();
        assert_eq!(&jpeg[..2], &SOI);
        assert_eq!(&jpeg[jpeg.len() - 2..], &EOI);
    }

    #[test]
    fn test_frame_extracted_from_garbage() {
        let mut data = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        data.extend_from_slice(&tiny_jpeg());
        data.extend_from_slice(b"\r\ntrailing noise");

        let mut stream = MjpegStream::from_reader(Cursor::new(data));
        let frame = stream.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut data = tiny_jpeg();
        data.extend_from_slice(b"padding");
        data.extend_from_slice(&tiny_jpeg());

        let mut stream = MjpegStream::from_reader(Cursor::new(data));
        assert!(stream.next_frame().unwrap().is_some());
        assert!(stream.next_frame().unwrap().is_some());
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut data = b"noise".to_vec();
        data.extend_from_slice(&tiny_jpeg());

        let mut stream = MjpegStream::from_reader(Dribble { data, pos: 0, step: 7 });
        let frame = stream.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
    }

    #[test]
    fn test_undecodable_frame_skipped() {
        // A well-delimited but bogus "frame" followed by a real one
        let mut data = vec![0xFF, 0xD8, 0x00, 0x01, 0x02, 0xFF, 0xD9];
        data.extend_from_slice(&tiny_jpeg());

        let mut stream = MjpegStream::from_reader(Cursor::new(data));
        let frame = stream.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
    }

    #[test]
    fn test_end_without_any_frame() {
        let mut stream = MjpegStream::from_reader(Cursor::new(b"no markers here".to_vec()));
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_stray_eoi_before_soi_discarded() {
        let mut data = vec![0xFF, 0xD9, 0x42];
        data.extend_from_slice(&tiny_jpeg());

        let mut stream = MjpegStream::from_reader(Cursor::new(data));
        let frame = stream.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
    }
}
