//! MJPEG byte stream to JPEG frames

use bytes::{Bytes, BytesMut};

use super::error::SourceError;

/// Default upper bound on one frame
pub const DEFAULT_MAX_FRAME: usize = 8 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Cuts a concatenated JPEG stream into frames on SOI/EOI markers
///
/// Bytes before the first SOI are discarded. A frame that grows past the
/// size limit without an EOI is dropped and reported.
#[derive(Debug)]
pub struct MjpegSplitter {
    buf: BytesMut,
    max_frame: usize,
    /// Offset where the EOI search resumes
    scan_from: usize,
}

impl MjpegSplitter {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            max_frame,
            scan_from: 0,
        }
    }

    /// Append raw bytes from the capture program
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.scan_from = 0;
    }

    /// Next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, SourceError> {
        if !self.buf.starts_with(&SOI) {
            match find(&self.buf, &SOI, 0) {
                Some(start) => {
                    let _ = self.buf.split_to(start);
                }
                None => {
                    // Keep a trailing 0xFF: it may be the first half of an SOI
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let drop = self.buf.len() - keep;
                    let _ = self.buf.split_to(drop);
                    return Ok(None);
                }
            }
            self.scan_from = 0;
        }

        let search_from = self.scan_from.max(SOI.len());
        if let Some(eoi) = find(&self.buf, &EOI, search_from) {
            let end = eoi + EOI.len();
            self.scan_from = 0;
            if end > self.max_frame {
                let _ = self.buf.split_to(end);
                return Err(SourceError::OversizedFrame {
                    size: end,
                    limit: self.max_frame,
                });
            }
            return Ok(Some(self.buf.split_to(end).freeze()));
        }

        if self.buf.len() > self.max_frame {
            let size = self.buf.len();
            self.clear();
            return Err(SourceError::OversizedFrame {
                size,
                limit: self.max_frame,
            });
        }

        // Resume one byte back in case the marker straddles two pushes
        self.scan_from = self.buf.len().saturating_sub(1);
        Ok(None)
    }
}

impl Default for MjpegSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xD8, 0xFF, 0xE0];
        frame.extend_from_slice(body);
        frame.extend_from_slice(&EOI);
        frame
    }

    #[test]
    fn test_single_frame() {
        let mut splitter = MjpegSplitter::default();
        let frame = jpeg(b"abc");

        splitter.push(&frame);
        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(frame));
        assert!(splitter.next_frame().unwrap().is_none());
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn test_leading_garbage_discarded() {
        let mut splitter = MjpegSplitter::default();
        let frame = jpeg(b"x");

        splitter.push(b"\x00\x01garbage");
        splitter.push(&frame);
        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(frame));
    }

    #[test]
    fn test_two_frames_one_push() {
        let mut splitter = MjpegSplitter::default();
        let first = jpeg(b"one");
        let second = jpeg(b"two");

        let mut data = first.clone();
        data.extend_from_slice(&second);
        splitter.push(&data);

        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(first));
        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(second));
        assert!(splitter.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut splitter = MjpegSplitter::default();
        let frame = jpeg(b"split-me");

        // Split between 0xFF and 0xD9 of the EOI
        let cut = frame.len() - 1;
        splitter.push(&frame[..cut]);
        assert!(splitter.next_frame().unwrap().is_none());
        splitter.push(&frame[cut..]);
        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(frame));
    }

    #[test]
    fn test_soi_split_across_pushes() {
        let mut splitter = MjpegSplitter::default();
        let frame = jpeg(b"y");

        splitter.push(&[0x00, 0x00, 0xFF]);
        assert!(splitter.next_frame().unwrap().is_none());
        splitter.push(&frame[1..]);
        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(frame));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut splitter = MjpegSplitter::new(16);

        splitter.push(&[0xFF, 0xD8]);
        splitter.push(&[0xAB; 32]);
        assert!(matches!(
            splitter.next_frame(),
            Err(SourceError::OversizedFrame { limit: 16, .. })
        ));
        assert_eq!(splitter.buffered(), 0);

        // Recovers on the next frame
        let frame = jpeg(b"ok");
        splitter.push(&frame);
        assert_eq!(splitter.next_frame().unwrap().unwrap(), Bytes::from(frame));
    }
}
