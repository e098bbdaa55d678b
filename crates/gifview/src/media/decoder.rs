//! GIF frame source on top of the `gif` crate.
//!
//! - `read` parses every frame record up front (palette lookup + LZW done by `gif`)
//! - frames are composited lazily on `next_frame`, honoring disposal methods
//! - sequential playback composites one record per call; a seek rebuilds from frame 0

use gif::DisposalMethod;

use super::source::{FrameDecoder, FrameSource};
use super::types::{rgba_len, DecodedFrame};
use crate::error::{DecodeError, FrameError};

/// Default decode budget: 256 MiB of RGBA records and canvases.
pub const DEFAULT_MAX_DECODED_BYTES: u64 = 256 * 1024 * 1024;
/// Delays below this are treated as "unspecified" (browser convention).
pub const DEFAULT_MIN_FRAME_DELAY_MS: u32 = 20;
/// Delay substituted for unspecified delays.
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// Builds [`GifFrameSource`]s within a memory budget.
#[derive(Debug, Clone)]
pub struct GifDecoder {
    pub max_decoded_bytes: u64,
    pub min_frame_delay_ms: u32,
    pub default_frame_delay_ms: u32,
    /// When false, the Netscape loop count is ignored and playback loops forever.
    pub honor_loop_count: bool,
}

impl Default for GifDecoder {
    fn default() -> Self {
        Self {
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            min_frame_delay_ms: DEFAULT_MIN_FRAME_DELAY_MS,
            default_frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            honor_loop_count: true,
        }
    }
}

impl GifDecoder {
    /// Parse a GIF byte buffer into a frame source.
    pub fn decode(&self, bytes: &[u8]) -> Result<GifFrameSource, DecodeError> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let mut reader = options.read_info(bytes)?;

        let width = u32::from(reader.width());
        let height = u32::from(reader.height());
        if width == 0 || height == 0 {
            return Err(DecodeError::Format(format!(
                "invalid canvas size {width}x{height}"
            )));
        }

        // Canvas plus the "restore to previous" snapshot.
        let mut used = rgba_len(width, height) as u64 * 2;
        self.check_budget(used)?;

        let mut records = Vec::new();
        while let Some(frame) = reader.read_next_frame()? {
            used += frame.buffer.len() as u64;
            self.check_budget(used)?;

            records.push(FrameRecord {
                left: u32::from(frame.left),
                top: u32::from(frame.top),
                width: u32::from(frame.width),
                height: u32::from(frame.height),
                delay_ms: self.frame_delay_ms(frame.delay),
                dispose: frame.dispose,
                rgba: frame.buffer.to_vec(),
            });
        }

        if records.is_empty() {
            return Err(DecodeError::NoFrames);
        }

        let loop_count = match reader.repeat() {
            _ if !self.honor_loop_count => None,
            gif::Repeat::Infinite => None,
            gif::Repeat::Finite(n) => Some(u32::from(n)),
        };

        log::info!(
            "Loaded GIF: {}x{}, {} frame{}, loops: {}",
            width,
            height,
            records.len(),
            if records.len() == 1 { "" } else { "s" },
            loop_count.map_or_else(|| "forever".to_string(), |n| (n + 1).to_string()),
        );

        Ok(GifFrameSource::new(width, height, records, loop_count))
    }

    fn check_budget(&self, needed: u64) -> Result<(), DecodeError> {
        if needed > self.max_decoded_bytes {
            return Err(DecodeError::ResourceExhausted {
                needed,
                limit: self.max_decoded_bytes,
            });
        }
        Ok(())
    }

    /// GIF delays are in centiseconds.
    fn frame_delay_ms(&self, centis: u16) -> u64 {
        let ms = u32::from(centis) * 10;
        if ms < self.min_frame_delay_ms {
            u64::from(self.default_frame_delay_ms)
        } else {
            u64::from(ms)
        }
    }
}

impl FrameDecoder for GifDecoder {
    fn read(&self, bytes: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError> {
        Ok(Box::new(self.decode(bytes)?))
    }
}

/// One parsed GIF frame: an RGBA sub-rectangle of the canvas.
struct FrameRecord {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    delay_ms: u64,
    dispose: DisposalMethod,
    rgba: Vec<u8>,
}

/// Cursor over the frames of one GIF.
pub struct GifFrameSource {
    width: u32,
    height: u32,
    records: Vec<FrameRecord>,
    /// Extra plays after the first; `None` loops forever.
    loop_count: Option<u32>,
    loop_index: u32,
    cursor: usize,
    canvas: Vec<u8>,
    /// Last record composited onto `canvas`.
    composited: Option<usize>,
    /// Canvas snapshot for `DisposalMethod::Previous`.
    restore: Option<Vec<u8>>,
}

impl GifFrameSource {
    fn new(width: u32, height: u32, records: Vec<FrameRecord>, loop_count: Option<u32>) -> Self {
        Self {
            width,
            height,
            records,
            loop_count,
            loop_index: 0,
            cursor: 0,
            canvas: vec![0u8; rgba_len(width, height)],
            composited: None,
            restore: None,
        }
    }

    /// Extra plays after the first, `None` when looping forever.
    pub fn loop_count(&self) -> Option<u32> {
        self.loop_count
    }

    pub fn delays_ms(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.delay_ms).collect()
    }

    fn reset_canvas(&mut self) {
        self.canvas.fill(0);
        self.composited = None;
        self.restore = None;
    }

    /// Bring `canvas` to the composited state of frame `index`.
    fn composite_to(&mut self, index: usize) -> Result<(), FrameError> {
        let start = match self.composited {
            Some(c) if c == index => return Ok(()),
            Some(c) if c + 1 == index => index,
            _ => {
                self.reset_canvas();
                0
            }
        };
        for i in start..=index {
            if let Err(e) = self.apply(i) {
                // Leave the canvas in a known state for the next call.
                self.reset_canvas();
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply(&mut self, index: usize) -> Result<(), FrameError> {
        // Dispose of the previous frame before drawing this one
        if let Some(prev) = self.composited {
            let rec = &self.records[prev];
            let (dispose, left, top, w, h) = (rec.dispose, rec.left, rec.top, rec.width, rec.height);
            match dispose {
                DisposalMethod::Background => self.clear_rect(left, top, w, h),
                DisposalMethod::Previous => {
                    if let Some(saved) = self.restore.take() {
                        self.canvas = saved;
                    }
                }
                _ => {}
            }
        }

        let rec = &self.records[index];
        if rec.rgba.len() != rgba_len(rec.width, rec.height) {
            return Err(FrameError::Decode {
                index,
                reason: format!(
                    "pixel data is {} bytes, expected {} for {}x{}",
                    rec.rgba.len(),
                    rgba_len(rec.width, rec.height),
                    rec.width,
                    rec.height
                ),
            });
        }

        if matches!(rec.dispose, DisposalMethod::Previous) {
            self.restore = Some(self.canvas.clone());
        }

        let (width, height) = (self.width, self.height);
        for y in 0..rec.height {
            for x in 0..rec.width {
                let dst_x = rec.left + x;
                let dst_y = rec.top + y;
                if dst_x >= width || dst_y >= height {
                    continue;
                }
                let src_idx = ((y * rec.width + x) * 4) as usize;
                let src = &rec.rgba[src_idx..src_idx + 4];
                // Transparent pixels let the previous canvas show through
                if src[3] > 0 {
                    let dst_idx = ((dst_y * width + dst_x) * 4) as usize;
                    self.canvas[dst_idx..dst_idx + 4].copy_from_slice(src);
                }
            }
        }

        self.composited = Some(index);
        Ok(())
    }

    fn clear_rect(&mut self, left: u32, top: u32, w: u32, h: u32) {
        let right = (left + w).min(self.width);
        let bottom = (top + h).min(self.height);
        for y in top..bottom {
            let row = (y * self.width) as usize * 4;
            let from = row + left as usize * 4;
            let to = row + right as usize * 4;
            if from < to {
                self.canvas[from..to].fill(0);
            }
        }
    }
}

impl FrameSource for GifFrameSource {
    fn frame_count(&self) -> usize {
        self.records.len()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn current_index(&self) -> usize {
        self.cursor
    }

    fn next_frame(&mut self) -> Result<DecodedFrame, FrameError> {
        let index = self.cursor;
        self.composite_to(index)?;

        let mut data = Vec::new();
        data.try_reserve_exact(self.canvas.len())
            .map_err(|_| FrameError::ResourceExhausted { index })?;
        data.extend_from_slice(&self.canvas);

        Ok(DecodedFrame {
            data,
            width: self.width,
            height: self.height,
        })
    }

    fn next_delay_ms(&self) -> u64 {
        self.records.get(self.cursor).map_or(0, |r| r.delay_ms)
    }

    fn advance(&mut self) -> bool {
        let n = self.records.len();
        if n == 0 {
            return false;
        }
        if self.cursor == n - 1 {
            self.loop_index += 1;
        }
        if let Some(count) = self.loop_count {
            if self.loop_index > count {
                // Rewind so a later start replays the full loop count
                self.loop_index = 0;
                self.cursor = 0;
                return false;
            }
        }
        self.cursor = (self.cursor + 1) % n;
        true
    }

    fn set_frame_index(&mut self, index: usize) -> bool {
        if index >= self.records.len() {
            return false;
        }
        self.cursor = index;
        true
    }

    fn reset_loop_index(&mut self) {
        self.loop_index = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    /// Encode a GIF from full-canvas solid frames: (color index, delay in centiseconds).
    pub(crate) fn encode_gif(
        width: u16,
        height: u16,
        frames: &[(u8, u16)],
        repeat: Option<gif::Repeat>,
    ) -> Vec<u8> {
        let palette = [255, 0, 0, 0, 0, 255, 0, 255, 0, 255, 255, 255];
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, width, height, &palette).unwrap();
            if let Some(repeat) = repeat {
                encoder.set_repeat(repeat).unwrap();
            }
            for &(color, delay) in frames {
                let mut frame = gif::Frame::default();
                frame.width = width;
                frame.height = height;
                frame.delay = delay;
                frame.buffer = std::borrow::Cow::Owned(vec![color; width as usize * height as usize]);
                encoder.write_frame(&frame).unwrap();
            }
        }
        out
    }

    fn pixel(frame: &DecodedFrame, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * frame.width + x) * 4) as usize;
        [frame.data[i], frame.data[i + 1], frame.data[i + 2], frame.data[i + 3]]
    }

    #[test]
    fn decodes_frames_and_delays() {
        let bytes = encode_gif(4, 3, &[(0, 10), (1, 15), (0, 20)], Some(gif::Repeat::Infinite));
        let source = GifDecoder::default().decode(&bytes).unwrap();
        assert_eq!(source.frame_count(), 3);
        assert_eq!((source.width(), source.height()), (4, 3));
        assert_eq!(source.delays_ms(), vec![100, 150, 200]);
        assert_eq!(source.loop_count(), None);
    }

    #[test]
    fn tiny_delays_use_default() {
        let bytes = encode_gif(2, 2, &[(0, 0), (1, 1), (0, 2)], None);
        let source = GifDecoder::default().decode(&bytes).unwrap();
        assert_eq!(source.delays_ms(), vec![100, 100, 20]);
    }

    #[test]
    fn next_frame_composites_in_order() {
        let bytes = encode_gif(2, 2, &[(0, 10), (1, 10)], Some(gif::Repeat::Infinite));
        let mut source = GifDecoder::default().decode(&bytes).unwrap();

        let first = source.next_frame().unwrap();
        assert!(first.is_well_formed());
        assert_eq!(pixel(&first, 0, 0), RED);

        assert!(source.advance());
        let second = source.next_frame().unwrap();
        assert_eq!(pixel(&second, 1, 1), BLUE);

        // Wraps back to the first frame
        assert!(source.advance());
        assert_eq!(source.current_index(), 0);
        assert_eq!(pixel(&source.next_frame().unwrap(), 0, 0), RED);
    }

    #[test]
    fn seek_rebuilds_canvas() {
        let bytes = encode_gif(2, 2, &[(0, 10), (1, 10), (0, 10)], Some(gif::Repeat::Infinite));
        let mut source = GifDecoder::default().decode(&bytes).unwrap();
        assert!(source.set_frame_index(1));
        assert_eq!(pixel(&source.next_frame().unwrap(), 0, 0), BLUE);
        assert!(!source.set_frame_index(3));
        assert_eq!(source.current_index(), 1);
    }

    #[test]
    fn finite_loop_count_stops_advance() {
        // Finite(1): two plays in total
        let bytes = encode_gif(1, 1, &[(0, 10), (1, 10)], Some(gif::Repeat::Finite(1)));
        let mut source = GifDecoder::default().decode(&bytes).unwrap();
        assert_eq!(source.loop_count(), Some(1));

        let mut steps = 0;
        while source.advance() {
            steps += 1;
            assert!(steps < 10, "advance never reported the end");
        }
        // 0->1, 1->0, 0->1, then the wrap is refused
        assert_eq!(steps, 3);
        assert_eq!(source.current_index(), 0);
        // Rewound: the full count is available again
        assert!(source.advance());
    }

    #[test]
    fn ignoring_loop_count_loops_forever() {
        let bytes = encode_gif(1, 1, &[(0, 10)], Some(gif::Repeat::Finite(0)));
        let decoder = GifDecoder {
            honor_loop_count: false,
            ..GifDecoder::default()
        };
        let mut source = decoder.decode(&bytes).unwrap();
        assert_eq!(source.loop_count(), None);
        for _ in 0..5 {
            assert!(source.advance());
        }
    }

    #[test]
    fn malformed_bytes_fail() {
        let err = GifDecoder::default().decode(b"definitely not a gif").err().unwrap();
        assert!(matches!(err, DecodeError::Format(_) | DecodeError::Io(_)));
    }

    #[test]
    fn budget_exceeded_is_resource_exhaustion() {
        let bytes = encode_gif(16, 16, &[(0, 10), (1, 10)], None);
        let decoder = GifDecoder {
            max_decoded_bytes: 1024,
            ..GifDecoder::default()
        };
        let err = decoder.decode(&bytes).err().unwrap();
        assert!(matches!(
            err,
            DecodeError::ResourceExhausted { limit: 1024, .. }
        ));
    }

    #[test]
    fn decoder_trait_returns_boxed_source() {
        let bytes = encode_gif(3, 3, &[(0, 10)], None);
        let decoder: &dyn FrameDecoder = &GifDecoder::default();
        let source = decoder.read(&bytes).unwrap();
        assert_eq!(source.frame_count(), 1);
        assert_eq!(source.next_delay_ms(), 100);
    }

    #[test]
    fn background_disposal_clears_rect() {
        let mut source = GifFrameSource::new(
            2,
            1,
            vec![
                FrameRecord {
                    left: 0,
                    top: 0,
                    width: 2,
                    height: 1,
                    delay_ms: 100,
                    dispose: DisposalMethod::Background,
                    rgba: [RED, RED].concat(),
                },
                FrameRecord {
                    left: 1,
                    top: 0,
                    width: 1,
                    height: 1,
                    delay_ms: 100,
                    dispose: DisposalMethod::Keep,
                    rgba: BLUE.to_vec(),
                },
            ],
            None,
        );
        source.next_frame().unwrap();
        source.advance();
        let frame = source.next_frame().unwrap();
        assert_eq!(pixel(&frame, 0, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&frame, 1, 0), BLUE);
    }

    #[test]
    fn previous_disposal_restores_canvas() {
        let mut source = GifFrameSource::new(
            1,
            1,
            vec![
                FrameRecord {
                    left: 0,
                    top: 0,
                    width: 1,
                    height: 1,
                    delay_ms: 100,
                    dispose: DisposalMethod::Keep,
                    rgba: RED.to_vec(),
                },
                FrameRecord {
                    left: 0,
                    top: 0,
                    width: 1,
                    height: 1,
                    delay_ms: 100,
                    dispose: DisposalMethod::Previous,
                    rgba: BLUE.to_vec(),
                },
                FrameRecord {
                    left: 0,
                    top: 0,
                    width: 1,
                    height: 1,
                    delay_ms: 100,
                    dispose: DisposalMethod::Keep,
                    rgba: vec![0, 0, 0, 0],
                },
            ],
            None,
        );
        assert!(source.set_frame_index(1));
        assert_eq!(pixel(&source.next_frame().unwrap(), 0, 0), BLUE);
        source.advance();
        // Frame 2 is fully transparent: the restored red shows through
        assert_eq!(pixel(&source.next_frame().unwrap(), 0, 0), RED);
    }

    #[test]
    fn short_record_is_frame_error() {
        let mut source = GifFrameSource::new(
            2,
            2,
            vec![FrameRecord {
                left: 0,
                top: 0,
                width: 2,
                height: 2,
                delay_ms: 100,
                dispose: DisposalMethod::Keep,
                rgba: vec![0; 3],
            }],
            None,
        );
        assert!(matches!(
            source.next_frame(),
            Err(FrameError::Decode { index: 0, .. })
        ));
    }
}
