/// A decoded frame ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub data: Vec<u8>,   // RGBA8
    pub width: u32,
    pub height: u32,
}

impl DecodedFrame {
    /// Fully transparent frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; rgba_len(width, height)],
            width,
            height,
        }
    }

    /// Whether the buffer length matches `width * height * 4`.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == rgba_len(self.width, self.height)
    }
}

/// A frame handed to the presentation thread. Owned by the receiver from then on.
#[derive(Debug, Clone)]
pub struct PlaybackFrame {
    /// Source frame index (0-based).
    pub index: usize,
    /// Delay in milliseconds that governs how long this frame stays up.
    pub delay_ms: u64,
    pub frame: DecodedFrame,
}

pub(crate) fn rgba_len(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_is_transparent() {
        let frame = DecodedFrame::blank(3, 2);
        assert_eq!(frame.data.len(), 24);
        assert!(frame.data.iter().all(|&b| b == 0));
        assert!(frame.is_well_formed());
    }

    #[test]
    fn decoded_frame_constructable() {
        let frame = DecodedFrame {
            data: vec![255, 0, 0, 255],
            width: 1,
            height: 1,
        };
        assert_eq!(frame.data.len(), 4);
        assert_eq!(frame.width, 1);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn short_buffer_is_not_well_formed() {
        let frame = DecodedFrame {
            data: vec![0; 7],
            width: 2,
            height: 1,
        };
        assert!(!frame.is_well_formed());
    }
}
