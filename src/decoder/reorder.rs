use std::collections::VecDeque;

use crate::config::ReorderKey;
use crate::video::DecodedFrame;

/// Completed frames kept sorted by timestamp until released
///
/// Inserts are stable: a frame whose key equals existing entries goes after
/// all of them.
pub struct ReorderBuffer {
    frames: VecDeque<DecodedFrame>,
    key: ReorderKey,
}

impl ReorderBuffer {
    pub fn new(key: ReorderKey) -> Self {
        Self {
            frames: VecDeque::new(),
            key,
        }
    }

    fn key_of(&self, frame: &DecodedFrame) -> i64 {
        match self.key {
            ReorderKey::Decode => frame.decode_ts_us(),
            ReorderKey::Composition => frame.composition_ts_us(),
        }
    }

    pub fn push(&mut self, frame: DecodedFrame) {
        let key = self.key_of(&frame);
        let index = self.frames.partition_point(|f| self.key_of(f) <= key);
        self.frames.insert(index, frame);
    }

    /// Pop the lowest frames while more than `window` are held
    pub fn pop_ready(&mut self, window: usize) -> Vec<DecodedFrame> {
        let excess = self.frames.len().saturating_sub(window);
        self.frames.drain(..excess).collect()
    }

    /// Pop everything, in order
    pub fn drain_all(&mut self) -> Vec<DecodedFrame> {
        self.frames.drain(..).collect()
    }

    /// Discard everything, returning how many frames were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::FrameDescriptor;

    fn frame(dts: i64, pts: i64, offset: i64) -> DecodedFrame {
        DecodedFrame::Placeholder {
            descriptor: FrameDescriptor {
                byte_offset: offset,
                decode_ts_us: dts,
                composition_ts_us: pts,
                duration_us: 1,
                is_sync_point: false,
            },
        }
    }

    fn dts(frames: &[DecodedFrame]) -> Vec<i64> {
        frames.iter().map(|f| f.decode_ts_us()).collect()
    }

    #[test]
    fn test_window_holds_back_frames() {
        let mut buffer = ReorderBuffer::new(ReorderKey::Decode);
        buffer.push(frame(1, 1, 0));
        assert!(buffer.pop_ready(1).is_empty());

        buffer.push(frame(0, 0, 0));
        assert_eq!(dts(&buffer.pop_ready(1)), vec![0]);

        buffer.push(frame(2, 2, 0));
        assert_eq!(dts(&buffer.pop_ready(1)), vec![1]);
        assert_eq!(dts(&buffer.drain_all()), vec![2]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_window_releases_immediately() {
        let mut buffer = ReorderBuffer::new(ReorderKey::Decode);
        buffer.push(frame(5, 5, 0));
        assert_eq!(dts(&buffer.pop_ready(0)), vec![5]);
    }

    #[test]
    fn test_equal_keys_keep_arrival_order() {
        let mut buffer = ReorderBuffer::new(ReorderKey::Decode);
        buffer.push(frame(3, 3, 100));
        buffer.push(frame(1, 1, 0));
        buffer.push(frame(3, 3, 200));
        buffer.push(frame(3, 3, 300));

        let offsets: Vec<i64> = buffer
            .drain_all()
            .iter()
            .map(|f| f.descriptor().byte_offset)
            .collect();
        assert_eq!(offsets, vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_composition_key() {
        // I0 P3 B1 B2 in decode order
        let mut buffer = ReorderBuffer::new(ReorderKey::Composition);
        for (dts, pts) in [(0, 0), (1, 3), (2, 1), (3, 2)] {
            buffer.push(frame(dts, pts, 0));
        }
        let pts: Vec<i64> = buffer
            .drain_all()
            .iter()
            .map(|f| f.composition_ts_us())
            .collect();
        assert_eq!(pts, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReorderBuffer::new(ReorderKey::Decode);
        buffer.push(frame(0, 0, 0));
        buffer.push(frame(1, 1, 0));
        assert_eq!(buffer.clear(), 2);
        assert!(buffer.drain_all().is_empty());
    }
}
