/// Circular buffer of interleaved audio frames.
///
/// Capacity and reads are counted in frames, so a buffer never holds half a
/// frame and the channels cannot drift out of step. Wrap in
/// `Arc<parking_lot::Mutex<RingBuffer>>` for cross-thread access.
///
/// On overflow the oldest frames are dropped.
#[derive(Debug)]
pub struct RingBuffer {
    samples: Vec<f32>,
    channels: usize,
    capacity: usize,
    write_frame: usize,
    read_frame: usize,
    available: usize,
}

impl RingBuffer {
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        let capacity = capacity_frames.max(1);
        Self {
            samples: vec![0.0; capacity * channels],
            channels,
            capacity,
            write_frame: 0,
            read_frame: 0,
            available: 0,
        }
    }

    /// Append interleaved samples. A trailing partial frame is discarded.
    pub fn write(&mut self, interleaved: &[f32]) {
        let mut frames = interleaved.len() / self.channels;
        if frames == 0 {
            return;
        }

        let mut input = &interleaved[..frames * self.channels];
        if frames > self.capacity {
            input = &input[(frames - self.capacity) * self.channels..];
            frames = self.capacity;
        }

        let overflow = (self.available + frames).saturating_sub(self.capacity);
        if overflow > 0 {
            self.read_frame = (self.read_frame + overflow) % self.capacity;
            self.available -= overflow;
        }

        for frame in input.chunks_exact(self.channels) {
            let start = self.write_frame * self.channels;
            self.samples[start..start + self.channels].copy_from_slice(frame);
            self.write_frame = (self.write_frame + 1) % self.capacity;
        }
        self.available += frames;
    }

    /// Remove up to `frames` frames, returned interleaved.
    pub fn read_frames(&mut self, frames: usize) -> Vec<f32> {
        let to_read = frames.min(self.available);
        let mut out = Vec::with_capacity(to_read * self.channels);
        for i in 0..to_read {
            let start = ((self.read_frame + i) % self.capacity) * self.channels;
            out.extend_from_slice(&self.samples[start..start + self.channels]);
        }
        self.read_frame = (self.read_frame + to_read) % self.capacity;
        self.available -= to_read;
        out
    }

    /// Frames available for reading.
    pub fn frames(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.write_frame = 0;
        self.read_frame = 0;
        self.available = 0;
    }
}
