//! Circular Window (C3): a fixed-capacity ring per channel (spec §4.3),
//! grounded on `EEGCircularData::Append`/`GetData`.

use elemem_types::{ElememError, RawFrame};

/// A fixed-capacity ring buffer of samples, one per channel, all sharing a
/// sampling rate that is fixed by the first non-empty append.
pub struct CircularWindow {
    capacity: usize,
    sampling_rate: Option<u32>,
    channels: Vec<Vec<f64>>,
    /// Index of the oldest sample in each channel's backing vec.
    start: usize,
    /// Total samples ever appended (saturates conceptually at `capacity`
    /// for snapshot purposes, but we track the true count to know whether
    /// the ring has wrapped).
    total_appended: u64,
}

impl CircularWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sampling_rate: None,
            channels: Vec::new(),
            start: 0,
            total_appended: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ensure_shape(&mut self, frame: &RawFrame) -> Result<(), ElememError> {
        if self.sampling_rate.is_none() {
            self.sampling_rate = Some(frame.sampling_rate);
            self.channels = vec![vec![0.0; self.capacity]; frame.channel_count()];
        }
        if frame.channel_count() != self.channels.len() {
            return Err(ElememError::bounds(format!(
                "frame has {} channels, window expects {}",
                frame.channel_count(),
                self.channels.len()
            )));
        }
        Ok(())
    }

    /// Appends `amount` samples from `frame` starting at `start`, per
    /// channel, wrapping at `capacity`.
    pub fn append(&mut self, frame: &RawFrame, start: usize, amount: usize) -> Result<(), ElememError> {
        self.ensure_shape(frame)?;
        if amount == 0 {
            return Ok(());
        }

        for c in 0..self.channels.len() {
            let src = match frame.channel(c) {
                Some(s) if !s.is_empty() => s,
                _ => continue,
            };
            if start + amount > src.len() {
                return Err(ElememError::bounds(
                    "append range exceeds incoming frame length",
                ));
            }
            if amount > self.capacity {
                return Err(ElememError::bounds(
                    "cannot append more samples than the window's capacity",
                ));
            }

            let dst = &mut self.channels[c];
            let remaining = self.capacity - self.start;
            let first = remaining.min(amount);
            for i in 0..first {
                dst[self.start + i] = src[start + i] as f64;
            }
            let second = amount - first;
            for i in 0..second {
                dst[i] = src[start + first + i] as f64;
            }
        }

        self.start = (self.start + amount) % self.capacity;
        self.total_appended += amount as u64;
        Ok(())
    }

    pub fn append_all(&mut self, frame: &RawFrame) -> Result<(), ElememError> {
        let amount = frame.max_len();
        self.append(frame, 0, amount)
    }

    /// Returns `capacity` samples per channel in chronological order.
    pub fn snapshot(&self) -> RawFrame {
        self.snapshot_amount(self.capacity)
    }

    /// Returns the most recent `amount` samples per channel in chronological
    /// order; `amount` must not exceed `capacity`.
    pub fn snapshot_amount(&self, amount: usize) -> RawFrame {
        let amount = amount.min(self.capacity);
        let rate = self.sampling_rate.unwrap_or(0);
        let mut out = RawFrame::new(rate, self.channels.len());

        for (c, chan) in self.channels.iter().enumerate() {
            let ordered: Vec<f64> = (0..self.capacity)
                .map(|i| chan[(self.start + i) % self.capacity])
                .collect();
            let tail = &ordered[ordered.len() - amount..];
            out.set_channel(c, tail.iter().map(|&v| v as i16).collect());
        }
        out
    }

    pub fn sampling_rate(&self) -> Option<u32> {
        self.sampling_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(values: &[i16], rate: u32) -> RawFrame {
        let mut f = RawFrame::new(rate, 1);
        f.set_channel(0, values.to_vec());
        f
    }

    #[test]
    fn snapshot_length_is_min_total_and_capacity() {
        let mut w = CircularWindow::new(5);
        w.append_all(&frame_of(&[1, 2, 3], 1000)).unwrap();
        let snap = w.snapshot();
        assert_eq!(snap.channel(0).unwrap(), &[0, 0, 1, 2, 3]);
    }

    #[test]
    fn wraps_and_keeps_chronological_order() {
        let mut w = CircularWindow::new(3);
        w.append_all(&frame_of(&[1, 2, 3], 1000)).unwrap();
        w.append_all(&frame_of(&[4, 5], 1000)).unwrap();
        let snap = w.snapshot();
        assert_eq!(snap.channel(0).unwrap(), &[3, 4, 5]);
    }

    #[test]
    fn rejects_mismatched_channel_count() {
        let mut w = CircularWindow::new(3);
        w.append_all(&frame_of(&[1, 2], 1000)).unwrap();
        let mut two_chan = RawFrame::new(1000, 2);
        two_chan.set_channel(0, vec![1]);
        two_chan.set_channel(1, vec![2]);
        assert!(w.append_all(&two_chan).is_err());
    }
}
