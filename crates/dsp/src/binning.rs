//! Integer-ratio downsampling by block-averaging, grounded on
//! `EEGCircularData::BinData`/`TaskClassifierManager::BinData`.

use elemem_types::{ElememError, RawFrame};

/// Bins `frame` down to `new_rate`, averaging each block of
/// `sampling_rate / new_rate` samples. Only exact integer ratios are
/// supported (spec §4.7).
pub fn bin_frame(frame: &RawFrame, new_rate: u32) -> Result<RawFrame, ElememError> {
    if new_rate == 0 || frame.sampling_rate == 0 {
        return Err(ElememError::bounds("binning requires a positive sampling rate"));
    }
    if !frame.sampling_rate.is_multiple_of(new_rate) {
        return Err(ElememError::bounds(
            "binning only supports integer sampling-rate ratios",
        ));
    }
    let ratio = (frame.sampling_rate / new_rate) as usize;
    if ratio == 0 {
        return Err(ElememError::bounds("target rate exceeds source rate"));
    }

    let mut out = RawFrame::new(new_rate, frame.channel_count());
    for c in 0..frame.channel_count() {
        let Some(chan) = frame.channel(c) else { continue };
        if chan.is_empty() {
            continue;
        }
        let binned: Vec<i16> = chan
            .chunks(ratio)
            .map(|chunk| {
                let sum: i64 = chunk.iter().map(|&v| v as i64).sum();
                (sum / chunk.len() as i64) as i16
            })
            .collect();
        out.set_channel(c, binned);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_by_exact_ratio() {
        let mut frame = RawFrame::new(9, 1);
        frame.set_channel(0, vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
        let binned = bin_frame(&frame, 3).unwrap();
        assert_eq!(binned.channel(0).unwrap(), &[1, 4, 7]);
    }

    #[test]
    fn rejects_non_integer_ratio() {
        let mut frame = RawFrame::new(10, 1);
        frame.set_channel(0, vec![0; 10]);
        assert!(bin_frame(&frame, 3).is_err());
    }
}
