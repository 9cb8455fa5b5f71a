//! Peak-envelope extraction from canonical WAV stems, sized for
//! client-side rendering rather than playback.

use std::path::Path;

use serde::Serialize;

use unmixer_common::{ProcessingError, Result};

/// Compact rendering-ready description of a stem's amplitude shape.
#[derive(Debug, Clone, Serialize)]
pub struct WaveformSummary {
    /// Total duration in seconds
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Per-bucket peak amplitude, normalized to [0, 1]
    pub data: Vec<f32>,
}

/// Summarize a WAV file into `points_per_second` peak buckets.
///
/// All channels are folded together; each bucket holds the largest
/// absolute sample seen across every channel in its time slice.
pub fn waveform_summary(path: &Path, points_per_second: u32) -> Result<WaveformSummary> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| ProcessingError::Other(format!("could not open {}: {e}", path.display())))?;
    let spec = reader.spec();

    let frames = reader.duration() as u64;
    let duration = frames as f64 / f64::from(spec.sample_rate);

    // Samples per bucket, counting every channel
    let bucket = (u64::from(spec.sample_rate) * u64::from(spec.channels))
        .div_ceil(u64::from(points_per_second.max(1)))
        .max(1);

    let mut data = Vec::with_capacity((duration * f64::from(points_per_second)).ceil() as usize + 1);
    let mut peak = 0.0f32;
    let mut in_bucket = 0u64;

    let push = |sample: f32, peak: &mut f32, in_bucket: &mut u64, data: &mut Vec<f32>| {
        *peak = peak.max(sample.abs().min(1.0));
        *in_bucket += 1;
        if *in_bucket == bucket {
            data.push(*peak);
            *peak = 0.0;
            *in_bucket = 0;
        }
    };

    match spec.sample_format {
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let s = sample
                    .map_err(|e| ProcessingError::Other(format!("bad sample: {e}")))?;
                push(s, &mut peak, &mut in_bucket, &mut data);
            }
        }
        hound::SampleFormat::Int => {
            let scale = ((1i64 << (spec.bits_per_sample - 1)) as f32).max(1.0);
            for sample in reader.samples::<i32>() {
                let s = sample
                    .map_err(|e| ProcessingError::Other(format!("bad sample: {e}")))?;
                push(s as f32 / scale, &mut peak, &mut in_bucket, &mut data);
            }
        }
    }
    if in_bucket > 0 {
        data.push(peak);
    }

    Ok(WaveformSummary {
        duration,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        data,
    })
}
