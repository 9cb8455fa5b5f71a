//! Parsing of backend diagnostic output into progress values.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separation progress is capped below 100 so the normalization phase
/// has headroom before the job reports completion.
pub const SEPARATION_PROGRESS_CEILING: u8 = 95;

/// tqdm-style progress line: `` 56%|█████▌   | 58.05/103.95 [...]``
static DEMUCS_PROGRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)%\|.*?\|\s*([0-9.]+)/([0-9.]+)").expect("valid regex"));

/// key=value line from ffmpeg `-progress pipe:1`
static FFMPEG_OUT_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^out_time_(?:us|ms)=(\d+)").expect("valid regex"));

/// One parsed demucs progress report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemucsProgress {
    /// Reported percent, clamped to [`SEPARATION_PROGRESS_CEILING`]
    pub percent: u8,
    /// Seconds of audio processed so far
    pub processed: f64,
    /// Total seconds of audio
    pub total: f64,
}

/// Parse a demucs stderr line. Returns `None` for lines that carry no
/// progress fraction (those update only the status message).
#[must_use]
pub fn parse_demucs_line(line: &str) -> Option<DemucsProgress> {
    let caps = DEMUCS_PROGRESS.captures(line)?;
    let percent: u8 = caps.get(1)?.as_str().parse().ok()?;
    let processed: f64 = caps.get(2)?.as_str().parse().ok()?;
    let total: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(DemucsProgress {
        percent: percent.min(SEPARATION_PROGRESS_CEILING),
        processed,
        total,
    })
}

/// Parse an `out_time_us=`/`out_time_ms=` line from ffmpeg `-progress`
/// output into microseconds of media produced so far. (ffmpeg emits
/// microseconds under both keys.)
#[must_use]
pub fn parse_ffmpeg_out_time_us(line: &str) -> Option<u64> {
    let caps = FFMPEG_OUT_TIME.captures(line.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// Map elapsed media time onto a progress span, strictly as
/// completed/total work units.
#[must_use]
pub fn map_to_span(elapsed_secs: f64, total_secs: f64, span: (u8, u8)) -> u8 {
    let (lo, hi) = span;
    if total_secs <= 0.0 {
        return lo;
    }
    let fraction = (elapsed_secs / total_secs).clamp(0.0, 1.0);
    let width = f64::from(hi.saturating_sub(lo));
    lo.saturating_add((fraction * width) as u8).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demucs_tqdm_line() {
        let line = " 56%|█████▌    | 58.05/103.95 [00:12<00:09,  4.85seconds/s]";
        let p = parse_demucs_line(line).unwrap();
        assert_eq!(p.percent, 56);
        assert!((p.processed - 58.05).abs() < 1e-9);
        assert!((p.total - 103.95).abs() < 1e-9);
    }

    #[test]
    fn test_parse_demucs_caps_at_ceiling() {
        let line = "100%|██████████| 103.95/103.95 [00:21<00:00,  4.85seconds/s]";
        let p = parse_demucs_line(line).unwrap();
        assert_eq!(p.percent, SEPARATION_PROGRESS_CEILING);
    }

    #[test]
    fn test_parse_demucs_rejects_noise() {
        assert!(parse_demucs_line("Selected model is a bag of 1 models").is_none());
        assert!(parse_demucs_line("Separating track song.mp3").is_none());
        assert!(parse_demucs_line("").is_none());
    }

    #[test]
    fn test_parse_ffmpeg_out_time() {
        assert_eq!(parse_ffmpeg_out_time_us("out_time_us=1500000"), Some(1_500_000));
        assert_eq!(parse_ffmpeg_out_time_us("out_time_ms=1500000"), Some(1_500_000));
        assert_eq!(parse_ffmpeg_out_time_us("frame=42"), None);
        assert_eq!(parse_ffmpeg_out_time_us("out_time=00:00:01.500000"), None);
    }

    #[test]
    fn test_map_to_span() {
        assert_eq!(map_to_span(0.0, 10.0, (10, 50)), 10);
        assert_eq!(map_to_span(5.0, 10.0, (10, 50)), 30);
        assert_eq!(map_to_span(10.0, 10.0, (10, 50)), 50);
        // Overshoot clamps to the span ceiling
        assert_eq!(map_to_span(20.0, 10.0, (10, 50)), 50);
        // Degenerate duration pins to the floor
        assert_eq!(map_to_span(3.0, 0.0, (50, 90)), 50);
    }
}
