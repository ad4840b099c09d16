//! Frame-level spectral features used by the audio extractor.
//!
//! Each frame is Hann-windowed before the FFT.

use realfft::RealFftPlanner;

/// Features of a single analysis frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFeatures {
    pub rms: f64,
    pub zcr: f64,
    /// Hz
    pub spectral_centroid: f64,
    /// Hz below which 85% of the spectral energy lies
    pub spectral_rolloff: f64,
    /// Geometric / arithmetic mean of the power spectrum, in [0, 1]
    pub spectral_flatness: f64,
}

impl FrameFeatures {
    pub const NAMES: [&'static str; 5] = [
        "rms",
        "zcr",
        "spectral_centroid",
        "spectral_rolloff",
        "spectral_flatness",
    ];

    pub fn values(&self) -> [f64; 5] {
        [
            self.rms,
            self.zcr,
            self.spectral_centroid,
            self.spectral_rolloff,
            self.spectral_flatness,
        ]
    }
}

const ROLLOFF_FRACTION: f64 = 0.85;

/// Cuts `samples` into frames and computes features for each.
///
/// A signal shorter than one frame is zero-padded into a single frame.
pub struct FrameAnalyzer {
    frame_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    planner: RealFftPlanner<f32>,
}

impl FrameAnalyzer {
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        Self {
            frame_size,
            hop_size: hop_size.max(1),
            window: hann_window(frame_size),
            planner: RealFftPlanner::<f32>::new(),
        }
    }

    pub fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> Vec<FrameFeatures> {
        if samples.is_empty() || self.frame_size == 0 {
            return Vec::new();
        }

        let mut starts = Vec::new();
        let mut start = 0;
        loop {
            starts.push(start);
            if start + self.frame_size >= samples.len() {
                break;
            }
            start += self.hop_size;
        }

        let fft = self.planner.plan_fft_forward(self.frame_size);
        let mut input = fft.make_input_vec();
        let mut spectrum = fft.make_output_vec();

        let mut frames = Vec::with_capacity(starts.len());
        for start in starts {
            let end = (start + self.frame_size).min(samples.len());
            let frame = samples.get(start..end).unwrap_or_default();

            let rms = rms(frame);
            let zcr = zero_crossing_rate(frame);

            input.fill(0.0);
            for ((dst, &src), &w) in input.iter_mut().zip(frame).zip(&self.window) {
                *dst = src * w;
            }
            if fft.process(&mut input, &mut spectrum).is_err() {
                continue;
            }
            let power: Vec<f64> = spectrum
                .iter()
                .map(|c| f64::from(c.norm_sqr()))
                .collect();
            let bin_width = f64::from(sample_rate) / self.frame_size as f64;

            frames.push(FrameFeatures {
                rms,
                zcr,
                spectral_centroid: spectral_centroid(&power, bin_width),
                spectral_rolloff: spectral_rolloff(&power, bin_width),
                spectral_flatness: spectral_flatness(&power),
            });
        }
        frames
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}

pub fn rms(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / frame.len() as f64).sqrt()
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(frame: &[f32]) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| matches!(w, [a, b] if (*a >= 0.0) != (*b >= 0.0)))
        .count();
    crossings as f64 / (frame.len() - 1) as f64
}

fn spectral_centroid(power: &[f64], bin_width: f64) -> f64 {
    let magnitudes = power.iter().map(|p| p.sqrt());
    let (weighted, total) = magnitudes
        .enumerate()
        .fold((0.0, 0.0), |(w, t), (i, m)| (w + i as f64 * bin_width * m, t + m));
    if total > 0.0 { weighted / total } else { 0.0 }
}

fn spectral_rolloff(power: &[f64], bin_width: f64) -> f64 {
    let total: f64 = power.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = total * ROLLOFF_FRACTION;
    let mut cumulative = 0.0;
    for (i, p) in power.iter().enumerate() {
        cumulative += p;
        if cumulative >= threshold {
            return i as f64 * bin_width;
        }
    }
    power.len().saturating_sub(1) as f64 * bin_width
}

fn spectral_flatness(power: &[f64]) -> f64 {
    const EPS: f64 = 1e-12;
    if power.is_empty() {
        return 0.0;
    }
    let n = power.len() as f64;
    let log_mean = power.iter().map(|p| (p + EPS).ln()).sum::<f64>() / n;
    let mean = power.iter().map(|p| p + EPS).sum::<f64>() / n;
    (log_mean.exp() / mean).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_zcr_alternating_signal() {
        let signal = [1.0, -1.0, 1.0, -1.0, 1.0];
        assert!((zero_crossing_rate(&signal) - 1.0).abs() < 1e-12);
        assert_eq!(zero_crossing_rate(&[0.5]), 0.0);
    }

    #[test]
    fn test_rms_of_constant() {
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-9);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_centroid_tracks_frequency() {
        let mut analyzer = FrameAnalyzer::new(1024, 512);
        let low = analyzer.analyze(&sine(220.0, 8000, 4096), 8000);
        let high = analyzer.analyze(&sine(2000.0, 8000, 4096), 8000);

        let mean = |frames: &[FrameFeatures]| {
            frames.iter().map(|f| f.spectral_centroid).sum::<f64>() / frames.len() as f64
        };
        assert!(mean(&low) < mean(&high));
        assert!((mean(&low) - 220.0).abs() < 150.0, "centroid {}", mean(&low));
    }

    #[test]
    fn test_short_signal_yields_one_frame() {
        let mut analyzer = FrameAnalyzer::new(1024, 512);
        let frames = analyzer.analyze(&sine(440.0, 8000, 100), 8000);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_frame_count_follows_hop() {
        let mut analyzer = FrameAnalyzer::new(256, 128);
        let frames = analyzer.analyze(&vec![0.1; 1024], 8000);
        // starts at 0, 128, ..., 768 (768 + 256 reaches the end)
        assert_eq!(frames.len(), 7);
    }

    #[test]
    fn test_flatness_noise_vs_tone() {
        let mut analyzer = FrameAnalyzer::new(512, 512);
        let tone = analyzer.analyze(&sine(1000.0, 8000, 512), 8000);
        let mut state = 12345u32;
        let noise: Vec<f32> = (0..512)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (state >> 16) as f32 / 32768.0 - 1.0
            })
            .collect();
        let noisy = analyzer.analyze(&noise, 8000);
        let flatness = |frames: &[FrameFeatures]| frames.first().map_or(0.0, |f| f.spectral_flatness);
        assert!(flatness(&noisy) > flatness(&tone), "noise should be flatter than a tone");
    }
}
