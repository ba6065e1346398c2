// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Sanity checks for rendered audio.

use std::fmt;

/// Peak levels below this are treated as silence.
pub const SILENCE_THRESHOLD: u32 = 100;

/// Level statistics over a buffer of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalStats {
    pub samples: usize,
    pub max_abs: u32,
    pub avg_abs: f64,
    pub non_zero: usize,
}

impl SignalStats {
    /// Computes statistics over interleaved samples, both channels together.
    pub fn from_interleaved(samples: &[i32]) -> SignalStats {
        let mut stats = SignalStats {
            samples: samples.len(),
            ..Default::default()
        };
        let mut total: u64 = 0;

        for sample in samples {
            let abs = sample.unsigned_abs();
            stats.max_abs = stats.max_abs.max(abs);
            total += u64::from(abs);
            if *sample != 0 {
                stats.non_zero += 1;
            }
        }
        if !samples.is_empty() {
            stats.avg_abs = total as f64 / samples.len() as f64;
        }

        stats
    }

    pub fn is_silent(&self) -> bool {
        self.non_zero == 0 || self.max_abs < SILENCE_THRESHOLD
    }
}

impl fmt::Display for SignalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max={} avg={:.2} non-zero={}/{}{}",
            self.max_abs,
            self.avg_abs,
            self.non_zero,
            self.samples,
            if self.is_silent() { " (silent)" } else { "" }
        )
    }
}

/// Estimates the fundamental frequency of a mono signal by counting rising
/// zero crossings. Returns None if fewer than two crossings are found.
pub fn estimate_frequency(samples: &[i32], sample_rate: u32) -> Option<f64> {
    let crossings: Vec<usize> = samples
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] < 0 && pair[1] >= 0)
        .map(|(i, _)| i + 1)
        .collect();

    let (first, last) = (crossings.first()?, crossings.last()?);
    if crossings.len() < 2 || last == first {
        return None;
    }

    let periods = (crossings.len() - 1) as f64;
    let span = (last - first) as f64;
    Some(periods * f64::from(sample_rate) / span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats() {
        let stats = SignalStats::from_interleaved(&[0, 0, 300, -500, 0, 1]);
        assert_eq!(stats.samples, 6);
        assert_eq!(stats.max_abs, 500);
        assert_eq!(stats.non_zero, 3);
        assert!((stats.avg_abs - 801.0 / 6.0).abs() < 1e-9);
        assert!(!stats.is_silent());
    }

    #[test]
    fn test_silence() {
        assert!(SignalStats::from_interleaved(&[]).is_silent());
        assert!(SignalStats::from_interleaved(&[0; 100]).is_silent());
        assert!(SignalStats::from_interleaved(&[99, -99, 5]).is_silent());
        assert!(!SignalStats::from_interleaved(&[100]).is_silent());
        assert!(SignalStats::from_interleaved(&[0; 4])
            .to_string()
            .ends_with("(silent)"));
    }

    #[test]
    fn test_estimate_frequency() {
        let rate = 55930;
        let tone: Vec<i32> = (0..rate)
            .map(|i| {
                let t = f64::from(i) / f64::from(rate);
                ((std::f64::consts::TAU * 440.0 * t).sin() * 10000.0) as i32
            })
            .collect();

        let frequency = estimate_frequency(&tone, rate as u32).unwrap();
        assert!((frequency - 440.0).abs() < 1.0, "estimated {}", frequency);
    }

    #[test]
    fn test_estimate_frequency_without_crossings() {
        assert_eq!(estimate_frequency(&[1, 2, 3], 100), None);
        assert_eq!(estimate_frequency(&[-1, 1, 2], 100), None);
    }
}
