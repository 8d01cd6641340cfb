//! Peak picking on saturation and R1ρ profiles.
//!
//! The CEST and R1ρ guessers locate the major and minor state resonances as
//! the strongest dips (CEST intensity) or maxima (R1ρ rate) of a profile and
//! read populations, shifts and linewidths off them.

/// Whether peaks point down from the baseline or up from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakKind {
    /// Minima below a high baseline, as in a CEST profile.
    Dip,
    /// Maxima above a low baseline, as in an R1ρ profile.
    Maximum,
}

/// One resonance found in a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Position along the profile axis (ppm).
    pub position: f64,
    /// Height measured from the baseline; always positive.
    pub amplitude: f64,
    /// Observed value at the peak.
    pub value: f64,
    /// Full width at half height (Hz).
    pub width_hz: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    peak: Peak,
    left: f64,
    right: f64,
}

/// Signal below this fraction of the baseline counts as flat.
const MIN_RELATIVE_RANGE: f64 = 0.02;
/// Local extrema below this fraction of the strongest one are noise.
const MIN_PEAK_FRACTION: f64 = 0.05;

/// Find up to `max_peaks` peaks, strongest first.
///
/// `field` converts widths from ppm to Hz. Returns an empty list when the
/// profile is flat or has fewer than three points. A weaker peak whose
/// position falls inside the half-height span of a stronger one is dropped.
pub fn find_peaks(x: &[f64], y: &[f64], field: f64, kind: PeakKind, max_peaks: usize) -> Vec<Peak> {
    let n = x.len().min(y.len());
    if n < 3 || max_peaks == 0 {
        return Vec::new();
    }
    let mut pts: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).take(n).collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (baseline, signal): (f64, Vec<f64>) = match kind {
        PeakKind::Dip => {
            let b = pts.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
            (b, pts.iter().map(|p| b - p.1).collect())
        }
        PeakKind::Maximum => {
            let b = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
            (b, pts.iter().map(|p| p.1 - b).collect())
        }
    };
    let range = signal.iter().copied().fold(0.0, f64::max);
    if range <= MIN_RELATIVE_RANGE * baseline.abs().max(f64::MIN_POSITIVE) {
        return Vec::new();
    }

    let xs: Vec<f64> = pts.iter().map(|p| p.0).collect();
    let mut candidates: Vec<Candidate> = (0..n)
        .filter(|&i| {
            let s = signal[i];
            let left_ok = i == 0 || s > signal[i - 1];
            let right_ok = i + 1 == n || s >= signal[i + 1];
            left_ok && right_ok && s >= MIN_PEAK_FRACTION * range
        })
        .map(|i| {
            let (left, right) = half_height_span(&xs, &signal, i);
            Candidate {
                peak: Peak {
                    position: xs[i],
                    amplitude: signal[i],
                    value: pts[i].1,
                    width_hz: (right - left) * field.abs(),
                },
                left,
                right,
            }
        })
        .collect();
    candidates.sort_by(|a, b| b.peak.amplitude.total_cmp(&a.peak.amplitude));

    let mut accepted: Vec<Candidate> = Vec::new();
    for c in candidates {
        let overlaps = accepted
            .iter()
            .any(|a| c.peak.position >= a.left && c.peak.position <= a.right);
        if !overlaps {
            accepted.push(c);
        }
        if accepted.len() == max_peaks {
            break;
        }
    }
    accepted.into_iter().map(|c| c.peak).collect()
}

/// Positions left and right of `i` where the signal falls to half its height.
fn half_height_span(x: &[f64], s: &[f64], i: usize) -> (f64, f64) {
    let half = 0.5 * s[i];
    let crossing = |a: usize, b: usize| {
        let (sa, sb) = (s[a], s[b]);
        if sa == sb {
            x[a]
        } else {
            x[a] + (half - sa) * (x[b] - x[a]) / (sb - sa)
        }
    };

    let mut left = x[0];
    let mut j = i;
    while j > 0 {
        if s[j - 1] < half {
            left = crossing(j - 1, j);
            break;
        }
        j -= 1;
    }

    let mut right = x[x.len() - 1];
    let mut j = i;
    while j + 1 < x.len() {
        if s[j + 1] < half {
            right = crossing(j, j + 1);
            break;
        }
        j += 1;
    }
    (left, right)
}
