//! Running statistics of the adaptation calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Running min/max/mean/stddev accumulator over a stream of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    min: f64,
    max: f64,
    sum: f64,
    sum2: f64,
    n: usize,
}

impl Range {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, value: f64) {
        if self.n == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.sum2 += value * value;
        self.n += 1;
    }

    /// Smallest sample, or 0 when empty.
    pub fn min(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.min }
    }

    /// Largest sample, or 0 when empty.
    pub fn max(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.max }
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum2 / self.n as f64 - mean * mean).max(0.0).sqrt()
    }

    /// Number of samples.
    pub fn n(&self) -> usize {
        self.n
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min: {:10.3e} avg: {:10.3e} | {:10.3e} max: {:10.3e}",
            self.min(),
            self.mean(),
            self.stddev(),
            self.max()
        )
    }
}

/// Accumulated across adaptation calls until [`reset`](AdaptStats::reset).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptStats {
    /// Leaves created by splits (net of the replaced parent).
    pub created: usize,
    /// Leaves removed by collapses (net of the parent that becomes a leaf).
    pub removed: usize,
    /// Final refine-candidate cost of each budgeted run.
    pub cmax: Range,
    /// Final leaf count of each run.
    pub ncells: Range,
    /// Wall-clock duration of each call, in seconds.
    pub timing: Range,
}

impl AdaptStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for AdaptStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Adaptive mesh refinement statistics")?;
        writeln!(f, "  Cells created: {:10}", self.created)?;
        writeln!(f, "  Cells removed: {:10}", self.removed)?;
        writeln!(f, "  Cells:     {}", self.ncells)?;
        if self.cmax.n() > 0 {
            writeln!(f, "  Max cost:  {}", self.cmax)?;
        }
        write!(f, "  Time (s):  {}", self.timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_tracks_moments() {
        let mut r = Range::new();
        assert_eq!(r.min(), 0.0);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            r.add_value(v);
        }
        assert_eq!(r.n(), 8);
        assert_eq!(r.min(), 2.0);
        assert_eq!(r.max(), 9.0);
        assert_eq!(r.mean(), 5.0);
        assert!((r.stddev() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = AdaptStats::new();
        s.created = 4;
        s.ncells.add_value(10.0);
        s.reset();
        assert_eq!(s, AdaptStats::default());
    }

    #[test]
    fn report_lists_counts() {
        let mut s = AdaptStats::new();
        s.created = 12;
        s.removed = 3;
        s.ncells.add_value(25.0);
        let report = s.to_string();
        assert!(report.starts_with("Adaptive mesh refinement statistics"));
        assert!(report.contains("Cells created:         12"));
        assert!(!report.contains("Max cost"));
    }
}
