//! When a criterion takes part in adaptation.

use serde::{Deserialize, Serialize};

/// Time/iteration window and period of a criterion.
///
/// Without `step` or `istep` the schedule fires on every call inside the
/// window. With a period it fires on the first call at or past each multiple
/// of the period counted from the window start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSchedule {
    pub start: f64,
    /// Omitted from the serialized form while unbounded.
    #[serde(skip_serializing_if = "is_unbounded")]
    pub end: f64,
    pub step: Option<f64>,
    pub istart: u64,
    pub iend: u64,
    pub istep: Option<u64>,
    #[serde(skip)]
    next_t: Option<f64>,
    #[serde(skip)]
    next_i: Option<u64>,
}

impl Default for EventSchedule {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
            step: None,
            istart: 0,
            iend: u64::MAX,
            istep: None,
            next_t: None,
            next_i: None,
        }
    }
}

impl EventSchedule {
    /// Fires every `n` iterations.
    pub fn every_iterations(n: u64) -> Self {
        Self {
            istep: Some(n.max(1)),
            ..Self::default()
        }
    }

    /// Fires every `dt` of simulated time.
    pub fn every_time(dt: f64) -> Self {
        Self {
            step: Some(dt),
            ..Self::default()
        }
    }

    pub fn window(mut self, start: f64, end: f64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Advance the schedule to time `t`, iteration `i`, and report whether it
    /// fires there. Calls must be made with non-decreasing `t` and `i`.
    pub fn fires(&mut self, t: f64, i: u64) -> bool {
        if t < self.start || t > self.end || i < self.istart || i > self.iend {
            return false;
        }
        let mut fire = self.step.is_none() && self.istep.is_none();
        if let Some(step) = self.step.filter(|s| *s > 0.0) {
            let next = self.next_t.get_or_insert(self.start);
            if t >= *next {
                fire = true;
                let periods = ((t - self.start) / step).floor() + 1.0;
                *next = self.start + periods * step;
            }
        }
        if let Some(istep) = self.istep.filter(|s| *s > 0) {
            let next = self.next_i.get_or_insert(self.istart);
            if i >= *next {
                fire = true;
                let periods = (i - self.istart) / istep + 1;
                *next = self.istart.saturating_add(periods.saturating_mul(istep));
            }
        }
        fire
    }
}

fn is_unbounded(end: &f64) -> bool {
    *end == f64::INFINITY
}
