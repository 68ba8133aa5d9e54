use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Phase names used throughout the pipeline.
pub const PHASE_DECODE: &str = "decode";
pub const PHASE_LIFT: &str = "lift";
pub const PHASE_OPTIMIZE: &str = "optimize";
pub const PHASE_STRUCTURE: &str = "structure";
pub const PHASE_GOTOS: &str = "gotos";
pub const PHASE_EMIT: &str = "emit";

const PHASE_ORDER: [&str; 6] = [
    PHASE_DECODE,
    PHASE_LIFT,
    PHASE_OPTIMIZE,
    PHASE_STRUCTURE,
    PHASE_GOTOS,
    PHASE_EMIT,
];

/// Tracks per-phase timing for a single code unit.
#[derive(Debug, Clone)]
pub struct UnitTimings {
    pub unit_name: String,
    pub phases: Vec<(&'static str, Duration)>,
}

impl UnitTimings {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            phases: Vec::new(),
        }
    }

    pub fn record(&mut self, phase: &'static str, duration: Duration) {
        self.phases.push((phase, duration));
    }

    /// Run `f` and record how long it took under `phase`.
    pub fn time<T>(&mut self, phase: &'static str, f: impl FnOnce() -> T) -> T {
        let (result, duration) = timed(f);
        self.record(phase, duration);
        result
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }
}

/// Aggregated report across all units of a run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub units: Vec<UnitTimings>,
}

impl PipelineReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, unit: UnitTimings) {
        self.units.push(unit);
    }

    pub fn phase_totals(&self) -> FxHashMap<&'static str, Duration> {
        let mut totals = FxHashMap::default();
        for unit in &self.units {
            for (phase, duration) in &unit.phases {
                *totals.entry(*phase).or_insert(Duration::ZERO) += *duration;
            }
        }
        totals
    }

    pub fn grand_total(&self) -> Duration {
        self.units.iter().map(|u| u.total()).sum()
    }

    /// Summary table followed by the `slowest` slowest units.
    pub fn summary(&self, slowest: usize) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let totals = self.phase_totals();
        let grand = self.grand_total();

        let _ = writeln!(out, "--- Performance Summary ---");
        let _ = writeln!(out, "{} units in {:.2?}", self.units.len(), grand);
        for phase in PHASE_ORDER {
            if let Some(&dur) = totals.get(phase) {
                let pct = if grand.as_nanos() > 0 {
                    dur.as_nanos() as f64 / grand.as_nanos() as f64 * 100.0
                } else {
                    0.0
                };
                let _ = writeln!(out, "  {:12} {:>10.2?}  ({:.1}%)", phase, dur, pct);
            }
        }

        let mut units: Vec<&UnitTimings> = self.units.iter().collect();
        units.sort_by(|a, b| b.total().cmp(&a.total()));
        if slowest > 0 && !units.is_empty() {
            let _ = writeln!(out, "--- Slowest {} Units ---", slowest.min(units.len()));
            for unit in units.into_iter().take(slowest) {
                let parts: Vec<String> = unit
                    .phases
                    .iter()
                    .map(|(p, d)| format!("{}={:.2?}", p, d))
                    .collect();
                let _ = writeln!(
                    out,
                    "  {:.2?}  {}  [{}]",
                    unit.total(),
                    unit.unit_name,
                    parts.join(", ")
                );
            }
        }
        out
    }
}

/// Convenience: time a closure and return (result, duration).
pub fn timed<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_totals_sum_units() {
        let mut a = UnitTimings::new("a");
        a.record(PHASE_LIFT, Duration::from_millis(2));
        a.record(PHASE_EMIT, Duration::from_millis(1));
        let mut b = UnitTimings::new("b");
        b.record(PHASE_LIFT, Duration::from_millis(3));

        let mut report = PipelineReport::new();
        report.add(a);
        report.add(b);
        let totals = report.phase_totals();
        assert_eq!(totals[PHASE_LIFT], Duration::from_millis(5));
        assert_eq!(report.grand_total(), Duration::from_millis(6));
        let text = report.summary(1);
        assert!(text.contains("2 units"));
        assert!(text.contains("Slowest 1 Units"));
        assert!(text.contains("  b  ") || text.contains("  a  "));
    }
}
