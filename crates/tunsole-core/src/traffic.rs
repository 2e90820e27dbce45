// ── Derived traffic rates ──
//
// Turns successive cumulative counter observations into bytes/second.
// Counters only grow within one engine run, so a decrease is read as a
// restart: the baseline is replaced and no rate is derived across it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::TrafficStats;

/// Bytes per second derived from two counter observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRates {
    pub upload_bps: f64,
    pub download_bps: f64,
}

/// What a single observation produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterReading {
    /// First observation, or no time elapsed since the last one.
    Baseline,
    /// Counters went backwards; the baseline was reset.
    Reset,
    Rates(TrafficRates),
}

#[derive(Debug, Default)]
pub struct TrafficMeter {
    baseline: Option<(TrafficStats, DateTime<Utc>)>,
    last_rates: Option<TrafficRates>,
    resets: u64,
}

impl TrafficMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one counter observation taken at `at`.
    ///
    /// Observations not newer than the current baseline are ignored and
    /// report `Baseline` without moving it.
    pub fn observe(&mut self, stats: TrafficStats, at: DateTime<Utc>) -> MeterReading {
        let Some((prev, prev_at)) = self.baseline else {
            self.baseline = Some((stats, at));
            return MeterReading::Baseline;
        };

        let elapsed = (at - prev_at).num_milliseconds();
        if elapsed <= 0 {
            return MeterReading::Baseline;
        }

        if stats.is_reset_from(&prev) {
            self.baseline = Some((stats, at));
            self.last_rates = None;
            self.resets += 1;
            return MeterReading::Reset;
        }

        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let secs = elapsed as f64 / 1000.0;
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let rates = TrafficRates {
            upload_bps: (stats.upload_bytes - prev.upload_bytes) as f64 / secs,
            download_bps: (stats.download_bytes - prev.download_bytes) as f64 / secs,
        };

        self.baseline = Some((stats, at));
        self.last_rates = Some(rates);
        MeterReading::Rates(rates)
    }

    /// Most recent derived rates, cleared by a reset.
    pub fn rates(&self) -> Option<TrafficRates> {
        self.last_rates
    }

    /// Number of restarts detected so far.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Forget the baseline, e.g. when the service stops.
    pub fn clear(&mut self) {
        self.baseline = None;
        self.last_rates = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn stats(up: u64, down: u64) -> TrafficStats {
        TrafficStats {
            upload_bytes: up,
            download_bytes: down,
            ..TrafficStats::default()
        }
    }

    #[test]
    fn first_observation_is_baseline() {
        let mut meter = TrafficMeter::new();
        assert_eq!(meter.observe(stats(10, 10), Utc::now()), MeterReading::Baseline);
        assert!(meter.rates().is_none());
    }

    #[test]
    fn derives_rates_from_counter_deltas() {
        let mut meter = TrafficMeter::new();
        let t0 = Utc::now();
        meter.observe(stats(1_000, 4_000), t0);
        let reading = meter.observe(stats(3_000, 8_000), t0 + TimeDelta::seconds(2));
        assert_eq!(
            reading,
            MeterReading::Rates(TrafficRates {
                upload_bps: 1_000.0,
                download_bps: 2_000.0,
            })
        );
    }

    #[test]
    fn counter_decrease_resets_baseline() {
        let mut meter = TrafficMeter::new();
        let t0 = Utc::now();
        meter.observe(stats(5_000, 5_000), t0);
        meter.observe(stats(6_000, 6_000), t0 + TimeDelta::seconds(1));
        assert!(meter.rates().is_some());

        let reading = meter.observe(stats(100, 7_000), t0 + TimeDelta::seconds(2));
        assert_eq!(reading, MeterReading::Reset);
        assert!(meter.rates().is_none());
        assert_eq!(meter.resets(), 1);

        // Rates resume from the new baseline, not the pre-restart one.
        let reading = meter.observe(stats(600, 7_500), t0 + TimeDelta::seconds(3));
        assert_eq!(
            reading,
            MeterReading::Rates(TrafficRates {
                upload_bps: 500.0,
                download_bps: 500.0,
            })
        );
    }

    #[test]
    fn out_of_order_observation_is_ignored() {
        let mut meter = TrafficMeter::new();
        let t0 = Utc::now();
        meter.observe(stats(10, 10), t0);
        assert_eq!(
            meter.observe(stats(5, 5), t0 - TimeDelta::seconds(1)),
            MeterReading::Baseline
        );
    }
}
