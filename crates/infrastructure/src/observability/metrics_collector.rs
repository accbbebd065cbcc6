//! Metrics collector for the job scheduler
//!
//! Counter and histogram handles are registered once; labelled series are
//! resolved on each call through the `metrics` macros.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use scheduler_core::models::TriggerType;

pub struct MetricsCollector {
    schedule_rounds_total: Counter,
    schedule_round_duration: Histogram,
    ring_jobs_pushed_total: Counter,
    missed_triggers_total: Counter,
    slow_triggers_total: Counter,
    callbacks_received_total: Counter,
    registry_addresses: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            schedule_rounds_total: counter!("scheduler_schedule_rounds_total"),
            schedule_round_duration: histogram!("scheduler_schedule_round_duration_seconds"),
            ring_jobs_pushed_total: counter!("scheduler_ring_jobs_pushed_total"),
            missed_triggers_total: counter!("scheduler_missed_triggers_total"),
            slow_triggers_total: counter!("scheduler_slow_triggers_total"),
            callbacks_received_total: counter!("scheduler_callbacks_received_total"),
            registry_addresses: gauge!("scheduler_registry_addresses"),
        }
    }

    pub fn record_schedule_round(&self, duration_seconds: f64, pushed: usize, missed: usize) {
        self.schedule_rounds_total.increment(1);
        self.schedule_round_duration.record(duration_seconds);
        self.ring_jobs_pushed_total.increment(pushed as u64);
        self.missed_triggers_total.increment(missed as u64);
    }

    pub fn record_trigger(&self, trigger_type: TriggerType, success: bool) {
        let result = if success { "success" } else { "fail" };
        counter!(
            "scheduler_triggers_total",
            "trigger_type" => format!("{trigger_type:?}"),
            "result" => result
        )
        .increment(1);
    }

    pub fn record_slow_trigger(&self) {
        self.slow_triggers_total.increment(1);
    }

    pub fn record_pool_rejection(&self, pool: &'static str) {
        counter!("scheduler_trigger_pool_rejections_total", "pool" => pool).increment(1);
    }

    pub fn record_callback(&self, handle_code: i32) {
        self.callbacks_received_total.increment(1);
        counter!(
            "scheduler_callback_results_total",
            "code" => handle_code.to_string()
        )
        .increment(1);
    }

    pub fn record_alarm(&self, outcome: &'static str) {
        counter!("scheduler_alarms_total", "outcome" => outcome).increment(1);
    }

    pub fn record_retry_trigger(&self) {
        counter!("scheduler_retry_triggers_total").increment(1);
    }

    pub fn set_registry_addresses(&self, count: usize) {
        self.registry_addresses.set(count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = MetricsCollector::new();
        metrics.record_schedule_round(0.01, 3, 1);
        metrics.record_trigger(TriggerType::Cron, true);
        metrics.record_pool_rejection("fast");
        metrics.record_callback(200);
        metrics.record_alarm("sent");
        metrics.set_registry_addresses(2);
    }
}
