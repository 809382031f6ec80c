use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, GaugeVec,
    IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use lazy_static::lazy_static;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;

/// agent 自身的运行指标，只写不读，不影响协议响应
pub struct MetricsRegistry {
    registry: Registry,

    // Gauge metrics
    pub active_connections: IntGauge,
    pub proc_sample_duration: GaugeVec,
    pub proc_sampled_processes: GaugeVec,

    // Counter metrics
    pub connections_total: IntCounter,
    pub commands_total: IntCounterVec,
    pub command_failures_total: IntCounterVec,
    pub protocol_errors_total: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        let registry = Registry::new_custom(None, Some([("hostname".to_string(), hostname)].into()))
            .expect("static registry labels are valid");

        #[cfg(target_os = "linux")]
        {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            if let Err(e) = registry.register(Box::new(collector)) {
                log::warn!("Failed to register process collector: {}", e);
            }
        }

        let active_connections = register_int_gauge_with_registry!(
            Opts::new("agent_active_connections", "Currently open protocol connections"),
            registry
        ).unwrap();

        let proc_sample_duration = register_gauge_vec_with_registry!(
            Opts::new("agent_proc_sample_duration_seconds", "Duration of the last sampling call per group"),
            &["group"],
            registry
        ).unwrap();

        let proc_sampled_processes = register_gauge_vec_with_registry!(
            Opts::new("agent_proc_sampled_processes", "Processes reported by the last sampling call per group"),
            &["group"],
            registry
        ).unwrap();

        let connections_total = register_int_counter_with_registry!(
            Opts::new("agent_connections_total", "Accepted protocol connections"),
            registry
        ).unwrap();

        let commands_total = register_int_counter_vec_with_registry!(
            Opts::new("agent_commands_total", "Executed commands by kind"),
            &["kind"],
            registry
        ).unwrap();

        let command_failures_total = register_int_counter_vec_with_registry!(
            Opts::new("agent_command_failures_total", "Failed commands by kind"),
            &["kind"],
            registry
        ).unwrap();

        let protocol_errors_total = register_int_counter_with_registry!(
            Opts::new("agent_protocol_errors_total", "Request lines dropped because they could not be decoded"),
            registry
        ).unwrap();

        Self {
            registry,
            active_connections,
            proc_sample_duration,
            proc_sampled_processes,
            connections_total,
            commands_total,
            command_failures_total,
            protocol_errors_total,
        }
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_command(&self, kind: &str) {
        self.commands_total.with_label_values(&[kind]).inc();
    }

    pub fn record_failure(&self, kind: &str) {
        self.command_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn record_sample(&self, group: &str, elapsed: Duration, processes: usize) {
        self.proc_sample_duration
            .with_label_values(&[group])
            .set(elapsed.as_secs_f64());
        self.proc_sampled_processes
            .with_label_values(&[group])
            .set(processes as f64);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
