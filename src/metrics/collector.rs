//! Metrics collection using Prometheus
//!
//! Every metric is registered on a private [`Registry`] so that several
//! collectors (one per test, for instance) can coexist in one process.

use crate::bot::command::CommandKind;
use crate::bot::notifier::DeliveryOutcome;
use crate::registry::expiration::RecordKind;
use crate::registry::sweeper::SweepReport;
use crate::storage::StoreCounts;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the registry service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    command_metrics: CommandMetrics,
    notification_metrics: NotificationMetrics,
    lifecycle_metrics: LifecycleMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Failed store operations
    pub persistence_errors_total: IntCounterVec,
}

/// Command handling metrics
#[derive(Clone)]
pub struct CommandMetrics {
    pub commands_total: IntCounterVec,
    pub rejections_total: IntCounterVec,
    pub searches_created_total: IntCounter,
    pub searches_deleted_total: IntCounter,
    pub command_duration: HistogramVec,
}

/// Outbound direct message metrics
#[derive(Clone)]
pub struct NotificationMetrics {
    /// Deliveries by outcome (sent, suppressed, failed)
    pub notifications_total: IntCounterVec,
}

/// Registry contents and expiration sweeps
#[derive(Clone)]
pub struct LifecycleMetrics {
    pub stored_players: IntGauge,
    pub stored_searches: IntGauge,
    pub sweep_runs_total: IntCounter,
    pub sweep_purged_total: IntCounterVec,
    pub sweep_warnings_total: IntCounterVec,
    pub sweep_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let command_metrics = CommandMetrics::new(&registry)?;
        let notification_metrics = NotificationMetrics::new(&registry)?;
        let lifecycle_metrics = LifecycleMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            command_metrics,
            notification_metrics,
            lifecycle_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn commands(&self) -> &CommandMetrics {
        &self.command_metrics
    }

    pub fn notifications(&self) -> &NotificationMetrics {
        &self.notification_metrics
    }

    pub fn lifecycle(&self) -> &LifecycleMetrics {
        &self.lifecycle_metrics
    }

    /// Record a handled command and how long it took
    pub fn record_command(&self, kind: CommandKind, rejected: bool, duration: Duration) {
        let label = kind.label();
        self.command_metrics
            .commands_total
            .with_label_values(&[label])
            .inc();

        if rejected {
            self.command_metrics
                .rejections_total
                .with_label_values(&[label])
                .inc();
        }

        self.command_metrics
            .command_duration
            .with_label_values(&[label])
            .observe(duration.as_secs_f64());
    }

    pub fn record_search_created(&self) {
        self.command_metrics.searches_created_total.inc();
    }

    pub fn record_searches_deleted(&self, count: usize) {
        self.command_metrics
            .searches_deleted_total
            .inc_by(count as u64);
    }

    pub fn record_notification(&self, outcome: DeliveryOutcome) {
        self.notification_metrics
            .notifications_total
            .with_label_values(&[outcome.label()])
            .inc();
    }

    pub fn record_persistence_error(&self, operation: &str) {
        self.service_metrics
            .persistence_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record the outcome of one expiration sweep
    pub fn record_sweep(&self, report: &SweepReport, duration: Duration) {
        self.lifecycle_metrics.sweep_runs_total.inc();
        self.lifecycle_metrics
            .sweep_duration
            .observe(duration.as_secs_f64());

        let stats = &report.stats;
        for (kind, purged, expiring) in [
            (
                RecordKind::Player,
                stats.players_purged,
                stats.players_expiring,
            ),
            (
                RecordKind::Search,
                stats.searches_purged,
                stats.searches_expiring,
            ),
        ] {
            let label = record_kind_label(kind);
            self.lifecycle_metrics
                .sweep_purged_total
                .with_label_values(&[label])
                .inc_by(purged as u64);
            self.lifecycle_metrics
                .sweep_warnings_total
                .with_label_values(&[label])
                .inc_by(expiring as u64);
        }
    }

    pub fn update_store_counts(&self, counts: StoreCounts) {
        self.lifecycle_metrics
            .stored_players
            .set(counts.players as i64);
        self.lifecycle_metrics
            .stored_searches
            .set(counts.searches as i64);
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }
}

fn record_kind_label(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Player => "player",
        RecordKind::Search => "search",
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("lfg_registry_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "lfg_registry_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("lfg_registry_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "lfg_registry_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("lfg_registry_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let persistence_errors_total = IntCounterVec::new(
            Opts::new(
                "lfg_registry_persistence_errors_total",
                "Failed store operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(persistence_errors_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
            persistence_errors_total,
        })
    }
}

impl CommandMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let commands_total = IntCounterVec::new(
            Opts::new("lfg_registry_commands_total", "Direct message commands handled"),
            &["command"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "lfg_registry_rejections_total",
                "Commands rejected by validation",
            ),
            &["command"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let searches_created_total = IntCounter::new(
            "lfg_registry_searches_created_total",
            "Searches stored for notification",
        )?;
        registry.register(Box::new(searches_created_total.clone()))?;

        let searches_deleted_total = IntCounter::new(
            "lfg_registry_searches_deleted_total",
            "Searches deleted by their owner",
        )?;
        registry.register(Box::new(searches_deleted_total.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "lfg_registry_command_duration_seconds",
                "Command handling time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        Ok(Self {
            commands_total,
            rejections_total,
            searches_created_total,
            searches_deleted_total,
            command_duration,
        })
    }
}

impl NotificationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let notifications_total = IntCounterVec::new(
            Opts::new(
                "lfg_registry_notifications_total",
                "Outbound direct messages by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            notifications_total,
        })
    }
}

impl LifecycleMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let stored_players =
            IntGauge::new("lfg_registry_stored_players", "Player profiles in the store")?;
        registry.register(Box::new(stored_players.clone()))?;

        let stored_searches =
            IntGauge::new("lfg_registry_stored_searches", "Searches in the store")?;
        registry.register(Box::new(stored_searches.clone()))?;

        let sweep_runs_total =
            IntCounter::new("lfg_registry_sweep_runs_total", "Expiration sweeps run")?;
        registry.register(Box::new(sweep_runs_total.clone()))?;

        let sweep_purged_total = IntCounterVec::new(
            Opts::new(
                "lfg_registry_sweep_purged_total",
                "Records deleted by expiration sweeps",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(sweep_purged_total.clone()))?;

        let sweep_warnings_total = IntCounterVec::new(
            Opts::new(
                "lfg_registry_sweep_warnings_total",
                "Expiring records reported by sweeps",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(sweep_warnings_total.clone()))?;

        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new("lfg_registry_sweep_duration_seconds", "Sweep duration")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(sweep_duration.clone()))?;

        Ok(Self {
            stored_players,
            stored_searches,
            sweep_runs_total,
            sweep_purged_total,
            sweep_warnings_total,
            sweep_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::sweeper::SweepStats;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _commands = collector.commands();
        let _notifications = collector.notifications();
        let _lifecycle = collector.lifecycle();
    }

    #[test]
    fn test_two_collectors_do_not_collide() {
        let first = MetricsCollector::new();
        let second = MetricsCollector::new();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    fn test_command_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_command(CommandKind::Search, false, Duration::from_millis(2));
        collector.record_command(CommandKind::Search, true, Duration::from_millis(1));
        collector.record_command(CommandKind::Role, true, Duration::from_millis(1));

        let commands = collector.commands();
        assert_eq!(
            commands.commands_total.with_label_values(&["search"]).get(),
            2
        );
        assert_eq!(
            commands.rejections_total.with_label_values(&["search"]).get(),
            1
        );
        assert_eq!(
            commands.rejections_total.with_label_values(&["role"]).get(),
            1
        );
    }

    #[test]
    fn test_notification_outcomes() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_notification(DeliveryOutcome::Sent);
        collector.record_notification(DeliveryOutcome::Sent);
        collector.record_notification(DeliveryOutcome::Suppressed);

        let notifications = &collector.notifications().notifications_total;
        assert_eq!(notifications.with_label_values(&["sent"]).get(), 2);
        assert_eq!(notifications.with_label_values(&["suppressed"]).get(), 1);
        assert_eq!(notifications.with_label_values(&["failed"]).get(), 0);
    }

    #[test]
    fn test_sweep_and_store_counts() {
        let collector = MetricsCollector::new().unwrap();
        let report = SweepReport {
            entries: Vec::new(),
            stats: SweepStats {
                players_purged: 2,
                searches_purged: 1,
                players_expiring: 3,
                searches_expiring: 0,
            },
        };
        collector.record_sweep(&report, Duration::from_millis(5));
        collector.update_store_counts(StoreCounts {
            players: 10,
            searches: 4,
        });

        let lifecycle = collector.lifecycle();
        assert_eq!(lifecycle.sweep_runs_total.get(), 1);
        assert_eq!(
            lifecycle.sweep_purged_total.with_label_values(&["player"]).get(),
            2
        );
        assert_eq!(
            lifecycle
                .sweep_warnings_total
                .with_label_values(&["player"])
                .get(),
            3
        );
        assert_eq!(lifecycle.stored_players.get(), 10);
        assert_eq!(lifecycle.stored_searches.get(), 4);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("store", true);
        collector.update_component_health("amqp", false);
        assert_eq!(collector.service().health_status.get(), 2);
        assert_eq!(
            collector
                .service()
                .component_health
                .with_label_values(&["amqp"])
                .get(),
            0
        );
    }
}
