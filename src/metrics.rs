//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::world::TickReport;

/// Samples kept for tick-time percentiles
const TICK_HISTORY: usize = 1000;

/// Metrics registry for the sync server
#[derive(Debug)]
pub struct Metrics {
    // Sessions
    pub sessions_active: AtomicU64,
    pub sessions_loaded: AtomicU64,
    pub sessions_initialized: AtomicU64,
    pub sessions_resumed: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub budget_usage_percent: AtomicU64,
    pub tick_count: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub player_info_sent: AtomicU64,
    pub player_info_bytes: AtomicU64,
    pub appearance_updates: AtomicU64,

    // Errors
    pub unknown_opcodes: AtomicU64,
    pub decode_errors: AtomicU64,
    pub encode_failures: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            sessions_loaded: AtomicU64::new(0),
            sessions_initialized: AtomicU64::new(0),
            sessions_resumed: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            player_info_sent: AtomicU64::new(0),
            player_info_bytes: AtomicU64::new(0),
            appearance_updates: AtomicU64::new(0),
            unknown_opcodes: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Fold one tick's report into the counters
    pub fn record_tick(&self, report: &TickReport, budget: Duration) {
        self.record_tick_time(report.duration);

        let budget_us = budget.as_micros().max(1) as u64;
        let used = report.duration.as_micros() as u64 * 100 / budget_us;
        self.budget_usage_percent.store(used, Ordering::Relaxed);

        self.sessions_active.store(report.sessions as u64, Ordering::Relaxed);
        self.sessions_loaded.store(report.loaded as u64, Ordering::Relaxed);
        self.sessions_initialized.fetch_add(report.initialized as u64, Ordering::Relaxed);
        self.sessions_resumed.fetch_add(report.resynced as u64, Ordering::Relaxed);
        self.player_info_sent.fetch_add(report.player_info_sent as u64, Ordering::Relaxed);
        self.player_info_bytes.fetch_add(report.bytes_sent as u64, Ordering::Relaxed);
        self.appearance_updates.fetch_add(report.appearance_updates as u64, Ordering::Relaxed);
        self.unknown_opcodes.fetch_add(report.inbound.unknown as u64, Ordering::Relaxed);
        self.decode_errors.fetch_add(report.inbound.malformed as u64, Ordering::Relaxed);
        self.encode_failures.fetch_add(report.failures as u64, Ordering::Relaxed);
    }

    /// Count one message written to a socket
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("rt5_sync_sessions_active", "Sessions in the world", "gauge",
            self.sessions_active.load(Ordering::Relaxed));
        metric!("rt5_sync_sessions_loaded", "Sessions receiving player info", "gauge",
            self.sessions_loaded.load(Ordering::Relaxed));
        metric!("rt5_sync_sessions_initialized_total", "Sessions sent a full map rebuild", "counter",
            self.sessions_initialized.load(Ordering::Relaxed));
        metric!("rt5_sync_sessions_resumed_total", "Sessions resynced after reconnecting", "counter",
            self.sessions_resumed.load(Ordering::Relaxed));

        metric!("rt5_sync_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("rt5_sync_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("rt5_sync_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("rt5_sync_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("rt5_sync_budget_usage_percent", "Tick budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));
        metric!("rt5_sync_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("rt5_sync_connections_active", "Open TCP connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("rt5_sync_messages_sent_total", "Messages written to clients", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("rt5_sync_messages_received_total", "Frames received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("rt5_sync_bytes_sent_total", "Bytes written to clients", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("rt5_sync_bytes_received_total", "Frame bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("rt5_sync_player_info_sent_total", "Player info messages encoded", "counter",
            self.player_info_sent.load(Ordering::Relaxed));
        metric!("rt5_sync_player_info_bytes_total", "Player info bytes encoded", "counter",
            self.player_info_bytes.load(Ordering::Relaxed));
        metric!("rt5_sync_appearance_updates_total", "Appearance blocks sent", "counter",
            self.appearance_updates.load(Ordering::Relaxed));

        metric!("rt5_sync_unknown_opcodes_total", "Frames with an unhandled opcode", "counter",
            self.unknown_opcodes.load(Ordering::Relaxed));
        metric!("rt5_sync_decode_errors_total", "Frames dropped as malformed", "counter",
            self.decode_errors.load(Ordering::Relaxed));
        metric!("rt5_sync_encode_failures_total", "Sessions dropped after a failed tick unit", "counter",
            self.encode_failures.load(Ordering::Relaxed));

        metric!("rt5_sync_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "sessions": {
                "active": load(&self.sessions_active),
                "loaded": load(&self.sessions_loaded),
                "initialized": load(&self.sessions_initialized),
                "resumed": load(&self.sessions_resumed),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "budget_percent": load(&self.budget_usage_percent),
                "tick_count": load(&self.tick_count),
            },
            "network": {
                "connections": load(&self.connections_active),
                "messages_sent": load(&self.messages_sent),
                "messages_received": load(&self.messages_received),
                "bytes_sent": load(&self.bytes_sent),
                "bytes_received": load(&self.bytes_received),
                "player_info_sent": load(&self.player_info_sent),
                "player_info_bytes": load(&self.player_info_bytes),
                "appearance_updates": load(&self.appearance_updates),
            },
            "errors": {
                "unknown_opcodes": load(&self.unknown_opcodes),
                "decode_errors": load(&self.decode_errors),
                "encode_failures": load(&self.encode_failures),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Response for one request line
fn route(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics") => http_response("text/plain; version=0.0.4", &metrics.to_prometheus()),
        Some("/metrics/json") => http_response("application/json", &metrics.to_json()),
        Some("/health") | Some("/") => http_response("text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::commands::InboundStats;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1040);
        assert!(metrics.tick_time_p99_us.load(Ordering::Relaxed) >= metrics.tick_time_p95_us.load(Ordering::Relaxed));
    }

    #[test]
    fn test_history_is_bounded() {
        let metrics = Metrics::new();
        for _ in 0..TICK_HISTORY + 50 {
            metrics.record_tick_time(Duration::from_micros(5));
        }
        assert_eq!(metrics.tick_history.read().len(), TICK_HISTORY);
    }

    #[test]
    fn test_record_tick_report() {
        let metrics = Metrics::new();
        let report = TickReport {
            sessions: 3,
            loaded: 2,
            initialized: 1,
            player_info_sent: 2,
            bytes_sent: 1500,
            inbound: InboundStats { handled: 4, unknown: 2, malformed: 1 },
            duration: Duration::from_millis(60),
            ..Default::default()
        };
        metrics.record_tick(&report, Duration::from_millis(600));
        metrics.record_tick(&report, Duration::from_millis(600));

        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.sessions_initialized.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.player_info_sent.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.player_info_bytes.load(Ordering::Relaxed), 3000);
        // Wire totals are counted by the socket writers, not the tick
        assert_eq!(metrics.messages_sent.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.unknown_opcodes.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.decode_errors.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.budget_usage_percent.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_record_sent() {
        let metrics = Metrics::new();
        metrics.record_sent(3);
        metrics.record_sent(1);
        assert_eq!(metrics.messages_sent.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.sessions_active.store(50, Ordering::Relaxed);
        metrics.unknown_opcodes.store(5, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("rt5_sync_sessions_active 50"));
        assert!(output.contains("rt5_sync_unknown_opcodes_total 5"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.sessions_active.store(100, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["sessions"]["active"], 100);
        assert!(value["performance"].is_object());
        assert!(value["errors"].is_object());
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(route(&metrics, "GET /metrics HTTP/1.1\r\n\r\n").contains("rt5_sync_tick_count"));
        assert!(route(&metrics, "GET /metrics/json HTTP/1.1\r\n\r\n").contains("application/json"));
        assert!(route(&metrics, "GET /health HTTP/1.1\r\n\r\n").ends_with("OK"));
        assert!(route(&metrics, "GET /nope HTTP/1.1\r\n\r\n").starts_with("HTTP/1.1 404"));
        assert!(route(&metrics, "POST /metrics HTTP/1.1\r\n\r\n").starts_with("HTTP/1.1 404"));
    }
}
