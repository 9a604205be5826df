use crate::models::ViolationMap;
use crate::state::Shared;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;

pub const TOPIC_HEALTH: &str = "hydro/monitor/health@v1";

#[derive(Debug, Serialize)]
pub struct MonitorHealth {
    pub uptime_seconds: u64,
    pub rules_loaded: u32,
    pub keys_tracked: u32,
    pub readings_processed: u64,
    pub readings_dropped: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    readings_processed: Arc<AtomicU64>,
    readings_dropped: Arc<AtomicU64>,
    alerts_emitted: Arc<AtomicU64>,
    alerts_suppressed: Arc<AtomicU64>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<parking_lot::Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            readings_processed: Arc::new(AtomicU64::new(0)),
            readings_dropped: Arc::new(AtomicU64::new(0)),
            alerts_emitted: Arc::new(AtomicU64::new(0)),
            alerts_suppressed: Arc::new(AtomicU64::new(0)),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn inc_readings_processed(&self) {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_readings_dropped(&self) {
        self.readings_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_emitted(&self) {
        self.alerts_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, rules_loaded: usize, violations: &Shared<ViolationMap>) -> MonitorHealth {
        MonitorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            rules_loaded: rules_loaded as u32,
            keys_tracked: violations.lock().len() as u32,
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Publication périodique de la santé du moniteur sur le bus.
    pub fn spawn_health_publisher(
        &self,
        client: AsyncClient,
        rules_loaded: usize,
        violations: Shared<ViolationMap>,
    ) {
        let tracker = self.clone();
        task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let health = tracker.get_health(rules_loaded, &violations);
                if let Ok(payload) = serde_json::to_string(&health) {
                    if let Err(e) = client.publish(TOPIC_HEALTH, QoS::AtLeastOnce, false, payload).await {
                        eprintln!("[health] failed to publish: {e:?}");
                    }
                }
            }
        });
    }
}

fn get_memory_usage_mb() -> f32 {
    let pid = std::process::id();

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return (kb as f32) / 1024.0;
                        }
                    }
                }
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    let _ = pid;

    0.0
}
