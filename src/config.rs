use crate::models::{Metric, RuleTable, Severity, ThresholdRule, Tower};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    /// Fenêtre de cooldown entre deux alertes pour une même violation.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: f64,
    /// Notifier aussi le retour en plage normale (résolution d'une violation).
    #[serde(default)]
    pub notify_on_recovery: bool,
    #[serde(default = "stock_rules")]
    pub rules: HashMap<Tower, HashMap<Metric, ThresholdRule>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            cooldown_minutes: default_cooldown_minutes(),
            notify_on_recovery: false,
            rules: stock_rules(),
        }
    }
}

fn default_cooldown_minutes() -> f64 {
    120.0
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cooldown_minutes invalide: {0} (doit être fini et > 0)")]
    InvalidCooldown(f64),
    #[error("règle invalide pour {tower}/{metric}: {reason}")]
    InvalidRule {
        tower: &'static str,
        metric: &'static str,
        reason: String,
    },
}

impl MonitorConfig {
    /// Refuse de démarrer avec une config qui rendrait le debounce indéfini.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cooldown_minutes.is_finite() || self.cooldown_minutes <= 0.0 {
            return Err(ConfigError::InvalidCooldown(self.cooldown_minutes));
        }
        for (tower, metrics) in &self.rules {
            for (metric, rule) in metrics {
                if !rule.low.is_finite() || !rule.high.is_finite() {
                    return Err(ConfigError::InvalidRule {
                        tower: tower.label(),
                        metric: metric.label(),
                        reason: format!("bornes non finies ({}, {})", rule.low, rule.high),
                    });
                }
                if rule.low > rule.high {
                    return Err(ConfigError::InvalidRule {
                        tower: tower.label(),
                        metric: metric.label(),
                        reason: format!("low {} > high {}", rule.low, rule.high),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> time::Duration {
        time::Duration::seconds_f64(self.cooldown_minutes * 60.0)
    }

    /// Aplatit tour → grandeur → règle en table indexée par clé (tour, grandeur).
    pub fn flat_rules(&self) -> RuleTable {
        let mut table = RuleTable::new();
        for (tower, metrics) in &self.rules {
            for (metric, rule) in metrics {
                table.insert((*tower, *metric), rule.clone());
            }
        }
        table
    }
}

pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("HYDROMON_CONFIG").unwrap_or_else(|_| "monitor.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return MonitorConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[monitor] config invalide: {e}");
            MonitorConfig::default()
        })
    } else {
        eprintln!("[monitor] pas de monitor.yaml, usage config par défaut");
        MonitorConfig::default()
    }
}

fn rule(low: f64, high: f64, unit: &str, severity: Severity, suggestion: &str) -> ThresholdRule {
    ThresholdRule {
        low,
        high,
        unit: unit.into(),
        severity,
        suggestion: suggestion.into(),
    }
}

/// Seuils d'usine des deux tours (laitue/aneth côté cool, basilic/origan côté warm).
fn stock_rules() -> HashMap<Tower, HashMap<Metric, ThresholdRule>> {
    let cool = HashMap::from([
        (
            Metric::Ec,
            rule(1.2, 1.8, "mS/cm", Severity::Medium,
                "Add 5g Lettuce Fertilizer 8-15-36 if low; dilute with RO water if high"),
        ),
        (
            Metric::Ph,
            rule(5.8, 6.2, "", Severity::High,
                "Add pH Down if high. If low, check probe calibration"),
        ),
        (
            Metric::WaterTemp,
            rule(50.0, 75.0, "°F", Severity::High,
                "Cool reservoir - low oxygen risk. Check air stones"),
        ),
        (
            Metric::AirTemp,
            rule(55.0, 70.0, "°F", Severity::Medium,
                "Reduce heat. Consider dimming LEDs to 50%. Heat stress risk for lettuce/dill"),
        ),
        (
            Metric::Humidity,
            rule(50.0, 70.0, "%", Severity::Medium,
                "Low: tip burn risk for lettuce. High: increase air flow, mold risk"),
        ),
    ]);
    let warm = HashMap::from([
        (
            Metric::Ec,
            rule(1.5, 2.0, "mS/cm", Severity::Medium,
                "Add small scoop MaxiGrow (~5g) if low; dilute with RO water if high"),
        ),
        (
            Metric::Ph,
            rule(5.8, 6.2, "", Severity::High,
                "Add pH Down if high. If low, check probe calibration"),
        ),
        (
            Metric::WaterTemp,
            rule(50.0, 75.0, "°F", Severity::High,
                "Cool reservoir - low oxygen risk. Check air stones"),
        ),
        (
            Metric::AirTemp,
            rule(70.0, 80.0, "°F", Severity::Medium,
                "Reduce heat. Heat stress risk for basil/oregano"),
        ),
        (
            Metric::Humidity,
            rule(50.0, 60.0, "%", Severity::Medium,
                "Low: increase humidity. High: increase air flow, disease risk for basil"),
        ),
    ]);
    HashMap::from([(Tower::Cool, cool), (Tower::Warm, warm)])
}
