use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Les deux tours hydroponiques surveillées.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tower {
    Cool,
    Warm,
}

impl Tower {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cool" => Some(Tower::Cool),
            "warm" => Some(Tower::Warm),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tower::Cool => "cool",
            Tower::Warm => "warm",
        }
    }

    /// Nom affiché dans les messages d'alerte ("Cool Tower", "Warm Tower").
    pub fn display_name(&self) -> &'static str {
        match self {
            Tower::Cool => "Cool Tower",
            Tower::Warm => "Warm Tower",
        }
    }
}

/// Grandeurs capteur reconnues par le moniteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Ec,
    Ph,
    WaterTemp,
    AirTemp,
    Humidity,
}

impl Metric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ec" => Some(Metric::Ec),
            "ph" => Some(Metric::Ph),
            "water_temp" => Some(Metric::WaterTemp),
            "air_temp" => Some(Metric::AirTemp),
            "humidity" => Some(Metric::Humidity),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Ec => "ec",
            Metric::Ph => "ph",
            Metric::WaterTemp => "water_temp",
            Metric::AirTemp => "air_temp",
            Metric::Humidity => "humidity",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Metric::Ec => "EC",
            Metric::Ph => "pH",
            Metric::WaterTemp => "Water temp",
            Metric::AirTemp => "Air temp",
            Metric::Humidity => "Humidity",
        }
    }

    /// Formatage de la valeur selon la grandeur (EC/pH en centièmes, le reste en dixièmes).
    pub fn format_value(&self, value: f64) -> String {
        match self {
            Metric::Ec | Metric::Ph => format!("{value:.2}"),
            _ => format!("{value:.1}"),
        }
    }
}

/// Clé de suivi : une grandeur sur une tour.
pub type MetricKey = (Tower, Metric);

/// Résultat de l'évaluation d'une lecture contre sa règle de seuil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Ok,
    BelowRange,
    AboveRange,
}

impl Classification {
    pub fn is_violation(&self) -> bool {
        !matches!(self, Classification::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Une observation capteur validée. Immuable, jetée après évaluation.
#[derive(Debug, Clone, Copy)]
pub struct MetricReading {
    pub tower: Tower,
    pub metric: Metric,
    pub value: f64,
    pub observed_at: OffsetDateTime,
}

/// Règle de seuil statique pour une clé (tour, grandeur).
/// Bornes fermées : une valeur exactement égale à low ou high est dans la plage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub unit: String,
    pub severity: Severity,
    pub suggestion: String,
}

/// Table aplatie des règles, construite une fois au démarrage puis lecture seule.
pub type RuleTable = HashMap<MetricKey, ThresholdRule>;

/// État de violation courant d'une clé, muté exclusivement par le debouncer.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationState {
    pub status: Classification,
    #[serde(with = "time::serde::rfc3339")]
    pub since: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_alert: Option<OffsetDateTime>,
}

pub type ViolationMap = HashMap<MetricKey, ViolationState>;

/// Dernière valeur vue pour une clé (cache exposé par l'API REST).
#[derive(Debug, Clone, Copy)]
pub struct LatestReading {
    pub value: f64,
    pub observed_at: OffsetDateTime,
}

pub type ReadingsMap = HashMap<MetricKey, LatestReading>;

/// Demande de notification émise par le debouncer vers l'expéditeur externe.
#[derive(Debug, Clone, Serialize)]
pub struct AlertNotification {
    pub id: String,
    pub tower: Tower,
    pub metric: Metric,
    pub classification: Classification,
    pub value: f64,
    pub severity: Severity,
    pub suggestion: String,
    /// Ligne unique pré-formatée pour la passerelle SMS (budget 160 caractères).
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
}
