use crate::models::{Metric, MetricReading, Tower};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

/// Message brut tel que reçu de l'extérieur, avant validation.
/// Le timestamp est optionnel et vaut l'heure d'arrivée par défaut.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    pub tower: String,
    pub metric: String,
    pub value: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("tour inconnue: {0:?}")]
    UnknownTower(String),
    #[error("grandeur inconnue: {0:?}")]
    UnknownMetric(String),
    #[error("valeur non finie: {0}")]
    NonFiniteValue(f64),
    #[error("payload illisible: {0}")]
    BadPayload(String),
    #[error("topic non reconnu: {0:?}")]
    UnknownTopic(String),
}

/// Valide un message brut en lecture exploitable. Les messages rejetés sont
/// jetés par l'appelant avec un warning, jamais fatals.
pub fn ingest_raw(raw: RawReading, arrived_at: OffsetDateTime) -> Result<MetricReading, IngestError> {
    let tower = Tower::parse(&raw.tower).ok_or_else(|| IngestError::UnknownTower(raw.tower.clone()))?;
    let metric = Metric::parse(&raw.metric).ok_or_else(|| IngestError::UnknownMetric(raw.metric.clone()))?;
    if !raw.value.is_finite() {
        return Err(IngestError::NonFiniteValue(raw.value));
    }
    Ok(MetricReading {
        tower,
        metric,
        value: raw.value,
        observed_at: raw.timestamp.unwrap_or(arrived_at),
    })
}

/// Payload JSON optionnel des firmwares récents : `{"value": 6.1, "ts": "..."}`.
/// Les anciens firmwares publient un float nu.
#[derive(Debug, Deserialize)]
struct JsonPayload {
    value: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    ts: Option<OffsetDateTime>,
}

fn decode_payload(payload: &str) -> Result<(f64, Option<OffsetDateTime>), IngestError> {
    let trimmed = payload.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Ok((v, None));
    }
    match serde_json::from_str::<JsonPayload>(trimmed) {
        Ok(p) => Ok((p.value, p.ts)),
        Err(_) => Err(IngestError::BadPayload(trimmed.to_string())),
    }
}

/// Décompose un topic capteur en (tours concernées, grandeur).
/// Les topics `/environment/*` s'appliquent aux deux tours, comme les
/// sondes d'ambiance partagées de la tente.
fn parse_topic(topic: &str) -> Result<(Vec<Tower>, &str), IngestError> {
    let mut parts = topic.trim_start_matches('/').splitn(2, '/');
    let (Some(source), Some(sensor)) = (parts.next(), parts.next()) else {
        return Err(IngestError::UnknownTopic(topic.to_string()));
    };
    let towers = match source {
        "cool_tower" => vec![Tower::Cool],
        "warm_tower" => vec![Tower::Warm],
        "environment" => vec![Tower::Cool, Tower::Warm],
        _ => return Err(IngestError::UnknownTopic(topic.to_string())),
    };
    Ok((towers, sensor))
}

/// Transforme un message MQTT (topic + payload) en lectures validées.
pub fn readings_from_topic(
    topic: &str,
    payload: &str,
    arrived_at: OffsetDateTime,
) -> Result<Vec<MetricReading>, IngestError> {
    let (towers, sensor) = parse_topic(topic)?;
    let (value, ts) = decode_payload(payload)?;
    towers
        .into_iter()
        .map(|tower| {
            ingest_raw(
                RawReading {
                    tower: tower.label().to_string(),
                    metric: sensor.to_string(),
                    value,
                    timestamp: ts,
                },
                arrived_at,
            )
        })
        .collect()
}
