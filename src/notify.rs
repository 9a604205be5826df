use crate::models::{AlertNotification, Classification, MetricReading, ThresholdRule};
use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

/// Topic de publication des demandes de notification. La passerelle SMS
/// (service externe) s'y abonne et gère la livraison elle-même.
pub const TOPIC_ALERTS: &str = "hydro/alerts@v1";

/// Longueur max d'un SMS standard, la passerelle tronque au-delà.
const SMS_BUDGET: usize = 160;

/// Expéditeur de notifications. Le moniteur n'attend qu'un send → succès/échec,
/// sans retry ni confirmation de livraison de son côté.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &AlertNotification) -> Result<()>;
}

/// Expéditeur de production : publie l'alerte en JSON sur le bus MQTT.
pub struct MqttNotifier {
    client: AsyncClient,
}

impl MqttNotifier {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn send(&self, alert: &AlertNotification) -> Result<()> {
        let payload = serde_json::to_string(alert)?;
        self.client
            .publish(TOPIC_ALERTS, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Construit la demande de notification complète pour une transition d'état.
pub fn build_notification(
    reading: &MetricReading,
    classification: Classification,
    rule: &ThresholdRule,
    now: OffsetDateTime,
) -> AlertNotification {
    AlertNotification {
        id: Uuid::new_v4().to_string(),
        tower: reading.tower,
        metric: reading.metric,
        classification,
        value: reading.value,
        severity: rule.severity,
        suggestion: rule.suggestion.clone(),
        message: format_message(reading, classification, rule, now),
        ts: now,
    }
}

/// Ligne SMS : "Cool Tower: pH high: 6.80 (target 5.8-6.2) | Add pH Down | 08/28 14:05"
/// Priorité si dépassement du budget : problème > suggestion > horodatage.
fn format_message(
    reading: &MetricReading,
    classification: Classification,
    rule: &ThresholdRule,
    now: OffsetDateTime,
) -> String {
    let name = reading.metric.display_name();
    let value = reading.metric.format_value(reading.value);
    let unit = unit_suffix(&rule.unit);
    let issue = match classification {
        Classification::BelowRange => {
            format!("{name} low: {value}{unit} (target {}-{})", rule.low, rule.high)
        }
        Classification::AboveRange => {
            format!("{name} high: {value}{unit} (target {}-{})", rule.low, rule.high)
        }
        Classification::Ok => format!("{name} back in range: {value}{unit}"),
    };

    let stamp = now
        .format(format_description!("[month]/[day] [hour]:[minute]"))
        .unwrap_or_default();
    let issue = truncate(&issue, 60);
    let suggestion = truncate(&rule.suggestion, 70);

    let mut message = format!("{}: {issue} | {suggestion} | {stamp}", reading.tower.display_name());
    if message.chars().count() > SMS_BUDGET {
        let short = truncate(&rule.suggestion, 30);
        message = format!("{}: {issue} | {short} | {stamp}", reading.tower.display_name());
    }
    if message.chars().count() > SMS_BUDGET {
        message = message.chars().take(SMS_BUDGET).collect();
    }
    message
}

/// " mS/cm" mais "°F" et "%" collés à la valeur, comme sur les anciens SMS.
fn unit_suffix(unit: &str) -> String {
    match unit.chars().next() {
        None => String::new(),
        Some(c) if c.is_ascii_alphabetic() => format!(" {unit}"),
        Some(_) => unit.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, Severity, Tower};
    use time::macros::datetime;

    fn ph_rule() -> ThresholdRule {
        ThresholdRule {
            low: 5.8,
            high: 6.2,
            unit: String::new(),
            severity: Severity::High,
            suggestion: "Add pH Down".into(),
        }
    }

    fn reading(value: f64) -> MetricReading {
        MetricReading {
            tower: Tower::Cool,
            metric: Metric::Ph,
            value,
            observed_at: datetime!(2026-08-28 14:05 UTC),
        }
    }

    #[test]
    fn test_above_range_message() {
        let msg = format_message(
            &reading(6.8),
            Classification::AboveRange,
            &ph_rule(),
            datetime!(2026-08-28 14:05 UTC),
        );
        assert_eq!(msg, "Cool Tower: pH high: 6.80 (target 5.8-6.2) | Add pH Down | 08/28 14:05");
    }

    #[test]
    fn test_recovery_message() {
        let msg = format_message(
            &reading(6.0),
            Classification::Ok,
            &ph_rule(),
            datetime!(2026-08-28 14:05 UTC),
        );
        assert!(msg.contains("pH back in range: 6.00"));
    }

    #[test]
    fn test_unit_spacing() {
        let mut rule = ph_rule();
        rule.unit = "mS/cm".into();
        let r = MetricReading { metric: Metric::Ec, value: 1.05, ..reading(0.0) };
        let msg = format_message(&r, Classification::BelowRange, &rule, datetime!(2026-08-28 14:05 UTC));
        assert!(msg.contains("EC low: 1.05 mS/cm"));

        rule.unit = "°F".into();
        let r = MetricReading { metric: Metric::WaterTemp, value: 76.5, ..reading(0.0) };
        let msg = format_message(&r, Classification::AboveRange, &rule, datetime!(2026-08-28 14:05 UTC));
        assert!(msg.contains("Water temp high: 76.5°F"));
    }

    #[test]
    fn test_sms_budget_respected() {
        let mut rule = ph_rule();
        rule.suggestion = "a very long suggestion ".repeat(20);
        let msg = format_message(
            &reading(6.8),
            Classification::AboveRange,
            &rule,
            datetime!(2026-08-28 14:05 UTC),
        );
        assert!(msg.chars().count() <= SMS_BUDGET);
        // le problème lui-même survit au rognage
        assert!(msg.contains("pH high"));
    }

    #[test]
    fn test_build_notification_carries_rule_context() {
        let alert = build_notification(
            &reading(6.8),
            Classification::AboveRange,
            &ph_rule(),
            datetime!(2026-08-28 14:05 UTC),
        );
        assert_eq!(alert.tower, Tower::Cool);
        assert_eq!(alert.classification, Classification::AboveRange);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.suggestion, "Add pH Down");
        assert!(!alert.id.is_empty());
    }
}
