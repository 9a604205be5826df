use crate::models::{Classification, MetricReading, RuleTable, ThresholdRule};

/// Classification d'une lecture plus la règle appariée (pour construire
/// le texte d'alerte). `rule` est None pour une clé non surveillée.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation<'a> {
    pub classification: Classification,
    pub rule: Option<&'a ThresholdRule>,
}

/// Compare une lecture à sa règle de seuil. Fonction pure.
///
/// Sans règle configurée la clé est "non surveillée" et classe toujours `ok` :
/// un nouveau type de capteur en amont ne doit jamais faire tomber le moniteur.
/// Les bornes sont des intervalles fermés, une valeur pile sur la borne est ok.
pub fn classify<'a>(reading: &MetricReading, rules: &'a RuleTable) -> Evaluation<'a> {
    let Some(rule) = rules.get(&(reading.tower, reading.metric)) else {
        return Evaluation { classification: Classification::Ok, rule: None };
    };
    let classification = if reading.value < rule.low {
        Classification::BelowRange
    } else if reading.value > rule.high {
        Classification::AboveRange
    } else {
        Classification::Ok
    };
    Evaluation { classification, rule: Some(rule) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, Severity, ThresholdRule, Tower};
    use time::macros::datetime;

    fn table() -> RuleTable {
        RuleTable::from([(
            (Tower::Cool, Metric::Ph),
            ThresholdRule {
                low: 5.8,
                high: 6.2,
                unit: String::new(),
                severity: Severity::High,
                suggestion: "Add pH Down".into(),
            },
        )])
    }

    fn reading(tower: Tower, metric: Metric, value: f64) -> MetricReading {
        MetricReading {
            tower,
            metric,
            value,
            observed_at: datetime!(2026-08-01 12:00 UTC),
        }
    }

    #[test]
    fn test_within_range_is_ok() {
        let rules = table();
        let eval = classify(&reading(Tower::Cool, Metric::Ph, 6.0), &rules);
        assert_eq!(eval.classification, Classification::Ok);
        assert!(eval.rule.is_some());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let rules = table();
        assert_eq!(
            classify(&reading(Tower::Cool, Metric::Ph, 5.8), &rules).classification,
            Classification::Ok
        );
        assert_eq!(
            classify(&reading(Tower::Cool, Metric::Ph, 6.2), &rules).classification,
            Classification::Ok
        );
    }

    #[test]
    fn test_below_and_above() {
        let rules = table();
        assert_eq!(
            classify(&reading(Tower::Cool, Metric::Ph, 5.79), &rules).classification,
            Classification::BelowRange
        );
        assert_eq!(
            classify(&reading(Tower::Cool, Metric::Ph, 6.21), &rules).classification,
            Classification::AboveRange
        );
    }

    #[test]
    fn test_missing_rule_defaults_to_ok() {
        let rules = table();
        // la tour warm n'a aucune règle dans cette table
        let eval = classify(&reading(Tower::Warm, Metric::Ph, 9999.0), &rules);
        assert_eq!(eval.classification, Classification::Ok);
        assert!(eval.rule.is_none());
    }
}
