use crate::models::{
    AlertNotification, Classification, MetricKey, MetricReading, ViolationMap, ViolationState,
};
use crate::notify::build_notification;
use crate::evaluate::Evaluation;
use crate::state::{new_state, Shared};
use std::collections::HashMap;
use std::collections::HashSet;
use time::{Duration, OffsetDateTime};

/// Issue d'une transition d'état pour une lecture.
#[derive(Debug)]
pub enum Outcome {
    /// Transition qui mérite une notification (l'émission reste à faire).
    Notify(AlertNotification),
    /// Violation déjà connue, toujours dans la fenêtre de cooldown.
    Suppressed,
    /// Rien à signaler (ok stable, retour au calme silencieux, clé non surveillée).
    Silent,
}

/// Machine à états anti-spam des alertes.
///
/// Une entrée ViolationState par clé (tour, grandeur), créée à la première
/// lecture et jamais supprimée (l'espace de clés est petit et fixe). Chaque
/// clé a son cooldown indépendant. Règles de transition :
/// - entrée en violation depuis ok → notification immédiate
/// - changement de type de violation (below → above) → notification immédiate
/// - violation qui persiste → une notification par fenêtre de cooldown
/// - retour en plage → état nettoyé, notification seulement si notify_on_recovery
pub struct AlertDebouncer {
    states: Shared<ViolationMap>,
    cooldown: Duration,
    notify_on_recovery: bool,
    /// Clés vues en trafic réel sans règle configurée, signalées une seule fois.
    unruled_seen: HashSet<MetricKey>,
}

impl AlertDebouncer {
    pub fn new(cooldown: Duration, notify_on_recovery: bool) -> Self {
        Self {
            states: new_state(HashMap::new()),
            cooldown,
            notify_on_recovery,
            unruled_seen: HashSet::new(),
        }
    }

    /// Handle partagé en lecture seule pour l'API REST. Seul le debouncer mute.
    pub fn states(&self) -> Shared<ViolationMap> {
        self.states.clone()
    }

    /// Applique la transition pour une lecture évaluée. `now` vient de la
    /// lecture elle-même, pas de l'horloge : rejouer la même séquence de
    /// lectures redonne exactement la même séquence de notifications.
    pub fn process(
        &mut self,
        reading: &MetricReading,
        eval: &Evaluation<'_>,
        now: OffsetDateTime,
    ) -> Outcome {
        let key: MetricKey = (reading.tower, reading.metric);

        let Some(rule) = eval.rule else {
            // clé non surveillée : défaut permissif, mais on le signale une fois
            // au cas où la config aurait oublié une grandeur par erreur
            if self.unruled_seen.insert(key) {
                eprintln!(
                    "[alerts] no threshold rule for {}/{}, readings treated as ok",
                    reading.tower.label(),
                    reading.metric.label()
                );
            }
            return Outcome::Silent;
        };

        let new_status = eval.classification;
        let mut states = self.states.lock();
        let entry = states.entry(key).or_insert(ViolationState {
            status: Classification::Ok,
            since: now,
            last_alert: None,
        });

        if new_status == entry.status {
            if !new_status.is_violation() {
                return Outcome::Silent;
            }
            // même violation qui persiste : au plus une alerte par fenêtre
            if let Some(last) = entry.last_alert {
                if now - last < self.cooldown {
                    return Outcome::Suppressed;
                }
            }
            entry.last_alert = Some(now);
            return Outcome::Notify(build_notification(reading, new_status, rule, now));
        }

        // changement de statut : prioritaire sur le cooldown
        entry.status = new_status;
        entry.since = now;
        if new_status.is_violation() {
            entry.last_alert = Some(now);
            return Outcome::Notify(build_notification(reading, new_status, rule, now));
        }

        // retour en plage normale : violation nettoyée
        entry.last_alert = None;
        if self.notify_on_recovery {
            Outcome::Notify(build_notification(reading, Classification::Ok, rule, now))
        } else {
            Outcome::Silent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::classify;
    use crate::models::{Metric, RuleTable, Severity, ThresholdRule, Tower};
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2026-08-01 12:00 UTC);
    const COOLDOWN: Duration = Duration::hours(2);

    fn rules() -> RuleTable {
        RuleTable::from([
            (
                (Tower::Cool, Metric::Ph),
                ThresholdRule {
                    low: 5.8,
                    high: 6.2,
                    unit: String::new(),
                    severity: Severity::High,
                    suggestion: "Add pH Down".into(),
                },
            ),
            (
                (Tower::Warm, Metric::Ec),
                ThresholdRule {
                    low: 1.5,
                    high: 2.0,
                    unit: "mS/cm".into(),
                    severity: Severity::Medium,
                    suggestion: "Add MaxiGrow".into(),
                },
            ),
        ])
    }

    fn reading(tower: Tower, metric: Metric, value: f64, at: OffsetDateTime) -> MetricReading {
        MetricReading { tower, metric, value, observed_at: at }
    }

    /// Passe une lecture dans évaluation + debounce, retourne l'issue.
    fn step(
        deb: &mut AlertDebouncer,
        rules: &RuleTable,
        tower: Tower,
        metric: Metric,
        value: f64,
        at: OffsetDateTime,
    ) -> Outcome {
        let r = reading(tower, metric, value, at);
        let eval = classify(&r, rules);
        deb.process(&r, &eval, at)
    }

    #[test]
    fn test_first_violation_notifies_immediately() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        let out = step(&mut deb, &rules, Tower::Cool, Metric::Ph, 5.5, T0);
        let Outcome::Notify(alert) = out else { panic!("expected notification") };
        assert_eq!(alert.classification, Classification::BelowRange);
    }

    #[test]
    fn test_repeat_within_cooldown_suppressed() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.8, T0),
            Outcome::Notify(_)
        ));
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.9, T0 + Duration::minutes(30)),
            Outcome::Suppressed
        ));
        // après expiration du cooldown, même violation → nouvelle alerte
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.7, T0 + COOLDOWN + Duration::seconds(1)),
            Outcome::Notify(_)
        ));
    }

    #[test]
    fn test_status_change_overrides_cooldown() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 5.5, T0),
            Outcome::Notify(_)
        ));
        // below → above cinq minutes plus tard, bien dans la fenêtre
        let out = step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.9, T0 + Duration::minutes(5));
        let Outcome::Notify(alert) = out else { panic!("expected notification") };
        assert_eq!(alert.classification, Classification::AboveRange);
    }

    #[test]
    fn test_ok_stable_is_silent() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        for i in 0..5 {
            assert!(matches!(
                step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.0, T0 + Duration::minutes(i)),
                Outcome::Silent
            ));
        }
    }

    #[test]
    fn test_recovery_silent_by_default() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.8, T0);
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.0, T0 + Duration::minutes(10)),
            Outcome::Silent
        ));
        // l'état est nettoyé : une rechute notifie immédiatement
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.8, T0 + Duration::minutes(20)),
            Outcome::Notify(_)
        ));
    }

    #[test]
    fn test_recovery_notifies_when_enabled() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, true);
        step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.8, T0);
        let out = step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.0, T0 + Duration::minutes(10));
        let Outcome::Notify(alert) = out else { panic!("expected recovery notification") };
        assert_eq!(alert.classification, Classification::Ok);
    }

    #[test]
    fn test_keys_are_independent() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.8, T0),
            Outcome::Notify(_)
        ));
        // l'autre clé n'est pas affectée par le cooldown de la première
        assert!(matches!(
            step(&mut deb, &rules, Tower::Warm, Metric::Ec, 2.5, T0 + Duration::minutes(1)),
            Outcome::Notify(_)
        ));
        assert!(matches!(
            step(&mut deb, &rules, Tower::Warm, Metric::Ec, 2.6, T0 + Duration::minutes(2)),
            Outcome::Suppressed
        ));
    }

    #[test]
    fn test_unruled_key_is_silent() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        // humidity n'a pas de règle dans cette table
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Humidity, 99.0, T0),
            Outcome::Silent
        ));
        assert!(deb.states().lock().is_empty());
    }

    /// Scénario de bout en bout : règle pH cool 5.8-6.2, cooldown 2 h.
    #[test]
    fn test_ph_scenario() {
        let rules = rules();
        let mut deb = AlertDebouncer::new(COOLDOWN, false);
        // t=0 : 6.8 → alerte above_range
        assert!(matches!(step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.8, T0), Outcome::Notify(_)));
        // t=30min : 6.9 → supprimée
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.9, T0 + Duration::minutes(30)),
            Outcome::Suppressed
        ));
        // t=3h : 6.7 → toujours above, cooldown expiré → alerte
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.7, T0 + Duration::hours(3)),
            Outcome::Notify(_)
        ));
        // t=3h05 : 6.0 → retour en plage, silencieux par défaut, état nettoyé
        assert!(matches!(
            step(&mut deb, &rules, Tower::Cool, Metric::Ph, 6.0, T0 + Duration::hours(3) + Duration::minutes(5)),
            Outcome::Silent
        ));
        let states = deb.states();
        let st = states.lock()[&(Tower::Cool, Metric::Ph)].clone();
        assert_eq!(st.status, Classification::Ok);
        assert_eq!(st.last_alert, None);
    }

    /// Rejouer la même séquence sur un debouncer neuf redonne les mêmes émissions.
    #[test]
    fn test_replay_is_deterministic() {
        let rules = rules();
        let sequence = [
            (6.8, 0i64),
            (6.9, 30),
            (6.7, 180),
            (6.0, 185),
            (5.5, 200),
            (5.4, 210),
        ];
        let run = || {
            let mut deb = AlertDebouncer::new(COOLDOWN, false);
            sequence
                .iter()
                .map(|(v, min)| {
                    match step(&mut deb, &rules, Tower::Cool, Metric::Ph, *v, T0 + Duration::minutes(*min)) {
                        Outcome::Notify(a) => Some(a.classification),
                        _ => None,
                    }
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        assert_eq!(
            run(),
            vec![
                Some(Classification::AboveRange),
                None,
                Some(Classification::AboveRange),
                None,
                Some(Classification::BelowRange),
                None,
            ]
        );
    }
}
