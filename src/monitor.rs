use crate::config::MonitorConfig;
use crate::debounce::{AlertDebouncer, Outcome};
use crate::evaluate::classify;
use crate::health::HealthTracker;
use crate::models::{LatestReading, MetricReading, ReadingsMap, RuleTable, ViolationMap};
use crate::notify::Notifier;
use crate::state::{new_state, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;

/// Pipeline de traitement : une lecture à la fois, dans l'ordre d'arrivée.
///
/// Un seul consommateur possède la table de règles et le debouncer, donc
/// deux lectures d'une même clé ne peuvent pas se doubler et corrompre les
/// timestamps de debounce. L'envoi des notifications part en tâche détachée :
/// un expéditeur lent ou en panne ne retarde jamais la lecture suivante.
pub struct Monitor {
    rules: Arc<RuleTable>,
    debouncer: AlertDebouncer,
    readings: Shared<ReadingsMap>,
    notifier: Arc<dyn Notifier>,
    health: HealthTracker,
}

impl Monitor {
    pub fn new(cfg: &MonitorConfig, notifier: Arc<dyn Notifier>, health: HealthTracker) -> Self {
        Self {
            rules: Arc::new(cfg.flat_rules()),
            debouncer: AlertDebouncer::new(cfg.cooldown(), cfg.notify_on_recovery),
            readings: new_state(HashMap::new()),
            notifier,
            health,
        }
    }

    pub fn rules(&self) -> Arc<RuleTable> {
        self.rules.clone()
    }

    pub fn readings(&self) -> Shared<ReadingsMap> {
        self.readings.clone()
    }

    pub fn violations(&self) -> Shared<ViolationMap> {
        self.debouncer.states()
    }

    /// Traite une lecture validée : cache, évaluation, transition, dispatch.
    pub fn handle_reading(&mut self, reading: MetricReading) {
        self.readings.lock().insert(
            (reading.tower, reading.metric),
            LatestReading { value: reading.value, observed_at: reading.observed_at },
        );

        let eval = classify(&reading, &self.rules);
        match self.debouncer.process(&reading, &eval, reading.observed_at) {
            Outcome::Notify(alert) => {
                self.health.inc_alerts_emitted();
                println!(
                    "[alerts] {}/{} {:?}: {}",
                    alert.tower.label(),
                    alert.metric.label(),
                    alert.classification,
                    alert.message
                );
                let notifier = self.notifier.clone();
                // fire-and-forget : échec loggé, pas de retry ni de rollback d'état
                task::spawn(async move {
                    if let Err(e) = notifier.send(&alert).await {
                        eprintln!("[alerts] failed to send notification {}: {e:?}", alert.id);
                    }
                });
            }
            Outcome::Suppressed => {
                self.health.inc_alerts_suppressed();
            }
            Outcome::Silent => {}
        }
    }

    /// Boucle consommatrice. S'arrête quand la source de lectures ferme.
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<MetricReading>) {
        task::spawn(async move {
            while let Some(reading) = rx.recv().await {
                self.health.inc_readings_processed();
                self.handle_reading(reading);
            }
            eprintln!("[monitor] reading stream closed, pipeline stopped");
        });
    }
}
