/**
 * HYDROMON - Moniteur de seuils du système hydroponique double tour
 *
 * RÔLE : Surveillance temps réel des capteurs (EC, pH, températures, humidité)
 * des deux tours via MQTT, détection des dépassements de seuil et alertes
 * anti-spam vers la passerelle SMS.
 *
 * ARCHITECTURE : Pipeline ingestion → évaluation → debounce, un seul
 * consommateur des lectures + API REST de consultation + santé publiée sur MQTT.
 * UTILITÉ : Cerveau d'alerte du jardin, remplaçable à chaud tant que le broker
 * et la passerelle restent en place.
 */

mod config;
mod debounce;
mod evaluate;
mod health;
mod http;
mod ingest;
mod models;
mod monitor;
mod mqtt;
mod notify;
mod state;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::monitor::Monitor;
use crate::notify::{MqttNotifier, Notifier};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await;
    // Config invalide = comportement de debounce indéfini, on refuse de démarrer
    if let Err(e) = cfg.validate() {
        eprintln!("[monitor] configuration invalide: {e}");
        std::process::exit(1);
    }

    let health_tracker = HealthTracker::new();

    let (mqtt_client, eventloop) = mqtt::create_client(&cfg.mqtt);
    let notifier: Arc<dyn Notifier> = Arc::new(MqttNotifier::new(mqtt_client.clone()));

    let monitor = Monitor::new(&cfg, notifier, health_tracker.clone());
    let rules = monitor.rules();
    let readings = monitor.readings();
    let violations = monitor.violations();
    println!(
        "[monitor] {} threshold rules loaded, cooldown {} min, notify_on_recovery={}",
        rules.len(),
        cfg.cooldown_minutes,
        cfg.notify_on_recovery
    );

    // pipeline : MQTT remplit le canal, le moniteur consomme dans l'ordre
    let (tx, rx) = mpsc::unbounded_channel();
    monitor.spawn(rx);
    mqtt::spawn_listener(mqtt_client.clone(), eventloop, tx, health_tracker.clone());

    // publication auto de la santé du moniteur
    health_tracker.spawn_health_publisher(mqtt_client, rules.len(), violations.clone());

    // API REST de consultation
    let app_state = AppState { readings, violations, rules, health_tracker };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    println!("[monitor] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
