use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::ingest;
use crate::models::MetricReading;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task;

/// Topics capteurs publiés par les firmwares ESP32 des deux tours
/// et par la sonde d'ambiance partagée.
pub const SENSOR_TOPICS: [&str; 8] = [
    "/cool_tower/ec",
    "/cool_tower/ph",
    "/cool_tower/water_temp",
    "/warm_tower/ec",
    "/warm_tower/ph",
    "/warm_tower/water_temp",
    "/environment/air_temp",
    "/environment/humidity",
];

/// Client partagé pour l'écoute capteurs, les alertes et la santé.
/// Les identifiants viennent de l'environnement (fichier .env du Pi).
pub fn create_client(cfg: &MqttConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new("hydromon", &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(15));
    if let (Ok(user), Ok(pass)) = (std::env::var("MQTT_USERNAME"), std::env::var("MQTT_PASSWORD")) {
        opts.set_credentials(user, pass);
    }
    AsyncClient::new(opts, 10)
}

/// Écoute les topics capteurs et pousse les lectures validées dans le pipeline.
/// Les messages malformés sont jetés avec un warning, jamais fatals.
pub fn spawn_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    tx: mpsc::UnboundedSender<MetricReading>,
    health: HealthTracker,
) {
    task::spawn(async move {
        for topic in SENSOR_TOPICS {
            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                eprintln!("[mqtt] subscribe {topic} failed: {e:?}");
                return;
            }
        }
        println!("[mqtt] subscribed to {} sensor topics", SENSOR_TOPICS.len());

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    println!("[mqtt] connected to broker");
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let arrived_at = OffsetDateTime::now_utc();
                    let payload = match String::from_utf8(p.payload.to_vec()) {
                        Ok(s) => s,
                        Err(_) => {
                            health.inc_readings_dropped();
                            eprintln!("[ingest] non UTF-8 payload on {}", p.topic);
                            continue;
                        }
                    };
                    match ingest::readings_from_topic(&p.topic, &payload, arrived_at) {
                        Ok(readings) => {
                            for reading in readings {
                                if tx.send(reading).is_err() {
                                    eprintln!("[mqtt] pipeline closed, listener stopping");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            health.inc_readings_dropped();
                            eprintln!("[ingest] dropped message on {}: {e}", p.topic);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    health.increment_reconnects();
                    eprintln!("[mqtt] erreur: {e:?}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}
