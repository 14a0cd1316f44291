use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use roverlink::config::load_config;
use roverlink::rover::{RoverLink, ThrustCommand};
use roverlink::session::{BrokerSession, CallbackWatcher};
use roverlink::transport::WebSocketFactory;
use roverlink::utils::logging;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
enum Link {
    Connecting,
    Up,
    Down(String),
}

/// Reads `<distance> <angle>` lines from stdin and keeps publishing the
/// latest command to the rover while the broker session is up.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let settings = load_config()?;
    logging::init(&settings.logging.level);

    let session = BrokerSession::new(WebSocketFactory::current()?);
    let rover = RoverLink::new(session.clone(), settings.rover.id.clone());

    let (status_tx, mut status) = watch::channel(Link::Connecting);
    let status_tx = Arc::new(status_tx);
    let (up, down, failed) = (status_tx.clone(), status_tx.clone(), status_tx);
    session.register_watcher(Arc::new(
        CallbackWatcher::new()
            .connected(move || {
                up.send_replace(Link::Up);
            })
            .disconnected(move |info| {
                down.send_replace(Link::Down(info.to_string()));
            })
            .connect_failed(move |info| {
                failed.send_replace(Link::Down(info.to_string()));
            })
            .subscription_failed(|filter, info| warn!(%filter, %info, "subscription failed")),
    ));

    session
        .connect(&settings.broker.connection_config())
        .into_result()?;
    info!(rover = %rover.rover_id(), url = %settings.broker.url, "teleop console started");

    let period = Duration::from_millis(settings.rover.command_interval_ms.max(1));
    let mut ticker = tokio::time::interval(period);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut command = ThrustCommand::idle();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                match current {
                    Link::Up => {
                        let response = rover.watch_telemetry(|reading| {
                            info!(topic = %reading.topic, payload = %reading.payload, "telemetry");
                        });
                        if response.failed() {
                            warn!(message = %response.message, "could not watch telemetry");
                        }
                    }
                    Link::Down(info) => {
                        error!(%info, "broker session ended");
                        return Err(info.into());
                    }
                    Link::Connecting => {}
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_command(&line) {
                    Some(next) => command = next,
                    None => warn!(%line, "expected `<distance> <angle>`"),
                },
                None => stdin_open = false,
            },
            _ = ticker.tick() => {
                if session.is_connected() {
                    let response = rover.send_thrust(&command);
                    if response.failed() {
                        warn!(message = %response.message, "thrust command not sent");
                    }
                }
            }
        }
    }

    let response = session.disconnect();
    if response.failed() {
        warn!(message = %response.message, "disconnect request failed");
        return Ok(());
    }
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while !matches!(*status.borrow_and_update(), Link::Down(_)) {
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    Ok(())
}

fn parse_command(line: &str) -> Option<ThrustCommand> {
    let mut parts = line.split_whitespace();
    let distance = parts.next()?.parse::<f64>().ok()?;
    let angle = parts.next()?.parse::<i32>().ok()?;
    if parts.next().is_some() || !distance.is_finite() {
        return None;
    }
    Some(ThrustCommand::new(distance, angle))
}
