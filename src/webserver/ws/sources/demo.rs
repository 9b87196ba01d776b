/// Synthetic update source for manual testing (`--demo`)
///
/// Every tick publishes a status for the next configured environment, cycling
/// through a few states. Once per round over the environments it also
/// advances a synthetic operation from 0% to completion.
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::{
    config::DemoConfig,
    logger::{self, LogTag},
    webserver::ws::hub::HubLink,
};

const STATES: [&str; 3] = ["provisioning", "running", "stopped"];
const PROGRESS_STEP: u64 = 25;

pub fn start(
    hub: Arc<dyn HubLink>,
    config: DemoConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    logger::info(
        LogTag::Demo,
        &format!(
            "Demo source started ({} environments, every {}ms)",
            config.environments.len(),
            config.interval_ms
        ),
    );
    tokio::spawn(run(hub, config, shutdown))
}

async fn run(hub: Arc<dyn HubLink>, config: DemoConfig, mut shutdown: watch::Receiver<bool>) {
    if config.environments.is_empty() {
        logger::warning(LogTag::Demo, "Demo source has no environments, stopping");
        return;
    }

    let mut ticker = interval(Duration::from_millis(config.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let (environment_id, status) = status_for_tick(&config.environments, tick);
        let delivered = hub.broadcast_status(environment_id, status).await;
        logger::verbose(
            LogTag::Demo,
            &format!("Demo status for {} delivered to {}", environment_id, delivered),
        );

        let round = config.environments.len() as u64;
        if tick % round == round - 1 {
            let (operation_id, update) = operation_for_round(tick / round);
            hub.broadcast_operation(&operation_id, update).await;
        }

        tick += 1;
    }

    logger::info(LogTag::Demo, "Demo source stopped");
}

fn status_for_tick(environments: &[String], tick: u64) -> (&str, Value) {
    let count = environments.len() as u64;
    let environment_id = &environments[(tick % count) as usize];
    let state = STATES[((tick / count) % STATES.len() as u64) as usize];
    (
        environment_id.as_str(),
        json!({ "state": state, "tick": tick }),
    )
}

/// Operation `demo-op-N` advances by one step per round
fn operation_for_round(round: u64) -> (String, Value) {
    let steps = 100 / PROGRESS_STEP + 1;
    let operation = round / steps;
    let progress = (round % steps) * PROGRESS_STEP;
    let status = if progress >= 100 { "completed" } else { "running" };
    (
        format!("demo-op-{}", operation),
        json!({ "status": status, "progress": progress }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::webserver::ws::client::{ClientHandle, ClientId};
    use crate::webserver::ws::hub::Hub;
    use crate::webserver::ws::message::{ClientCommand, ServerMessage};

    #[test]
    fn test_status_cycles_environments_then_states() {
        let envs = vec!["a".to_string(), "b".to_string()];

        let (env, status) = status_for_tick(&envs, 0);
        assert_eq!((env, status["state"].as_str()), ("a", Some("provisioning")));
        let (env, status) = status_for_tick(&envs, 1);
        assert_eq!((env, status["state"].as_str()), ("b", Some("provisioning")));
        let (env, status) = status_for_tick(&envs, 2);
        assert_eq!((env, status["state"].as_str()), ("a", Some("running")));
    }

    #[test]
    fn test_operation_progress_completes() {
        let (id, update) = operation_for_round(0);
        assert_eq!(id, "demo-op-0");
        assert_eq!(update["status"], "running");
        assert_eq!(update["progress"], 0);

        let (id, update) = operation_for_round(4);
        assert_eq!(id, "demo-op-0");
        assert_eq!(update["status"], "completed");

        let (id, _) = operation_for_round(5);
        assert_eq!(id, "demo-op-1");
    }

    #[tokio::test]
    async fn test_demo_source_feeds_subscribers() {
        let hub = Hub::new(HubConfig::default());
        let (handle, mut channels) = ClientHandle::new(ClientId::new(), 64);
        hub.register(handle.clone()).await.unwrap();
        handle.apply_command(ClientCommand::Subscribe(vec!["env-1".to_string()]), false);

        let (stop_tx, stop_rx) = watch::channel(false);
        let config = DemoConfig {
            interval_ms: 5,
            environments: vec!["env-1".to_string()],
        };
        let task = start(hub.clone(), config, stop_rx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        stop_tx.send_replace(true);
        task.await.unwrap();

        let mut statuses = 0;
        let mut operations = 0;
        while let Ok(frame) = channels.outbox.try_recv() {
            match ServerMessage::parse_frame(&frame).remove(0).unwrap() {
                ServerMessage::StatusUpdate(update) => {
                    assert_eq!(update.environment_id, "env-1");
                    statuses += 1;
                }
                ServerMessage::OperationUpdate(_) => operations += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(statuses >= 2);
        assert_eq!(statuses, operations);
    }
}
