//! Seed command - run the request, generate and store roles in one process.
//!
//! With the memory transport the roles share an in-process broker and the
//! command exits once every request it published has been stored. With
//! NSQ it joins the fleet and keeps consuming until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zetamachine::broker::{Broker, MemoryBroker, Transport};
use zetamachine::messages::{
    ERROR_TOPIC, GENERATE_CHANNEL, REQUEST_TOPIC, RESULT_TOPIC, STORE_CHANNEL,
};
use zetamachine::roles::{GenerateService, RequestService, StoreService};

use super::common::{join_pool, print_pool_stats, print_request_summary, GlobalArgs, SweepArgs};
use crate::error::CliError;
use crate::runner::{load_config, shutdown_on_signal, CliRunner};

/// How often the in-process queues are checked for completion.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Arguments for the seed command.
#[derive(Debug, Args)]
pub struct SeedArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Keep consuming after the sweep has been processed
    #[arg(long)]
    pub keep_running: bool,
}

/// Run the seed command.
pub async fn run(args: SeedArgs, global: &GlobalArgs) -> Result<(), CliError> {
    let mut config = load_config(global.config.as_deref())?;
    args.sweep.apply(&mut config);

    let runner = CliRunner::new(config, global.debug)?;
    runner.log_startup("seed");
    let config = runner.config();

    let (broker, memory): (Arc<dyn Broker>, Option<MemoryBroker>) = match config.broker.transport {
        Transport::Memory => {
            let memory = MemoryBroker::new(config.memory_broker_config());
            (Arc::new(memory.clone()), Some(memory))
        }
        Transport::Nsq => (runner.network_broker()?, None),
    };
    let backend = runner.backend()?;
    let shutdown = shutdown_on_signal();

    let generate = GenerateService::new(broker.clone(), backend, config.generate_config());
    let store = StoreService::new(broker.clone(), config.lease_manager(), config.store_config());
    let generate = tokio::spawn(generate.run(shutdown.clone()));
    let store = tokio::spawn(store.run(shutdown.clone()));

    println!(
        "Seeding zoom {}-{} into {}",
        config.request.min_zoom,
        config.request.max_zoom,
        config.store.root.display()
    );
    let requester = RequestService::new(broker, config.lease_manager(), config.request_config());
    let sweep = requester.run(&shutdown).await;

    match &sweep {
        Ok(summary) => {
            print_request_summary(summary);
            match &memory {
                Some(memory) if !args.keep_running => wait_until_drained(memory, &shutdown).await,
                _ => {
                    println!("Consuming until interrupted, press Ctrl+C to stop");
                    shutdown.cancelled().await;
                }
            }
        }
        Err(e) => error!(error = %e, "Request sweep failed, stopping workers"),
    }

    shutdown.cancel();
    let generate = join_pool(generate).await?;
    let store = join_pool(store).await?;
    print_pool_stats("generate", &generate);
    print_pool_stats("store", &store);

    if let Some(memory) = &memory {
        let dead = memory.backlog(ERROR_TOPIC);
        if dead > 0 {
            warn!(count = dead, topic = ERROR_TOPIC, "Requests dead-lettered");
            println!("{} requests could not be delivered, see the log", dead);
        }
    }

    sweep?;
    Ok(())
}

/// Waits until nothing is queued or in flight on either pipeline topic.
async fn wait_until_drained(broker: &MemoryBroker, shutdown: &CancellationToken) {
    let mut ticker = tokio::time::interval(DRAIN_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if is_drained(broker) {
                    info!("All requests processed");
                    return;
                }
            }
        }
    }
}

fn is_drained(broker: &MemoryBroker) -> bool {
    [(REQUEST_TOPIC, GENERATE_CHANNEL), (RESULT_TOPIC, STORE_CHANNEL)]
        .into_iter()
        .all(|(topic, channel)| {
            broker.backlog(topic) == 0
                && broker.depth(topic, channel) == 0
                && broker.in_flight(topic, channel) == 0
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zetamachine::broker::{Delivery, MemoryBrokerConfig, Subscription};

    #[tokio::test]
    async fn test_drained_tracks_backlog_and_in_flight() {
        let broker = MemoryBroker::new(MemoryBrokerConfig::default());
        assert!(is_drained(&broker));

        // Held on the topic until a channel subscribes
        broker.publish(REQUEST_TOPIC, b"{}".to_vec()).await.unwrap();
        assert!(!is_drained(&broker));

        let mut generate = broker.subscribe(REQUEST_TOPIC, GENERATE_CHANNEL, 1).await.unwrap();
        let delivery = generate.next().await.unwrap();
        assert!(!is_drained(&broker));

        delivery.finish().await.unwrap();
        assert!(is_drained(&broker));
    }

    #[tokio::test]
    async fn test_wait_returns_on_shutdown() {
        let broker = MemoryBroker::new(MemoryBrokerConfig::default());
        broker.publish(RESULT_TOPIC, b"{}".to_vec()).await.unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        wait_until_drained(&broker, &shutdown).await;
        assert!(!is_drained(&broker));
    }
}
