//! End-to-end pipeline tests: request, generate and store roles sharing an
//! in-process broker and a temporary tile tree.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use zetamachine::broker::{Broker, BrokerError, MemoryBroker, MemoryBrokerConfig};
use zetamachine::compute::{
    build_backend, escape_iterations, BackendKind, ComputeBackend, ComputeKernel, EscapeConfig,
};
use zetamachine::coord::{PatchAddress, TileAddress};
use zetamachine::lease::{LeaseManager, DEFAULT_MAX_LEASE_AGE};
use zetamachine::messages::{
    decode_request, GenerateRequest, ERROR_TOPIC, GENERATE_CHANNEL, REQUEST_TOPIC, RESULT_TOPIC,
    STORE_CHANNEL,
};
use zetamachine::roles::{
    GenerateConfig, GenerateService, RequestConfig, RequestService, StoreConfig, StoreService,
    SweepUnit,
};
use zetamachine::store::TileStore;
use zetamachine::tile::{Tile, TileData};
use zetamachine::worker::PoolStats;

/// Few iterations keep unoptimized kernels fast.
fn escape() -> EscapeConfig {
    EscapeConfig {
        max_iterations: 60,
        ..Default::default()
    }
}

fn backend() -> Arc<dyn ComputeBackend> {
    build_backend(BackendKind::Cpu, escape(), 2).unwrap()
}

struct Pipeline {
    _temp: TempDir,
    broker: MemoryBroker,
    leases: LeaseManager,
    shutdown: CancellationToken,
    generate: JoinHandle<Result<PoolStats, BrokerError>>,
    store: JoinHandle<Result<PoolStats, BrokerError>>,
}

impl Pipeline {
    async fn start(broker_config: MemoryBrokerConfig, tile_width: usize) -> Self {
        let temp = TempDir::new().unwrap();
        let broker = MemoryBroker::new(broker_config);
        let leases = LeaseManager::new(TileStore::new(temp.path()), DEFAULT_MAX_LEASE_AGE);
        let shutdown = CancellationToken::new();

        let generate = GenerateService::new(
            Arc::new(broker.clone()),
            backend(),
            GenerateConfig {
                tile_width,
                shutdown_grace: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let store = StoreService::new(
            Arc::new(broker.clone()),
            leases.clone(),
            StoreConfig {
                max_in_flight: 4,
                shutdown_grace: Duration::from_secs(5),
                ..Default::default()
            },
        );

        let generate = tokio::spawn(generate.run(shutdown.clone()));
        let store = tokio::spawn(store.run(shutdown.clone()));

        // Both pools must have joined their channels before anything is published
        let subscribed = || {
            broker.channels(REQUEST_TOPIC).contains(&GENERATE_CHANNEL.to_string())
                && broker.channels(RESULT_TOPIC).contains(&STORE_CHANNEL.to_string())
        };
        while !subscribed() {
            tokio::task::yield_now().await;
        }

        Self {
            _temp: temp,
            broker,
            leases,
            shutdown,
            generate,
            store,
        }
    }

    fn requester(&self) -> RequestService {
        RequestService::new(
            Arc::new(self.broker.clone()),
            self.leases.clone(),
            RequestConfig::default(),
        )
    }

    fn store(&self) -> &TileStore {
        self.leases.store()
    }

    /// Waits until every tile is stored and its lease released.
    async fn wait_for(&self, tiles: &[TileAddress]) {
        let done = || {
            tiles
                .iter()
                .all(|t| self.store().exists(t) && !self.store().lease_path(t).exists())
        };
        tokio::time::timeout(Duration::from_secs(60), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("tiles were not stored in time");
    }

    async fn stop(self) -> (PoolStats, PoolStats) {
        self.shutdown.cancel();
        let generate = self.generate.await.unwrap().unwrap();
        let store = self.store.await.unwrap().unwrap();
        (generate, store)
    }
}

#[tokio::test]
async fn test_single_tile_end_to_end() {
    let pipeline = Pipeline::start(MemoryBrokerConfig::default(), 4).await;
    let address = TileAddress::new(0, 0, 0).unwrap();

    let sent = pipeline
        .requester()
        .request(GenerateRequest::tile(address))
        .await
        .unwrap();
    assert!(sent);
    assert!(pipeline.store().lease_path(&address).exists());

    pipeline.wait_for(&[address]).await;

    let path = pipeline.store().tile_path(&address);
    assert!(path.ends_with("0/0/0.0.0.dat.gz"));

    let data = pipeline.store().load(&address).unwrap();
    assert_eq!(data.width(), 4);
    assert_eq!(data.get(0, 0), Some(escape_iterations(address.min(), &escape())));

    let (generate, store) = pipeline.stop().await;
    assert_eq!(generate.finished, 1);
    assert_eq!(store.finished, 1);
}

#[tokio::test]
async fn test_stored_tile_is_not_requested_again() {
    let pipeline = Pipeline::start(MemoryBrokerConfig::default(), 4).await;
    let address = TileAddress::new(0, -1, 0).unwrap();
    pipeline
        .store()
        .save(&Tile::new(address, TileData::zeroed(4)))
        .unwrap();

    let mut probe = pipeline
        .broker
        .subscribe(REQUEST_TOPIC, "probe", 16)
        .await
        .unwrap();

    let sent = pipeline
        .requester()
        .request(GenerateRequest::tile(address))
        .await
        .unwrap();
    assert!(!sent);
    assert_eq!(pipeline.broker.depth(REQUEST_TOPIC, "probe"), 0);
    assert!(!pipeline.store().lease_path(&address).exists());

    // A sweep of zoom 0 requests only the three missing tiles
    let requester = RequestService::new(
        Arc::new(pipeline.broker.clone()),
        pipeline.leases.clone(),
        RequestConfig {
            min_zoom: 0,
            max_zoom: 0,
            core_only: false,
            unit: SweepUnit::Tile,
        },
    );
    let summary = requester.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.sent(), 3);
    assert_eq!(summary.skipped(), 1);

    for _ in 0..3 {
        let delivery = probe.next().await.unwrap();
        let request = decode_request(delivery.body()).unwrap();
        assert_ne!(request, GenerateRequest::tile(address));
        delivery.finish().await.unwrap();
    }

    let missing: Vec<TileAddress> = [(-1, -1), (0, -1), (0, 0)]
        .into_iter()
        .map(|(x, y)| TileAddress::new(0, x, y).unwrap())
        .collect();
    pipeline.wait_for(&missing).await;
    pipeline.stop().await;
}

#[tokio::test]
async fn test_oversize_result_goes_to_error_topic() {
    let pipeline = Pipeline::start(
        MemoryBrokerConfig {
            max_message_size: 200,
            ..Default::default()
        },
        16,
    )
    .await;
    let mut errors = pipeline
        .broker
        .subscribe(ERROR_TOPIC, "audit", 4)
        .await
        .unwrap();

    let address = TileAddress::new(1, 1, -2).unwrap();
    let request = GenerateRequest::tile(address);
    assert!(pipeline.requester().request(request).await.unwrap());

    let dead = tokio::time::timeout(Duration::from_secs(60), errors.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decode_request(dead.body()).unwrap(), request);
    dead.finish().await.unwrap();
    assert!(!pipeline.store().exists(&address));
    assert_eq!(pipeline.broker.depth(RESULT_TOPIC, STORE_CHANNEL), 0);

    let (generate, store) = pipeline.stop().await;
    // Dead-lettered, not retried
    assert_eq!(generate.finished, 1);
    assert_eq!(generate.requeued, 0);
    assert_eq!(store.handled(), 0);
}

#[tokio::test]
async fn test_patch_request_matches_independent_tiles() {
    let tile_width = 2;
    let pipeline = Pipeline::start(MemoryBrokerConfig::default(), tile_width).await;
    let patch = PatchAddress::new(2, -1, 0).unwrap();

    assert!(pipeline
        .requester()
        .request(GenerateRequest::patch(patch))
        .await
        .unwrap());

    let tiles: Vec<TileAddress> = patch.tiles().collect();
    pipeline.wait_for(&tiles).await;

    let kernel = ComputeKernel::new(escape());
    for tile in &tiles {
        let expected = kernel
            .compute(tile.min(), tile.max(), tile_width, &CancellationToken::new())
            .unwrap();
        assert_eq!(
            pipeline.store().load(tile).unwrap().counts(),
            expected.as_slice(),
            "tile {}",
            tile
        );
    }

    let (generate, store) = pipeline.stop().await;
    assert_eq!(generate.finished, 1);
    assert_eq!(store.finished, tiles.len() as u64);
}
