//! Environment loader demo
//!
//! Loads a scene description, drives the environment at 60 Hz while its
//! resources arrive, and moves one node through the property synchronizer.
//!
//! Run with: cargo run -p void_environment -- [scene.json]

use std::time::{Duration, Instant};

use glam::Vec3;
use void_cache::{DecoderRegistry, FnDecoder};
use void_core::{EntityId, NativeHandle};
use void_dispatch::{InboundOperation, PropertyKey, PropertyValue, SceneSink};
use void_entity::{DeletedEntity, Entity, EntityDescriptor, Transform};
use void_environment::{Environment, EnvironmentConfig, EnvironmentError, EnvironmentResult};

const FRAME: Duration = Duration::from_millis(16);

const SAMPLE_SCENE: &str = r#"[
    { "id": 1, "type": "scene" },
    { "id": 2, "type": "node", "position": [0.0, 0.0, 0.0], "parent": 1 },
    { "id": 3, "type": "light", "node": { "parent": 2 }, "intensity": 2.0 },
    { "id": 4, "type": "line", "positions": [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0]] },
    { "id": 5, "type": "model", "resource": { "url": "models/crate.bin" } },
    { "id": 6, "type": "extension", "kind": "portal" }
]"#;

/// Raw bytes of a decoded resource
struct Blob(Vec<u8>);

/// Scene sink that only logs
#[derive(Default)]
struct LoggingScene {
    attached: usize,
}

impl SceneSink for LoggingScene {
    fn attach(&mut self, entity: &Entity) {
        self.attached += 1;
        log::info!("Attached entity {} ({})", entity.id(), entity.payload().kind());
    }

    fn detach(&mut self, entity: &DeletedEntity) {
        log::info!("Detached entity {}", entity.id);
    }

    fn transform_changed(&mut self, id: EntityId, transform: &Transform) {
        log::debug!("Entity {} moved to {:?}", id, transform.position);
    }

    fn property_changed(&mut self, id: EntityId, key: PropertyKey, value: &PropertyValue) {
        log::debug!("Entity {} {} = {:?}", id, key, value);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> EnvironmentResult<()> {
    let config = EnvironmentConfig::load();
    config.log_summary();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start fetch runtime: {}", e);
            std::process::exit(1);
        }
    };

    let decoders = DecoderRegistry::new().with(FnDecoder::new(&["bin", "txt"], |ctx| {
        Ok(NativeHandle::new(Blob(ctx.bytes.to_vec())))
    }));

    let mut env = Environment::builder(config)
        .decoders(decoders)
        .sink(LoggingScene::default())
        .runtime(runtime.handle().clone())
        .build()?;

    let descriptors = read_scene()?;
    let report = env.load_batch(descriptors);
    log::info!("Batch: {}", report);
    for (id, error) in &report.failed {
        log::warn!("Entity {} not loaded: {}", id, error);
    }

    let start = Instant::now();
    let deadline = start + Duration::from_secs(5);
    let mut waiting = report.pending.clone();
    while !waiting.is_empty() && Instant::now() < deadline {
        env.tick(start.elapsed());
        waiting.retain(|id| env.registry().is_pending(*id));
        std::thread::sleep(FRAME);
    }
    if !waiting.is_empty() {
        log::warn!("Still loading after 5s: {:?}", waiting);
    }

    move_node(&mut env, start)?;

    if let Some(blob) = EntityId::new(5).and_then(|id| env.registry().get_native::<Blob>(id).ok()) {
        log::info!("Model resource is {} bytes", blob.0.len());
    }

    log::info!(
        "{} entities attached, {} cache entries",
        env.sink().attached,
        env.cache().len()
    );
    env.clear();
    Ok(())
}

fn read_scene() -> EnvironmentResult<Vec<EntityDescriptor>> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(serde_json::from_str(SAMPLE_SCENE)?);
    };
    log::info!("Loading scene from {}", path);
    let text = std::fs::read_to_string(&path).map_err(|source| EnvironmentError::Io {
        path: path.into(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Feed node 2 sparse position updates at 10 Hz through the synchronizer
fn move_node(env: &mut Environment<LoggingScene>, start: Instant) -> EnvironmentResult<()> {
    let Some(node) = EntityId::new(2) else {
        return Ok(());
    };
    if !env.registry().is_loaded(node) {
        return Ok(());
    }

    env.start_filter(node, PropertyKey::POSITION, Vec3::ZERO.into())?;
    let mut next_update = Duration::ZERO;
    let mut target = Vec3::ZERO;
    let until = start.elapsed() + Duration::from_secs(1);
    while start.elapsed() < until {
        let now = start.elapsed();
        env.tick(now);
        if now >= next_update {
            target += Vec3::X * 0.1;
            env.apply(&InboundOperation::set(node, PropertyKey::POSITION, target)?)?;
            next_update = now + Duration::from_millis(100);
        }
        std::thread::sleep(FRAME);
    }
    env.stop_filter(node, PropertyKey::POSITION, target.into())?;
    log::info!("Node {} settled at {:?}", node, target);
    Ok(())
}
