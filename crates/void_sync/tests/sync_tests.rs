//! Property synchronizer integration tests

use std::time::Duration;

use glam::{Quat, Vec3};
use void_cache::{AssetPipeline, DecoderRegistry, ResourceCache};
use void_core::EntityId;
use void_dispatch::{
    standard_chain, DispatchContext, DispatchError, DispatchResult, NullSink, PropertyChange, PropertyKey,
    PropertyUpdate, PropertyValue, ValueKind,
};
use void_entity::{EntityRegistry, GenericNodeDescriptor};
use void_sync::prelude::*;

fn id(raw: u64) -> EntityId {
    EntityId::new(raw).unwrap()
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Recorder {
    updates: Vec<(EntityId, PropertyUpdate)>,
}

impl UpdateSink for Recorder {
    fn apply(&mut self, entity: EntityId, update: &PropertyUpdate) -> DispatchResult<bool> {
        self.updates.push((entity, update.clone()));
        Ok(true)
    }
}

#[test]
fn test_converges_on_steady_target() {
    init_logging();
    let mut sync = PropertySynchronizer::new(SyncConfig::default());
    let mut sink = Recorder::default();
    let target = Vec3::new(10.0, -4.0, 2.0);

    sync.start(id(1), PropertyKey::POSITION, Vec3::ZERO.into(), ms(0)).unwrap();
    for n in 1..=40 {
        sync.on_measurement(id(1), PropertyKey::POSITION, &target.into(), ms(100 * n)).unwrap();
        sync.tick(ms(100 * n + 50), &mut sink);
        sync.tick(ms(100 * n + 90), &mut sink);
    }

    let shown = sync.value(id(1), PropertyKey::POSITION).unwrap().as_vec3().unwrap();
    assert!(shown.abs_diff_eq(target, 0.05), "{:?}", shown);
    assert_eq!(sink.updates.len(), 80);
}

#[test]
fn test_moves_monotonically_between_measurements() {
    let mut sync = PropertySynchronizer::default();
    let mut sink = Recorder::default();
    let key = PropertyKey::LIGHT_INTENSITY;

    sync.start(id(1), key, PropertyValue::Float(0.0), ms(0)).unwrap();
    sync.on_measurement(id(1), key, &PropertyValue::Float(1.0), ms(100)).unwrap();

    let mut last = 0.0;
    for t in [110, 130, 160, 190] {
        assert_eq!(sync.tick(ms(t), &mut sink), 1);
        let v = sync.value(id(1), key).unwrap().as_float().unwrap();
        assert!(v > last && v <= 1.0);
        last = v;
    }
}

#[test]
fn test_stop_applies_final_value_exactly() {
    let mut sync = PropertySynchronizer::default();
    let mut sink = Recorder::default();
    let exact = Vec3::new(1.25, 2.5, -3.75);

    sync.start(id(7), PropertyKey::SCALE, Vec3::ONE.into(), ms(0)).unwrap();
    sync.on_measurement(id(7), PropertyKey::SCALE, &Vec3::splat(3.0).into(), ms(50)).unwrap();
    sync.tick(ms(60), &mut sink);
    sink.updates.clear();

    assert!(sync.stop(id(7), PropertyKey::SCALE, exact.into(), &mut sink).unwrap());
    assert_eq!(
        sink.updates,
        vec![(id(7), PropertyUpdate::set(PropertyKey::SCALE, exact))]
    );
    assert!(!sync.is_filtering(id(7), PropertyKey::SCALE));

    // Stopped filters produce nothing
    assert_eq!(sync.tick(ms(70), &mut sink), 0);
    assert_eq!(
        sync.stop(id(7), PropertyKey::SCALE, exact.into(), &mut sink),
        Err(SyncError::NotFiltering {
            entity: id(7),
            key: PropertyKey::SCALE
        })
    );
}

#[test]
fn test_holds_until_rate_is_known() {
    let mut sync = PropertySynchronizer::default();
    let mut sink = Recorder::default();
    sync.start(id(1), PropertyKey::POSITION, Vec3::X.into(), ms(0)).unwrap();

    for t in [0, 16, 33, 1000] {
        assert_eq!(sync.tick(ms(t), &mut sink), 0);
    }
    assert!(sink.updates.is_empty());
    assert_eq!(
        sync.value(id(1), PropertyKey::POSITION),
        Some(&PropertyValue::Vec3(Vec3::X))
    );
}

#[test]
fn test_overdue_measurement_suppresses_output() {
    let mut sync = PropertySynchronizer::default();
    let mut sink = Recorder::default();
    let key = PropertyKey::POSITION;

    sync.start(id(1), key, Vec3::ZERO.into(), ms(0)).unwrap();
    sync.on_measurement(id(1), key, &Vec3::X.into(), ms(200)).unwrap();

    assert_eq!(sync.tick(ms(300), &mut sink), 1);
    let held = sync.value(id(1), key).cloned();
    // 5 Hz: the next measurement was due at 400ms
    assert_eq!(sync.tick(ms(450), &mut sink), 0);
    assert_eq!(sync.tick(ms(900), &mut sink), 0);
    assert_eq!(sync.value(id(1), key).cloned(), held);

    // A late measurement resumes from what was shown
    sync.on_measurement(id(1), key, &Vec3::X.into(), ms(1000)).unwrap();
    assert_eq!(sync.tick(ms(1010), &mut sink), 1);
    let resumed = sync.value(id(1), key).unwrap().as_vec3().unwrap();
    assert!(resumed.x >= held.unwrap().as_vec3().unwrap().x);
}

#[test]
fn test_rotation_turns_towards_target() {
    let mut sync = PropertySynchronizer::default();
    let mut sink = Recorder::default();
    let key = PropertyKey::ROTATION;
    let target = Quat::from_rotation_y(1.2);

    sync.start(id(3), key, Quat::IDENTITY.into(), ms(0)).unwrap();
    let mut last_angle = target.angle_between(Quat::IDENTITY);
    for n in 1..=20 {
        sync.on_measurement(id(3), key, &target.into(), ms(100 * n)).unwrap();
        assert_eq!(sync.tick(ms(100 * n + 80), &mut sink), 1);
        let shown = sync.value(id(3), key).unwrap().as_rotation().unwrap();
        assert!(shown.is_normalized());
        let angle = target.angle_between(shown);
        assert!(angle <= last_angle + 1e-4);
        last_angle = angle;
    }
    assert!(last_angle < 0.01, "{}", last_angle);
    assert!(sink
        .updates
        .iter()
        .all(|(_, u)| matches!(&u.change, PropertyChange::Set(PropertyValue::Rotation(_)))));
}

#[test]
fn test_int_values_stay_integral() {
    let mut sync = PropertySynchronizer::default();
    let mut sink = Recorder::default();
    let key = PropertyKey(1001);

    sync.start(id(1), key, PropertyValue::Int(0), ms(0)).unwrap();
    sync.on_measurement(id(1), key, &PropertyValue::Int(100), ms(100)).unwrap();
    sync.tick(ms(150), &mut sink);
    assert!(matches!(sync.value(id(1), key), Some(PropertyValue::Int(v)) if *v > 0 && *v < 100));
}

#[test]
fn test_rejects_unfilterable_and_mismatched_values() {
    let mut sync = PropertySynchronizer::default();

    assert_eq!(
        sync.start(id(1), PropertyKey::ACTIVE, PropertyValue::Bool(true), ms(0)),
        Err(SyncError::UnfilterableType {
            key: PropertyKey::ACTIVE,
            kind: ValueKind::Bool
        })
    );
    assert!(!sync.is_filtering(id(1), PropertyKey::ACTIVE));

    sync.start(id(1), PropertyKey::POSITION, Vec3::ZERO.into(), ms(0)).unwrap();
    assert_eq!(
        sync.on_measurement(id(1), PropertyKey::POSITION, &PropertyValue::Float(1.0), ms(10)),
        Err(SyncError::KindMismatch {
            key: PropertyKey::POSITION,
            expected: ValueKind::Vec3,
            found: ValueKind::Float
        })
    );
    assert_eq!(
        sync.on_measurement(id(2), PropertyKey::POSITION, &Vec3::X.into(), ms(10)),
        Err(SyncError::NotFiltering {
            entity: id(2),
            key: PropertyKey::POSITION
        })
    );
}

#[test]
fn test_sink_errors_do_not_stop_the_tick() {
    init_logging();
    let mut sync = PropertySynchronizer::default();
    for raw in [1, 2] {
        sync.start(id(raw), PropertyKey::POSITION, Vec3::ZERO.into(), ms(0)).unwrap();
        sync.on_measurement(id(raw), PropertyKey::POSITION, &Vec3::X.into(), ms(100)).unwrap();
    }

    let mut seen = Vec::new();
    let mut sink = |entity: EntityId, _update: &PropertyUpdate| -> DispatchResult<bool> {
        seen.push(entity);
        if entity == id(1) {
            Err(DispatchError::UnknownFormat(entity))
        } else {
            Ok(true)
        }
    };
    assert_eq!(sync.tick(ms(150), &mut sink), 1);
    assert_eq!(seen, vec![id(1), id(2)]);
}

#[test]
fn test_chain_sink_moves_registered_node() {
    init_logging();
    let chain = standard_chain(void_core::Version::new(1, 0, 0)).build();
    let mut registry = EntityRegistry::new();
    let mut cache = ResourceCache::new();
    let pipeline = AssetPipeline::new(DecoderRegistry::new());
    let mut scene = NullSink;
    let (tx, _rx) = crossbeam_channel::unbounded();

    let node = id(5);
    registry.register(node, GenericNodeDescriptor::default().into(), None);

    let mut sync = PropertySynchronizer::default();
    sync.start(node, PropertyKey::POSITION, Vec3::ZERO.into(), ms(0)).unwrap();
    sync.on_measurement(node, PropertyKey::POSITION, &Vec3::new(0.0, 2.0, 0.0).into(), ms(100))
        .unwrap();

    let mut ctx = DispatchContext {
        registry: &mut registry,
        cache: &mut cache,
        pipeline: &pipeline,
        sink: &mut scene,
        completions: &tx,
    };
    let applied = sync.tick(ms(150), &mut ChainSink::new(&chain, &mut ctx));
    assert_eq!(applied, 1);

    let y = registry.get(node).unwrap().node().unwrap().transform.position.y;
    assert!(y > 0.0 && y < 2.0, "{}", y);

    let final_position = Vec3::new(0.0, 2.0, 0.0);
    let mut ctx = DispatchContext {
        registry: &mut registry,
        cache: &mut cache,
        pipeline: &pipeline,
        sink: &mut scene,
        completions: &tx,
    };
    sync.stop(node, PropertyKey::POSITION, final_position.into(), &mut ChainSink::new(&chain, &mut ctx))
        .unwrap();
    assert_eq!(
        registry.get(node).unwrap().node().unwrap().transform.position,
        final_position
    );
}
