//! Dispatch chain integration tests

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::{Quat, Vec3};
use void_cache::{
    AssetPipeline, DecoderRegistry, EntryState, Fetcher, FnDecoder, ResourceCache, TransportError,
    TransportResult,
};
use void_core::{EntityId, NativeHandle, Version, VersionRange};
use void_dispatch::*;
use void_entity::*;

fn id(raw: u64) -> EntityId {
    EntityId::new(raw).unwrap()
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, PartialEq)]
struct Mesh(usize);

struct StaticFetcher;

#[async_trait::async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _authorization: Option<&str>) -> TransportResult<Vec<u8>> {
        if url.contains("missing") {
            Err(TransportError::NotFound(url.to_string()))
        } else {
            Ok(url.as_bytes().to_vec())
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<String>,
}

impl SceneSink for RecordingSink {
    fn attach(&mut self, entity: &Entity) {
        self.events.push(format!("attach {}", entity.id()));
    }

    fn detach(&mut self, entity: &DeletedEntity) {
        self.events.push(format!("detach {}", entity.id));
    }

    fn transform_changed(&mut self, id: EntityId, _transform: &Transform) {
        self.events.push(format!("transform {}", id));
    }

    fn property_changed(&mut self, id: EntityId, key: PropertyKey, _value: &PropertyValue) {
        self.events.push(format!("{} {}", key, id));
    }
}

struct Harness {
    registry: EntityRegistry,
    cache: ResourceCache,
    pipeline: AssetPipeline,
    sink: RecordingSink,
    tx: Sender<AttachCompletion>,
    rx: Receiver<AttachCompletion>,
}

impl Harness {
    fn new() -> Self {
        init_logging();
        let decoders = DecoderRegistry::new().with(FnDecoder::new(&["mesh"], |ctx| {
            Ok(NativeHandle::new(Mesh(ctx.bytes.len())))
        }));
        let (tx, rx) = unbounded();
        Self {
            registry: EntityRegistry::new(),
            cache: ResourceCache::new(),
            pipeline: AssetPipeline::new(decoders).with_fetcher(StaticFetcher),
            sink: RecordingSink::default(),
            tx,
            rx,
        }
    }

    fn ctx(&mut self) -> DispatchContext<'_> {
        DispatchContext {
            registry: &mut self.registry,
            cache: &mut self.cache,
            pipeline: &self.pipeline,
            sink: &mut self.sink,
            completions: &self.tx,
        }
    }

    fn register(&mut self, raw: u64, payload: impl Into<EntityPayload>) -> EntityId {
        let entity = id(raw);
        self.registry.register(entity, payload.into(), None);
        entity
    }

    fn load(&mut self, chain: &DispatchChain, entity: EntityId) -> DispatchResult<AttachOutcome> {
        let mut ctx = self.ctx();
        let outcome = chain.attach(&mut ctx, entity);
        finish_attach(&mut ctx, entity, outcome)
    }

    fn pump(&mut self) {
        self.cache.process();
        let completions: Vec<_> = self.rx.try_iter().collect();
        for completion in completions {
            complete_attach(&mut self.ctx(), completion);
        }
    }

    fn set(&mut self, chain: &DispatchChain, op: InboundOperation) -> DispatchResult<bool> {
        chain.set_raw(&mut self.ctx(), &op)
    }
}

fn model(url: &str) -> ModelDescriptor {
    ModelDescriptor {
        node: NodeDescriptor::default(),
        resource: ResourceRef::new(url),
        material_overrides: Vec::new(),
    }
}

fn line(points: usize) -> LineDescriptor {
    LineDescriptor {
        node: NodeDescriptor::default(),
        positions: (0..points).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
        width: 1.0,
        color: Color::WHITE,
        looped: false,
    }
}

fn light() -> LightDescriptor {
    LightDescriptor {
        node: NodeDescriptor::default(),
        light_type: LightType::Point,
        color: Color::WHITE,
        intensity: 1.0,
        range: 10.0,
    }
}

fn chain() -> DispatchChain {
    standard_chain(Version::new(1, 0, 0)).build()
}

#[test]
fn test_attach_plain_node() {
    let mut h = Harness::new();
    let chain = chain();
    let node = h.register(1, GenericNodeDescriptor::default());

    assert_eq!(h.load(&chain, node), Ok(AttachOutcome::Attached));
    assert!(h.registry.is_loaded(node));
    assert_eq!(h.sink.events, vec!["attach 1"]);
}

#[test]
fn test_unhandled_kind_fails_only_that_entity() {
    let mut h = Harness::new();
    let chain = chain();
    let portal = h.register(
        1,
        ExtensionDescriptor {
            kind: "portal".into(),
            data: Vec::new(),
        },
    );
    let group = h.register(2, GroupDescriptor::default());

    let err = h.load(&chain, portal).unwrap_err();
    assert_eq!(
        err,
        DispatchError::NoLoaderFound {
            entity: portal,
            kind: EntityKind::Extension
        }
    );
    assert!(h.registry.is_failed(portal));

    assert_eq!(h.load(&chain, group), Ok(AttachOutcome::Attached));
    assert!(h.registry.is_loaded(group));
}

#[test]
fn test_models_share_one_download() {
    let mut h = Harness::new();
    let chain = chain();
    let a = h.register(1, model("http://assets.test/cube.mesh"));
    let b = h.register(2, model("https://ASSETS.test:8443/cube.mesh"));

    assert_eq!(h.load(&chain, a), Ok(AttachOutcome::Pending));
    assert_eq!(h.load(&chain, b), Ok(AttachOutcome::Pending));
    assert!(!h.registry.is_loaded(a));

    h.pump();
    assert!(h.registry.is_loaded(a));
    assert!(h.registry.is_loaded(b));
    assert_eq!(h.cache.stats().fetches, 1);

    let native_a = h.registry.get(a).unwrap().native().unwrap().clone();
    let native_b = h.registry.get(b).unwrap().native().unwrap().clone();
    assert!(native_a.ptr_eq(&native_b));
    assert!(h.registry.get_native::<Mesh>(a).is_ok());
    assert_eq!(h.registry.get(a).unwrap().node().unwrap().renderables().len(), 1);

    let key = h.registry.get(a).unwrap().state::<ResourceLinks>().unwrap().keys[0].clone();
    assert_eq!(h.cache.referrer_count(&key), 2);

    match h.registry.delete(a) {
        DeleteOutcome::Deleted(deleted) => {
            assert_eq!(deleted.renderables.len(), 1);
            release_deleted(&mut h.ctx(), &deleted);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.cache.referrer_count(&key), 1);
    assert_eq!(h.cache.state(&key), EntryState::Loaded);

    if let DeleteOutcome::Deleted(deleted) = h.registry.delete(b) {
        release_deleted(&mut h.ctx(), &deleted);
    }
    assert_eq!(h.cache.state(&key), EntryState::NotLoaded);
    assert!(h.sink.events.contains(&"detach 2".to_string()));
}

#[test]
fn test_failed_download_fails_waiters() {
    use std::cell::Cell;
    use std::rc::Rc;

    let mut h = Harness::new();
    let chain = chain();
    let failed = Rc::new(Cell::new(false));
    let flag = failed.clone();
    h.registry
        .wait_until_loaded(id(1), |_| panic!("should fail"), move |_| flag.set(true));

    let m = h.register(1, model("http://assets.test/missing.mesh"));
    assert_eq!(h.load(&chain, m), Ok(AttachOutcome::Pending));
    h.pump();

    assert!(failed.get());
    assert!(h.registry.is_failed(m));
    assert!(!h.sink.events.contains(&"attach 1".to_string()));
}

#[test]
fn test_delete_while_downloading_is_deferred() {
    let mut h = Harness::new();
    let chain = chain();
    let m = h.register(1, model("http://assets.test/cube.mesh"));
    h.load(&chain, m).unwrap();

    assert!(matches!(h.registry.delete(m), DeleteOutcome::Deferred));
    assert!(h.registry.contains(m));

    h.pump();
    assert!(!h.registry.contains(m));
    assert_eq!(h.sink.events, vec!["attach 1", "detach 1"]);
    assert!(h.cache.is_empty());
}

#[test]
fn test_raw_transform_update() {
    let mut h = Harness::new();
    let chain = chain();
    let node = h.register(1, GenericNodeDescriptor::default());

    let op = InboundOperation::set(node, PropertyKey::POSITION, Vec3::new(1.0, 2.0, 3.0)).unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));
    let transform = h.registry.get(node).unwrap().node().unwrap().transform;
    assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(h.sink.events, vec!["transform 1"]);
}

#[test]
fn test_specialised_kinds_share_base_keys() {
    let mut h = Harness::new();
    let chain = chain();
    let lamp = h.register(1, light());

    let rotation = Quat::from_rotation_y(1.0);
    let update = PropertyUpdate::set(PropertyKey::ROTATION, rotation);
    assert_eq!(chain.set_property(&mut h.ctx(), lamp, &update), Ok(true));
    let update = PropertyUpdate::set(PropertyKey::ACTIVE, false);
    assert_eq!(chain.set_property(&mut h.ctx(), lamp, &update), Ok(true));
    let update = PropertyUpdate::set(PropertyKey::LIGHT_INTENSITY, 4.0f32);
    assert_eq!(chain.set_property(&mut h.ctx(), lamp, &update), Ok(true));

    let node = h.registry.get(lamp).unwrap().node().unwrap();
    assert!(node.transform.rotation.abs_diff_eq(rotation, 1e-6));
    assert!(!node.active);
    assert_eq!(h.registry.get_typed::<LightDescriptor>(lamp).unwrap().intensity, 4.0);

    // A line key does not apply to a light
    let update = PropertyUpdate::set(PropertyKey::LINE_WIDTH, 2.0f32);
    assert_eq!(chain.set_property(&mut h.ctx(), lamp, &update), Ok(false));
}

#[test]
fn test_line_vertex_deltas() {
    let mut h = Harness::new();
    let chain = chain();
    let l = h.register(1, line(3));

    let append = InboundOperation::list(
        l,
        PropertyKey::LINE_POSITIONS,
        ListDelta::AddAt(3, Vec3::Y.into()),
    )
    .unwrap();
    assert_eq!(h.set(&chain, append), Ok(true));
    assert_eq!(h.registry.get_typed::<LineDescriptor>(l).unwrap().positions.len(), 4);
    assert_eq!(h.registry.get_typed::<LineDescriptor>(l).unwrap().positions[3], Vec3::Y);

    let out_of_range = InboundOperation::list(
        l,
        PropertyKey::LINE_POSITIONS,
        ListDelta::AddAt(10, Vec3::Z.into()),
    )
    .unwrap();
    assert_eq!(h.set(&chain, out_of_range), Ok(true));
    let remove = InboundOperation::list(l, PropertyKey::LINE_POSITIONS, ListDelta::RemoveAt(10)).unwrap();
    assert_eq!(h.set(&chain, remove), Ok(true));
    assert_eq!(h.registry.get_typed::<LineDescriptor>(l).unwrap().positions.len(), 4);
    assert_eq!(h.sink.events.len(), 1);
}

#[test]
fn test_group_members_set_as_whole_list() {
    let mut h = Harness::new();
    let chain = chain();
    let g = h.register(5, GroupDescriptor::default());

    let members = PropertyValue::List(vec![id(1).into(), id(2).into()]);
    let op = InboundOperation::set(g, PropertyKey::GROUP_MEMBERS, members).unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));

    let op = InboundOperation::list(g, PropertyKey::GROUP_MEMBERS, ListDelta::SetAt(1, id(3).into())).unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));
    assert_eq!(
        h.registry.get_typed::<GroupDescriptor>(g).unwrap().members,
        vec![id(1), id(3)]
    );
}

#[test]
fn test_parent_property_links_nodes() {
    let mut h = Harness::new();
    let chain = chain();
    let parent = h.register(1, GenericNodeDescriptor::default());
    let child = h.register(2, GenericNodeDescriptor::default());

    let op = InboundOperation::set(child, PropertyKey::PARENT, parent).unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));
    assert_eq!(h.registry.get(parent).unwrap().node().unwrap().children(), &[child]);

    let op = InboundOperation::set(child, PropertyKey::PARENT, PropertyValue::Entity(None)).unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));
    assert!(h.registry.get(parent).unwrap().node().unwrap().children().is_empty());
}

#[test]
fn test_errors() {
    let mut h = Harness::new();
    let chain = chain();
    let node = h.register(1, GenericNodeDescriptor::default());

    let update = PropertyUpdate::set(PropertyKey::POSITION, true);
    assert_eq!(
        chain.set_property(&mut h.ctx(), node, &update),
        Err(DispatchError::ValueKind {
            key: PropertyKey::POSITION,
            expected: ValueKind::Vec3,
            found: ValueKind::Bool,
        })
    );

    let op = InboundOperation::set(id(99), PropertyKey::ACTIVE, true).unwrap();
    assert_eq!(
        h.set(&chain, op),
        Err(DispatchError::Entity(EntityError::NotFound(id(99))))
    );

    // Keys nobody declares are not an error
    let op = InboundOperation::new(node, PropertyKey(999), OperationId::Set, vec![1, 2]);
    assert_eq!(h.set(&chain, op), Ok(false));
}

#[test]
fn test_read_property() {
    let chain = chain();
    let op = InboundOperation::set(id(1), PropertyKey::SCALE, Vec3::splat(2.0)).unwrap();
    assert_eq!(
        chain.read_property(PropertyKey::SCALE, &op.payload),
        Ok(Some(PropertyValue::Vec3(Vec3::splat(2.0))))
    );
    assert_eq!(chain.read_property(PropertyKey(999), &op.payload), Ok(None));
}

#[test]
fn test_version_gated_nodes() {
    let mut h = Harness::new();
    let lamp = h.register(1, light());

    let old = DispatchChain::builder(Version::new(1, 0, 0))
        .with(
            LightHandler::new()
                .for_versions(VersionRange::between(Version::new(2, 0, 0), Version::new(3, 0, 0))),
        )
        .with(NodeHandler::new())
        .build();
    assert!(matches!(
        old.attach(&mut h.ctx(), lamp),
        Err(DispatchError::NoLoaderFound { .. })
    ));
    // Base keys still reach the node handler
    let update = PropertyUpdate::set(PropertyKey::SCALE, Vec3::ONE);
    assert_eq!(old.set_property(&mut h.ctx(), lamp, &update), Ok(true));

    let new = DispatchChain::builder(Version::new(2, 1, 0))
        .with(
            LightHandler::new()
                .for_versions(VersionRange::between(Version::new(2, 0, 0), Version::new(3, 0, 0))),
        )
        .build();
    assert_eq!(new.attach(&mut h.ctx(), lamp), Ok(AttachOutcome::Attached));
}

#[test]
fn test_extension_kind() {
    let mut h = Harness::new();
    let speed = PropertyKey::USER_START;
    let tags = PropertyKey(PropertyKey::USER_START.0 + 1);
    let chain = standard_chain(Version::new(1, 0, 0))
        .with(
            ExtensionHandler::new("portal")
                .with_property(speed, PropertyType::Scalar(ValueKind::Float))
                .with_property(tags, PropertyType::List(ValueKind::Text))
                .on_attach(|ctx, id, descriptor| {
                    let size = descriptor.data.len();
                    ctx.registry.get_mut(id)?.set_native(NativeHandle::new(size));
                    Ok(AttachOutcome::Attached)
                }),
        )
        .build();

    let portal = h.register(
        7,
        ExtensionDescriptor {
            kind: "portal".into(),
            data: vec![1, 2, 3],
        },
    );
    assert_eq!(h.load(&chain, portal), Ok(AttachOutcome::Attached));
    assert_eq!(h.registry.get_native::<usize>(portal), Ok(&3));

    let op = InboundOperation::set(portal, speed, 2.5f32).unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));
    let op = InboundOperation::list(
        portal,
        tags,
        ListDelta::AddAt(0, PropertyValue::Text("blue".into())),
    )
    .unwrap();
    assert_eq!(h.set(&chain, op), Ok(true));

    let bag = h.registry.get(portal).unwrap().state::<PropertyBag>().unwrap();
    assert_eq!(bag.get(speed), Some(&PropertyValue::Float(2.5)));
    assert_eq!(
        bag.get(tags),
        Some(&PropertyValue::List(vec![PropertyValue::Text("blue".into())]))
    );

    // Other kinds do not see extension keys
    let node = h.register(8, GenericNodeDescriptor::default());
    let op = InboundOperation::set(node, speed, 1.0f32).unwrap();
    assert_eq!(h.set(&chain, op), Ok(false));
}
