//! End-to-end verification of the assembled engine: host units,
//! sandboxed extensions, quotas, isolation and determinism.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ember::{
    ComponentKind, ComponentTypeId, ComponentValue, CoreResult, Engine, EngineConfig,
    ExtensionPolicy, Query, SandboxError, Transform, UnitRun, UpdateUnit, World,
};

const POSITION: ComponentTypeId = ComponentTypeId(0);
const BODY: ComponentTypeId = ComponentTypeId(1);

struct RecordingUnit {
    id: String,
    required: Vec<ComponentTypeId>,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingUnit {
    fn boxed(id: &str, required: &[ComponentTypeId], log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            id: id.to_string(),
            required: required.to_vec(),
            log: Arc::clone(log),
            fail: false,
        })
    }
}

impl UpdateUnit for RecordingUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn required_components(&self) -> Vec<ComponentTypeId> {
        self.required.clone()
    }

    fn update(&mut self, _world: &mut World, _run: &UnitRun) -> CoreResult<()> {
        self.log.lock().unwrap().push(self.id.clone());
        if self.fail {
            return Err(ember::CoreError::UnknownUnit(self.id.clone()));
        }
        Ok(())
    }
}

fn engine() -> Engine {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine
        .register_component(POSITION, ComponentKind::Transform, 128)
        .unwrap();
    engine
        .register_component(BODY, ComponentKind::RigidBody, 128)
        .unwrap();
    engine
}

fn permissive_policy() -> ExtensionPolicy {
    ExtensionPolicy {
        allowed_components: vec![POSITION.0],
        ..ExtensionPolicy::default()
    }
}

#[test]
fn registration_order_does_not_defeat_dependencies() {
    // B registered before A but declared to run after it.
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = engine();

    engine
        .register_unit(RecordingUnit::boxed("b", &[POSITION], &log))
        .unwrap();
    engine
        .register_unit(RecordingUnit::boxed("a", &[POSITION], &log))
        .unwrap();
    engine.set_dependency("b", "a").unwrap();

    engine.update(0.016).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
}

#[test]
fn resolved_order_is_deterministic() {
    let build_order = || {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        for id in ["physics", "ai", "audio", "cleanup"] {
            engine
                .register_unit(RecordingUnit::boxed(id, &[], &log))
                .unwrap();
        }
        engine.set_dependency("cleanup", "physics").unwrap();
        engine.set_dependency("audio", "ai").unwrap();
        engine.scheduler_mut().resolved_order().unwrap()
    };

    let first = build_order();
    for _ in 0..3 {
        assert_eq!(build_order(), first);
    }
}

#[test]
fn failing_unit_is_isolated() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = engine();

    let mut bad = RecordingUnit::boxed("bad", &[], &log);
    bad.fail = true;
    engine.register_unit(bad).unwrap();
    engine
        .register_unit(RecordingUnit::boxed("good", &[], &log))
        .unwrap();

    let stats = engine.update(0.016).unwrap();
    assert_eq!(stats.failures, 1);
    assert_eq!(*log.lock().unwrap(), vec!["bad", "good"]);
    assert_eq!(engine.metrics().counter("scheduler.unit_failures"), 1);

    // The next tick still runs everything.
    let stats = engine.update(0.016).unwrap();
    assert_eq!(stats.tick, 2);
    assert_eq!(stats.failures, 1);
}

#[test]
fn extension_quota_scenario() {
    let mut engine = engine();
    engine
        .admit_extension(
            "mod_a",
            ExtensionPolicy {
                max_entities: 2,
                ..permissive_policy()
            },
        )
        .unwrap();

    let mut api = engine.extension_api("mod_a");
    let e1 = api.create_entity().unwrap();
    let e2 = api.create_entity().unwrap();
    let err = api.create_entity();
    assert_eq!(err, Err(SandboxError::EntityLimitExceeded { limit: 2 }));
    assert_eq!(api.owned_entities().unwrap(), vec![e1, e2]);

    // Freeing quota makes creation retryable.
    api.destroy_entity(e1).unwrap();
    let e3 = api.create_entity().unwrap();
    assert_eq!(api.owned_entities().unwrap(), vec![e2, e3]);
}

#[test]
fn sandbox_isolation_holds() {
    let mut engine = engine();
    engine.admit_extension("mod_a", permissive_policy()).unwrap();
    engine.admit_extension("mod_b", permissive_policy()).unwrap();

    let ea = {
        let mut api = engine.extension_api("mod_a");
        let ea = api.create_entity().unwrap();
        api.add_component(
            ea,
            POSITION,
            ComponentValue::Transform(Transform::new(1.0, 2.0, 3.0)),
        )
        .unwrap();
        ea
    };

    let mut intruder = engine.extension_api("mod_b");
    assert_eq!(
        intruder.get_component(ea, POSITION),
        Err(SandboxError::PermissionDenied { entity: ea })
    );
    assert_eq!(
        intruder.remove_component(ea, POSITION),
        Err(SandboxError::PermissionDenied { entity: ea })
    );
    assert_eq!(
        intruder.destroy_entity(ea),
        Err(SandboxError::PermissionDenied { entity: ea })
    );

    // System entities are denied before ownership is even considered.
    let system = engine.system_entities()[0];
    let mut api = engine.extension_api("mod_a");
    assert_eq!(
        api.destroy_entity(system),
        Err(SandboxError::SystemEntityAccessDenied { entity: system })
    );

    // The victim's component survived every attempt.
    assert_eq!(
        engine.world().get_component(ea, POSITION).unwrap(),
        &ComponentValue::Transform(Transform::new(1.0, 2.0, 3.0))
    );
}

#[test]
fn extension_queries_see_only_owned_entities() {
    let mut engine = engine();
    engine.admit_extension("mod_a", permissive_policy()).unwrap();

    // Host entity with a position the extension must never see.
    let host = engine.world_mut().create_entity();
    engine
        .world_mut()
        .add_component(
            host,
            POSITION,
            ComponentValue::Transform(Transform::default()),
        )
        .unwrap();

    let mut api = engine.extension_api("mod_a");
    let mine = api.create_entity().unwrap();
    api.add_component(
        mine,
        POSITION,
        ComponentValue::Transform(Transform::default()),
    )
    .unwrap();

    let q = Query::new().with_all(&[POSITION]);
    assert_eq!(api.find_entities(&q).unwrap(), vec![mine]);
    assert_eq!(api.count_entities(&q).unwrap(), 1);
    assert_eq!(api.queries_used_this_tick().unwrap(), 2);
}

#[test]
fn screened_system_never_reaches_the_scheduler() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = engine();
    engine.admit_extension("mod_a", permissive_policy()).unwrap();

    let mut api = engine.extension_api("mod_a");
    let err = api.register_system(
        RecordingUnit::boxed("../../escape", &[], &log),
        Duration::from_millis(1),
    );
    assert!(matches!(err, Err(SandboxError::SecurityViolation { .. })));
    assert!(api.registered_systems().unwrap().is_empty());

    // A clean unit passes and participates in the next tick.
    api.register_system(
        RecordingUnit::boxed("spark_decay", &[], &log),
        Duration::from_millis(1),
    )
    .unwrap();
    engine.update(0.016).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["spark_decay"]);
}

#[test]
fn forced_teardown_rolls_back_everything() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = engine();
    engine
        .admit_extension(
            "mod_a",
            ExtensionPolicy {
                max_violations: 1,
                ..permissive_policy()
            },
        )
        .unwrap();

    let owned = {
        let mut api = engine.extension_api("mod_a");
        let owned = api.create_entity().unwrap();
        api.register_system(
            RecordingUnit::boxed("honest", &[], &log),
            Duration::from_millis(1),
        )
        .unwrap();
        owned
    };

    // Two screening failures cross the one-violation ceiling.
    for _ in 0..2 {
        let mut api = engine.extension_api("mod_a");
        let _ = api.register_system(
            RecordingUnit::boxed("exec(payload)", &[], &log),
            Duration::from_millis(1),
        );
    }

    assert!(!engine.sandbox().is_admitted("mod_a"));
    assert!(!engine.world().is_valid(owned));
    assert!(!engine.scheduler().contains("honest"));

    // Ticks keep running; the torn-down unit is simply gone.
    engine.update(0.016).unwrap();
    assert!(log.lock().unwrap().iter().all(|id| id != "honest"));
}

#[test]
fn tick_metrics_flow_into_the_hub() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = engine();
    engine
        .register_unit(RecordingUnit::boxed("mover", &[POSITION], &log))
        .unwrap();

    for _ in 0..5 {
        engine.update(0.016).unwrap();
    }

    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.histograms["scheduler.tick_ms"].count, 5);
    assert!(snapshot.gauges.contains_key("ecs.entities"));
}
