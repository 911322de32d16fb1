//! Integration tests for Larder

use larder::{
    create_registry, define_store, App, MutationInfo, MutationKind, PluginContext,
    RegistryConfig, StateMap, Store, StoreDefinition, StoreError,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tracing::Level;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::TRACE)
        .try_init();
}

fn object(value: Value) -> StateMap {
    value.as_object().cloned().unwrap_or_default()
}

fn app_with(config: RegistryConfig) -> App {
    let app = App::new();
    app.install(create_registry(config)).expect("install registry");
    app
}

fn counter_definition(factory_calls: Arc<AtomicUsize>) -> StoreDefinition {
    define_store("counter")
        .state(move || {
            factory_calls.fetch_add(1, Ordering::SeqCst);
            Ok(object(json!({"a": 1, "b": 2})))
        })
        .action("increment", |store: &Store, args: &[Value]| {
            let amount = args.first().and_then(Value::as_i64).unwrap_or(1);
            let a = store.get("a").and_then(|a| a.as_i64()).unwrap_or(0);
            store.set("a", a + amount)?;
            Ok(json!(a + amount))
        })
        .action("increment_twice", |store: &Store, _: &[Value]| {
            store.call("increment", &[])?;
            store.call("increment", &[])
        })
        .build()
        .expect("definition")
}

#[test]
fn singleton_per_registry() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let definition = counter_definition(Arc::clone(&calls));
    let app = app_with(RegistryConfig::new());

    let (first, second) = app.run(|| {
        let first = definition.use_store().expect("first lookup");
        let second = definition.use_store().expect("second lookup");
        (first, second)
    });
    let third = app.use_store(&definition).expect("explicit lookup");

    assert!(first.ptr_eq(&second));
    assert!(first.ptr_eq(&third));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn registries_are_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let definition = counter_definition(Arc::clone(&calls));
    let app_a = app_with(RegistryConfig::new());
    let app_b = app_with(RegistryConfig::new());

    let a = app_a.use_store(&definition).expect("store a");
    let b = app_b.use_store(&definition).expect("store b");
    assert!(!a.ptr_eq(&b));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    a.set("a", 50).expect("set");
    assert_eq!(a.get("a"), Some(json!(50)));
    assert_eq!(b.get("a"), Some(json!(1)));
}

#[test]
fn lookup_without_registry_fails() {
    let definition = counter_definition(Arc::new(AtomicUsize::new(0)));
    assert!(matches!(
        definition.use_store(),
        Err(StoreError::RegistryNotInstalled)
    ));
    assert!(matches!(
        App::new().use_store(&definition),
        Err(StoreError::RegistryNotInstalled)
    ));
}

#[test]
fn reset_restores_the_initial_snapshot() {
    let definition = counter_definition(Arc::new(AtomicUsize::new(0)));
    let store = app_with(RegistryConfig::new())
        .use_store(&definition)
        .expect("store");

    store.set("a", 99).expect("set a");
    store.set("newField", "x").expect("set newField");
    store.reset();

    assert_eq!(store.state(), json!({"a": 1, "b": 2}));
    assert!(!store.contains("newField"));
}

#[test]
fn subscription_delivery_and_unsubscribe() {
    let definition = counter_definition(Arc::new(AtomicUsize::new(0)));
    let store = app_with(RegistryConfig::new())
        .use_store(&definition)
        .expect("store");
    let calls: Arc<Mutex<Vec<(MutationInfo, Value)>>> = Arc::new(Mutex::new(Vec::new()));

    assert!(!store.is_watching());
    let unsubscribe = store.subscribe({
        let calls = Arc::clone(&calls);
        move |mutation, state| calls.lock().push((mutation.clone(), state.clone()))
    });
    assert!(store.is_watching());

    store.set("a", 5).expect("set");
    {
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        let (mutation, state) = &calls[0];
        assert_eq!(mutation.store_id, "counter");
        assert_eq!(mutation.kind, MutationKind::Direct);
        assert_eq!(mutation.kind.as_str(), "direct");
        assert_eq!(state["a"], json!(5));
    }

    assert!(unsubscribe.unsubscribe());
    assert!(!unsubscribe.unsubscribe());
    assert!(!store.is_watching());
    store.set("a", 6).expect("set");
    assert_eq!(calls.lock().len(), 1);
}

#[test]
fn reset_is_a_single_notification() {
    let definition = counter_definition(Arc::new(AtomicUsize::new(0)));
    let store = app_with(RegistryConfig::new())
        .use_store(&definition)
        .expect("store");
    store.set("a", 10).expect("set");
    store.set("b", 20).expect("set");
    store.set("extra", true).expect("set");

    let calls = Arc::new(AtomicUsize::new(0));
    store.subscribe({
        let calls = Arc::clone(&calls);
        move |_, state| {
            assert_eq!(*state, json!({"a": 1, "b": 2}));
            calls.fetch_add(1, Ordering::SeqCst);
        }
    });

    store.reset();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn getters_are_memoized() {
    let computations = Arc::new(AtomicUsize::new(0));
    let definition = define_store("memo")
        .state(|| Ok(object(json!({"a": 2, "unrelated": 0}))))
        .getter("double", {
            let computations = Arc::clone(&computations);
            move |store: &Store| {
                computations.fetch_add(1, Ordering::SeqCst);
                json!(store.get("a").and_then(|a| a.as_i64()).unwrap_or(0) * 2)
            }
        })
        .build()
        .expect("definition");
    let store = app_with(RegistryConfig::new())
        .use_store(&definition)
        .expect("store");

    assert_eq!(computations.load(Ordering::SeqCst), 0);
    for _ in 0..5 {
        assert_eq!(store.getter("double").expect("getter"), json!(4));
    }
    assert_eq!(computations.load(Ordering::SeqCst), 1);

    store.set("unrelated", 1).expect("set");
    assert_eq!(store.getter("double").expect("getter"), json!(4));
    assert_eq!(computations.load(Ordering::SeqCst), 1);

    store.set("a", 10).expect("set");
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(store.getter("double").expect("getter"), json!(20));
    assert_eq!(store.getter("double").expect("getter"), json!(20));
    assert_eq!(computations.load(Ordering::SeqCst), 2);
}

#[test]
fn plugins_run_in_order_once_per_store() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = RegistryConfig::new()
        .plugin_fn({
            let log = Arc::clone(&log);
            move |_: &PluginContext<'_>| {
                log.lock().push("p1");
                Ok(())
            }
        })
        .plugin_fn({
            let log = Arc::clone(&log);
            move |_: &PluginContext<'_>| {
                log.lock().push("p2");
                Ok(())
            }
        });
    let app = app_with(config);
    let definition = counter_definition(Arc::new(AtomicUsize::new(0)));

    app.use_store(&definition).expect("store");
    app.use_store(&definition).expect("store again");
    assert_eq!(*log.lock(), vec!["p1", "p2"]);
}

#[test]
fn plugins_see_each_others_changes_and_the_context() {
    let app = app_with(
        RegistryConfig::new()
            .plugin_fn(|ctx| {
                ctx.store.set("stamped", ctx.id)?;
                Ok(())
            })
            .plugin_fn(|ctx| {
                assert_eq!(ctx.store.get("stamped"), Some(json!(ctx.id)));
                assert!(ctx.app.registry().is_some());
                let label = ctx.options.option("label").cloned().unwrap_or(Value::Null);
                ctx.store.set("label", label)?;
                Ok(())
            }),
    );
    let definition = define_store("annotated")
        .option("label", "hello")
        .build()
        .expect("definition");

    let store = app.use_store(&definition).expect("store");
    assert_eq!(store.get("stamped"), Some(json!("annotated")));
    assert_eq!(store.get("label"), Some(json!("hello")));
}

#[test]
fn plugin_subscriptions_outlive_assembly() {
    let changes = Arc::new(AtomicUsize::new(0));
    let app = app_with(RegistryConfig::new().plugin_fn({
        let changes = Arc::clone(&changes);
        move |ctx| {
            let changes = Arc::clone(&changes);
            ctx.store.subscribe(move |_, _| {
                changes.fetch_add(1, Ordering::SeqCst);
            });
            Ok(())
        }
    }));
    let store = app
        .use_store(&counter_definition(Arc::new(AtomicUsize::new(0))))
        .expect("store");

    store.call("increment", &[]).expect("increment");
    store.reset();
    assert_eq!(changes.load(Ordering::SeqCst), 2);
    assert_eq!(store.subscriber_count(), 1);
}

#[test]
fn actions_share_state_through_the_bound_store() {
    let store = app_with(RegistryConfig::new())
        .use_store(&counter_definition(Arc::new(AtomicUsize::new(0))))
        .expect("store");

    assert_eq!(store.call("increment", &[json!(10)]).expect("call"), json!(11));
    assert_eq!(store.call("increment_twice", &[]).expect("call"), json!(13));
    assert_eq!(store.get("a"), Some(json!(13)));
    assert!(store.has_action("increment"));
    assert_eq!(
        store.action_names().collect::<Vec<_>>(),
        ["increment", "increment_twice"]
    );
}

#[test]
fn failed_state_factory_does_not_poison_the_registry() {
    let fail = Arc::new(AtomicBool::new(true));
    let definition = define_store("flaky")
        .state({
            let fail = Arc::clone(&fail);
            move || {
                if fail.load(Ordering::SeqCst) {
                    return Err(StoreError::application("not yet"));
                }
                Ok(object(json!({"ready": true})))
            }
        })
        .build()
        .expect("definition");
    let app = app_with(RegistryConfig::new());

    match app.use_store(&definition) {
        Err(StoreError::StateFactory { store, source }) => {
            assert_eq!(store, "flaky");
            assert!(matches!(*source, StoreError::Application(_)));
        }
        other => panic!("expected factory failure, got {other:?}"),
    }
    assert!(app.registry().is_some_and(|registry| !registry.contains("flaky")));

    fail.store(false, Ordering::SeqCst);
    let store = app.use_store(&definition).expect("second attempt");
    assert_eq!(store.get("ready"), Some(json!(true)));
}

#[test]
fn destructured_fields_stay_reactive() {
    let store = app_with(RegistryConfig::new())
        .use_store(&counter_definition(Arc::new(AtomicUsize::new(0))))
        .expect("store");
    let fields = store.fields();
    let a = fields["a"].clone();
    drop(fields);

    let calls = Arc::new(AtomicUsize::new(0));
    store.subscribe({
        let calls = Arc::clone(&calls);
        move |_, state| {
            assert_eq!(state["a"], json!(42));
            calls.fetch_add(1, Ordering::SeqCst);
        }
    });

    assert!(a.set(json!(42)));
    assert_eq!(store.get("a"), Some(json!(42)));
    assert!(!a.set(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn subscribers_end_on_the_latest_state_when_one_of_them_writes() {
    let store = app_with(RegistryConfig::new())
        .use_store(&counter_definition(Arc::new(AtomicUsize::new(0))))
        .expect("store");
    store.subscribe({
        let writer = store.clone();
        move |_, state| {
            if state["a"] == json!(5) {
                writer.set("a", 6).expect("set from subscriber");
            }
        }
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    store.subscribe({
        let seen = Arc::clone(&seen);
        move |_, state| seen.lock().push(state["a"].clone())
    });

    store.set("a", 5).expect("set");
    assert_eq!(store.get("a"), Some(json!(6)));
    assert_eq!(seen.lock().last(), Some(&json!(6)));
    assert_eq!(*seen.lock(), vec![json!(5), json!(6)]);
}

proptest! {
    #[test]
    fn reset_round_trips_arbitrary_mutations(
        writes in proptest::collection::vec(("[a-d]", -1000i64..1000), 0..20),
        removals in proptest::collection::vec("[a-d]", 0..4),
    ) {
        let definition = define_store("prop")
            .state(|| Ok(object(json!({"a": 1, "b": [1, 2], "c": {"nested": true}}))))
            .build()
            .expect("definition");
        let store = app_with(RegistryConfig::new()).use_store(&definition).expect("store");

        for (field, value) in writes {
            store.set(&field, value).expect("set");
        }
        for field in removals {
            store.remove(&field);
        }
        store.reset();

        prop_assert_eq!(
            store.state(),
            json!({"a": 1, "b": [1, 2], "c": {"nested": true}})
        );
    }
}
