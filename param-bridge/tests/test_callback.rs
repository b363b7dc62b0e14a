mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CountingRegistry, SilentTransport, context_with, record};
use parking_lot::Mutex;
use param_bridge::{Builder, ParamError, ParamRegistry, ParamType, Selector};

fn wait_until(deadline: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if ready() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    ready()
}

#[test]
fn local_write_invokes_callback_with_offset() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 60, "watched", ParamType::Uint32, 4));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("watched").build().unwrap();

    let offsets = Arc::new(Mutex::new(Vec::new()));
    let seen = offsets.clone();
    param.on_change(move |_, offset| {
        seen.lock().push(offset);
        Ok(())
    });

    param.value().set(2i64, 5u32).unwrap();
    param.value().set(Selector::All, 1u32).unwrap();
    assert_eq!(*offsets.lock(), vec![2, -1]);
}

#[test]
fn local_write_propagates_callback_error() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 61, "guarded", ParamType::Uint32, 1));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("guarded").build().unwrap();

    param.on_change(|_, _| Err("rejected by watcher".into()));
    let err = param.value().set(Selector::All, 1u32).unwrap_err();
    match err {
        ParamError::Callback { param, offset, .. } => {
            assert_eq!(param, "guarded");
            assert_eq!(offset, -1);
        }
        other => panic!("expected Callback error, got {other}"),
    }
}

#[test]
fn native_change_routes_to_callback() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 62, "pushed", ParamType::Uint32, 2));
    let ctx = context_with(registry.clone(), Arc::new(SilentTransport::new()));
    let param = ctx.param("pushed").build().unwrap();

    let offsets = Arc::new(Mutex::new(Vec::new()));
    let seen = offsets.clone();
    param.on_change(move |p, offset| {
        assert_eq!(p.name(), "pushed");
        seen.lock().push(offset);
        Ok(())
    });

    // A native-side mutation fires the record hook from its own thread.
    let rec = registry.find(0, 62).unwrap();
    std::thread::spawn(move || {
        rec.write_elem(1, &9u32.to_le_bytes());
        rec.notify_change(1);
    })
    .join()
    .unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        *offsets.lock() == vec![1]
    }));
    assert_eq!(ctx.callback_failures(), 0);
}

#[test]
fn routed_callback_errors_are_counted_not_raised() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 63, "grumpy", ParamType::Uint32, 1));
    let ctx = context_with(registry.clone(), Arc::new(SilentTransport::new()));
    let param = ctx.param("grumpy").build().unwrap();
    param.on_change(|_, _| Err("always fails".into()));

    let rec = registry.find(0, 63).unwrap();
    rec.notify_change(0);
    rec.notify_change(0);

    assert!(wait_until(Duration::from_secs(2), || {
        ctx.callback_failures() == 2
    }));
}

#[test]
fn routed_callback_panic_is_contained() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 64, "bomb", ParamType::Uint32, 1));
    let ctx = context_with(registry.clone(), Arc::new(SilentTransport::new()));
    let param = ctx.param("bomb").build().unwrap();
    param.on_change(|_, _| panic!("callback blew up"));

    registry.find(0, 64).unwrap().notify_change(0);
    assert!(wait_until(Duration::from_secs(2), || {
        ctx.callback_failures() == 1
    }));

    // The worker survived and keeps dispatching.
    param.clear_on_change();
    assert!(!param.has_on_change());
    registry.find(0, 64).unwrap().notify_change(0);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ctx.callback_failures(), 1);
}

#[test]
fn unset_callback_is_a_quiet_noop() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 65, "silent", ParamType::Uint32, 1));
    let ctx = context_with(registry.clone(), Arc::new(SilentTransport::new()));
    let _param = ctx.param("silent").build().unwrap();

    registry.find(0, 65).unwrap().notify_change(0);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ctx.callback_failures(), 0);
}

#[test]
fn dropping_the_wrapper_uninstalls_the_hook() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 66, "gone", ParamType::Uint32, 1));
    let ctx = context_with(registry.clone(), Arc::new(SilentTransport::new()));

    let param = ctx.param("gone").build().unwrap();
    param.on_change(|_, _| Err("should never run".into()));
    drop(param);

    // No wrapper, no hook: the native side has nothing to route.
    registry.find(0, 66).unwrap().notify_change(0);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ctx.callback_failures(), 0);
}

#[test]
fn shutdown_joins_the_router_worker() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 67, "bye", ParamType::Uint32, 1));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let _param = ctx.param("bye").build().unwrap();
    ctx.shutdown();
}
