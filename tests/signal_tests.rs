//! Host closures connected to engine signals.

use classbind::prelude::*;
use classbind_testkit as testkit;
use std::cell::Cell;
use std::rc::Rc;

fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
    let count = Rc::new(Cell::new(0));
    let captured = count.clone();
    (count, move || captured.set(captured.get() + 1))
}

// =============================================================================
// Timers
// =============================================================================

#[test]
fn test_timeout_runs_the_closure_on_every_expiry() {
    testkit::runtime();
    let timer = Timer::new().unwrap();
    let (count, callback) = counter();

    assert_eq!(timer.on_timeout(callback).unwrap(), EngineStatus::Ok);
    timer.start().unwrap();

    assert_eq!(testkit::advance_timer(timer.as_ptr(), 0.5), 0);
    assert_eq!(count.get(), 0);
    assert_eq!(testkit::advance_timer(timer.as_ptr(), 0.5), 1);
    assert_eq!(count.get(), 1);
    assert_eq!(testkit::advance_timer(timer.as_ptr(), 1.0), 1);
    assert_eq!(count.get(), 2);
    assert!(!timer.is_stopped().unwrap());
}

#[test]
fn test_one_shot_connection_runs_once() {
    testkit::runtime();
    let timer = Timer::new().unwrap();
    let (count, callback) = counter();

    timer.on_timeout_once(callback).unwrap();
    timer.start_with(std::time::Duration::from_secs(2)).unwrap();

    assert_eq!(testkit::advance_timer(timer.as_ptr(), 2.0), 1);
    assert_eq!(testkit::advance_timer(timer.as_ptr(), 2.0), 0);
    assert_eq!(count.get(), 1);
    // The engine dropped its copy after the emission.
    assert_eq!(Rc::strong_count(&count), 1);
}

#[test]
fn test_closure_is_freed_with_its_object() {
    testkit::runtime();
    let timer = Timer::new().unwrap();
    let (count, callback) = counter();
    timer.on_timeout(callback).unwrap();
    assert_eq!(Rc::strong_count(&count), 2);

    drop(timer);
    assert_eq!(Rc::strong_count(&count), 1);
}

#[test]
fn test_callback_may_call_back_into_the_engine() {
    testkit::runtime();
    let timer = Timer::new().unwrap();
    let view = unsafe { Timer::from_handle(timer.handle().view()) };
    timer
        .on_timeout(move || {
            view.stop().unwrap();
        })
        .unwrap();

    timer.start().unwrap();
    assert_eq!(testkit::advance_timer(timer.as_ptr(), 1.0), 1);
    assert!(timer.is_stopped().unwrap());
}

#[test]
fn test_panicking_callback_is_contained() {
    testkit::runtime();
    let timer = Timer::new().unwrap();
    let (count, callback) = counter();
    timer.on_timeout(|| panic!("callback failed")).unwrap();
    timer.on_timeout(callback).unwrap();

    timer.start().unwrap();
    assert_eq!(testkit::advance_timer(timer.as_ptr(), 1.0), 2);
    assert_eq!(count.get(), 1);
    assert!(
        testkit::reported_errors()
            .iter()
            .any(|message| message.contains("panicked"))
    );
}

// =============================================================================
// Connections
// =============================================================================

#[test]
fn test_unknown_signal_is_rejected_before_connecting() {
    testkit::runtime();
    let timer = Timer::new().unwrap();
    let (count, callback) = counter();

    let err = timer
        .on("exploded", ConnectFlags::empty(), callback)
        .unwrap_err();
    assert!(matches!(
        err,
        BindError::UnknownSignal { ref class, ref signal } if class == "Timer" && signal == "exploded"
    ));
    assert_eq!(Rc::strong_count(&count), 1);

    // Inherited from Node.
    assert_eq!(
        timer.on("renamed", ConnectFlags::empty(), || {}).unwrap(),
        EngineStatus::Ok
    );
}

#[test]
fn test_connect_and_disconnect() {
    let rt = testkit::runtime();
    let node = Node::new().unwrap();
    let (count, callback) = counter();
    let callable = Callable::from_fn(rt, callback);

    assert_eq!(
        node.connect("renamed", &callable, ConnectFlags::empty()).unwrap(),
        EngineStatus::Ok
    );
    assert!(node.is_connected("renamed", &callable).unwrap());
    assert!(!node.is_connected("ready", &callable).unwrap());
    assert_eq!(testkit::emit_signal(node.as_ptr(), "renamed"), 1);
    assert_eq!(count.get(), 1);

    node.disconnect("renamed", &callable).unwrap();
    assert!(!node.is_connected("renamed", &callable).unwrap());
    assert_eq!(testkit::emit_signal(node.as_ptr(), "renamed"), 0);
    assert_eq!(count.get(), 1);

    // Only the host's copy is left.
    assert_eq!(Rc::strong_count(&count), 2);
    drop(callable);
    assert_eq!(Rc::strong_count(&count), 1);
}

#[test]
fn test_duplicate_connection_reports_engine_status() {
    let rt = testkit::runtime();
    let node = Node::new().unwrap();
    let callable = Callable::from_fn(rt, || {});

    let first = node.connect("ready", &callable, ConnectFlags::empty()).unwrap();
    let second = node.connect("ready", &callable, ConnectFlags::empty()).unwrap();
    assert!(first.is_ok());
    assert_eq!(second, EngineStatus::InvalidParameter);
    assert_eq!(testkit::emit_signal(node.as_ptr(), "ready"), 1);
}

#[test]
fn test_connecting_to_a_destroyed_object_fails_in_the_host() {
    let rt = testkit::runtime();
    let node = Node::new().unwrap();
    let view = unsafe { Node::from_handle(node.handle().view()) };
    drop(node);

    let (count, callback) = counter();
    let callable = Callable::from_fn(rt, callback);
    assert!(matches!(
        view.connect("ready", &callable, ConnectFlags::empty()),
        Err(BindError::DeadInstance(_))
    ));
    drop(callable);
    assert_eq!(Rc::strong_count(&count), 1);
}
