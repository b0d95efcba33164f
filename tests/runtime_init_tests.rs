//! Process-wide initialization. Kept in its own test binary: the runtime
//! can be published only once per process.

use classbind::prelude::*;
use classbind::runtime;
use classbind_testkit as testkit;
use std::sync::Barrier;
use std::thread;

fn with_xr_server(db: ClassDb) -> ClassDb {
    db.with_class(
        ClassInfo::new("XRServer")
            .inherits("Object")
            .method(MethodInfo::new("get_world_scale").returns(AbiKind::Float64))
            .method(MethodInfo::new("center_on_hmd").args([AbiKind::Int64, AbiKind::Bool])),
    )
}

#[test]
fn test_initialization_lifecycle() {
    // =========================================================================
    // Before initialization
    // =========================================================================
    assert!(!runtime::is_initialized());
    assert!(matches!(runtime::get(), Err(BindError::NotInitialized)));
    assert!(matches!(Timer::new(), Err(BindError::NotInitialized)));

    // =========================================================================
    // Failed attempts publish nothing
    // =========================================================================
    let mut incomplete = testkit::interface();
    incomplete.callable_destroy = None;
    assert!(matches!(
        runtime::initialize(&incomplete, testkit::classdb(), BindConfig::default()),
        Err(BindError::MissingInterfaceFunction("callable_destroy"))
    ));
    assert!(!runtime::is_initialized());

    let err = runtime::initialize(
        &testkit::interface(),
        with_xr_server(testkit::classdb()),
        BindConfig::default(),
    )
    .unwrap_err();
    match err {
        BindError::MissingMethodBinds(keys) => {
            let mut names = keys.iter().map(ToString::to_string).collect::<Vec<_>>();
            names.sort();
            assert_eq!(names, ["XRServer.center_on_hmd", "XRServer.get_world_scale"]);
        }
        other => panic!("expected missing binds, got {other}"),
    }
    assert!(!runtime::is_initialized());

    // =========================================================================
    // Concurrent initialization publishes exactly one runtime
    // =========================================================================
    const RACERS: usize = 8;
    let config = BindConfig::default().with_optional_class("XRServer");
    let start = Barrier::new(RACERS);
    let outcomes = thread::scope(|scope| {
        let racers = (0..RACERS)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    let outcome = runtime::initialize(
                        &testkit::interface(),
                        with_xr_server(testkit::classdb()),
                        config.clone(),
                    );
                    (outcome, runtime::get().unwrap())
                })
            })
            .collect::<Vec<_>>();
        racers
            .into_iter()
            .map(|racer| racer.join().unwrap())
            .collect::<Vec<_>>()
    });

    let winners = outcomes
        .iter()
        .filter_map(|(outcome, _)| outcome.as_ref().ok().copied())
        .collect::<Vec<_>>();
    assert_eq!(winners.len(), 1);
    let rt = winners[0];
    let losers = outcomes
        .iter()
        .filter(|(outcome, _)| matches!(outcome, Err(BindError::AlreadyInitialized)))
        .count();
    assert_eq!(losers, RACERS - 1);
    assert!(outcomes.iter().all(|(_, seen)| std::ptr::eq(*seen, rt)));
    assert!(runtime::is_initialized());
    assert!(std::ptr::eq(runtime::get().unwrap(), rt));
    assert!(!rt.methods().contains("XRServer", "get_world_scale"));
    assert!(rt.methods().contains("Timer", "start"));
    assert_eq!(rt.methods().len(), testkit::classdb().method_count());
    assert_eq!(rt.api().version_major, 4);

    assert!(matches!(
        runtime::initialize(&testkit::interface(), testkit::classdb(), BindConfig::default()),
        Err(BindError::AlreadyInitialized)
    ));
    assert!(std::ptr::eq(runtime::get().unwrap(), rt));

    // =========================================================================
    // Wrappers use the published runtime
    // =========================================================================
    let timer = Timer::new().unwrap();
    assert!(std::ptr::eq(timer.handle().runtime(), rt));
    assert!(matches!(
        rt.bind("XRServer", "get_world_scale"),
        Err(BindError::UnknownMethod { .. })
    ));
}
