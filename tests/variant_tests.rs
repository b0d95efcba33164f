//! Variants across the boundary: loopback calls, properties and signals
//! that carry arguments.

use classbind::prelude::*;
use classbind::sys::VariantRaw;
use classbind_testkit as testkit;
use std::cell::RefCell;
use std::ptr;
use std::rc::Rc;

fn echo_variant(value: &Variant) -> Variant {
    let rt = testkit::runtime();
    let mut frame = Frame::new();
    frame.arg(value.as_raw()).unwrap();
    let ret = frame.ret::<VariantRaw>().unwrap();
    rt.bind("Probe", "echo_variant")
        .unwrap()
        .ptrcall(ptr::null_mut(), &mut frame)
        .unwrap();
    unsafe { Variant::from_raw(rt.api(), frame.get(ret).unwrap()) }
}

fn variant<T: ToVariant + ?Sized>(value: &T) -> Variant {
    Variant::new(testkit::runtime().api(), value).unwrap()
}

// =============================================================================
// Loopback
// =============================================================================

#[test]
fn test_variants_survive_a_round_trip() {
    let int = echo_variant(&variant(&-40i64));
    assert_eq!(int.get_type(), VariantType::Int);
    assert_eq!(int.to::<i64>().unwrap(), -40);

    assert!(echo_variant(&variant(&true)).to::<bool>().unwrap());
    assert_eq!(echo_variant(&variant(&2.5f64)).to::<f64>().unwrap(), 2.5);
    assert_eq!(
        echo_variant(&variant("päckchen")).to::<String>().unwrap(),
        "päckchen"
    );

    let rect = Rect2::new(1.0, 2.0, 3.0, 4.0);
    assert_eq!(echo_variant(&variant(&rect)).to::<Rect2>().unwrap(), rect);

    let transform = Transform2D::from_translation(Vector2::new(-1.0, 8.0));
    assert_eq!(
        echo_variant(&variant(&transform)).to::<Transform2D>().unwrap(),
        transform
    );
}

#[test]
fn test_nil_round_trips_as_nil() {
    let nil = echo_variant(&Variant::nil(testkit::runtime().api()));
    assert!(nil.is_nil());
    assert!(matches!(
        nil.to::<String>(),
        Err(BindError::VariantTypeMismatch { expected: VariantType::String, found: VariantType::Nil })
    ));
}

#[test]
fn test_reading_the_wrong_type_fails() {
    let color = variant(&Color::rgba(1.0, 0.0, 0.0, 1.0));
    assert_eq!(color.get_type(), VariantType::Color);
    assert!(matches!(
        color.to::<Vector2>(),
        Err(BindError::VariantTypeMismatch { expected: VariantType::Vector2, found: VariantType::Color })
    ));
}

#[test]
fn test_clones_own_their_storage() {
    let original = variant("shared");
    let copy = original.clone();
    assert_ne!(original.as_raw(), copy.as_raw());
    drop(original);
    assert_eq!(copy.to::<String>().unwrap(), "shared");
}

#[test]
fn test_variant_return_must_be_reserved() {
    let rt = testkit::runtime();
    let value = variant(&1i64);
    let mut frame = Frame::new();
    frame.arg(value.as_raw()).unwrap();
    assert!(matches!(
        rt.bind("Probe", "echo_variant")
            .unwrap()
            .ptrcall(ptr::null_mut(), &mut frame),
        Err(BindError::Frame(FrameError::ReturnNotReserved))
    ));
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_properties_hold_any_variant() {
    testkit::runtime();
    let node = Node::new().unwrap();

    assert!(node.property_variant("speed").unwrap().is_nil());
    node.set_property("speed", &12i64).unwrap();
    node.set_property("label", "fast").unwrap();
    assert_eq!(node.property::<i64>("speed").unwrap(), 12);
    assert_eq!(node.property::<String>("label").unwrap(), "fast");

    node.set_property("speed", &Variant::nil(testkit::runtime().api()))
        .unwrap();
    assert!(node.property_variant("speed").unwrap().is_nil());
    assert!(matches!(
        node.property::<bool>("label"),
        Err(BindError::VariantTypeMismatch { .. })
    ));
}

// =============================================================================
// Signals with arguments
// =============================================================================

type Received = Rc<RefCell<Vec<(String, i64)>>>;

fn listen(node: &Node) -> Received {
    let received: Received = Rc::default();
    let captured = received.clone();
    let status = node
        .on_args(
            "message_received",
            ConnectFlags::empty(),
            move |(text, count): (String, i64)| captured.borrow_mut().push((text, count)),
        )
        .unwrap();
    assert_eq!(status, EngineStatus::Ok);
    received
}

#[test]
fn test_typed_callbacks_receive_decoded_arguments() {
    testkit::runtime();
    let node = Node::new().unwrap();
    let received = listen(&node);

    let args = [variant("hello"), variant(&3i64)];
    assert_eq!(testkit::emit_signal_with(node.as_ptr(), "message_received", &args), 1);
    assert_eq!(*received.borrow(), [("hello".to_string(), 3)]);

    // Arguments stay owned by the emitter.
    assert_eq!(args[0].to::<String>().unwrap(), "hello");
}

#[test]
fn test_callback_signature_must_match_the_signal() {
    testkit::runtime();
    let node = Node::new().unwrap();

    let err = node
        .on_args("message_received", ConnectFlags::empty(), |(_count,): (i64,)| {})
        .unwrap_err();
    match err {
        BindError::SignalSignature { declared, callback, .. } => {
            assert_eq!(declared, [AbiKind::String, AbiKind::Int64]);
            assert_eq!(callback, [AbiKind::Int64]);
        }
        other => panic!("expected a signature error, got {other}"),
    }

    assert!(matches!(
        node.on("message_received", ConnectFlags::empty(), || {}),
        Err(BindError::SignalSignature { .. })
    ));
    assert!(!node
        .is_connected("message_received", &Callable::from_fn(testkit::runtime(), || {}))
        .unwrap());
}

#[test]
fn test_undecodable_emissions_are_reported_and_skipped() {
    testkit::runtime();
    let node = Node::new().unwrap();
    let received = listen(&node);

    assert_eq!(
        testkit::emit_signal_with(node.as_ptr(), "message_received", &[variant("short")]),
        1
    );
    assert_eq!(
        testkit::emit_signal_with(
            node.as_ptr(),
            "message_received",
            &[variant(&1i64), variant(&2i64)]
        ),
        1
    );
    assert!(received.borrow().is_empty());

    let errors = testkit::reported_errors();
    assert!(errors.iter().any(|e| e.contains("expects 2 argument(s), got 1")));
    assert!(errors.iter().any(|e| e.contains("expected String")));
}

// =============================================================================
// Callables
// =============================================================================

#[test]
fn test_variadic_callables_return_values_to_the_engine() {
    let rt = testkit::runtime();
    let sum = Callable::from_variadic(rt, |args| {
        let total = args
            .iter()
            .map(|arg| arg.to::<i64>())
            .sum::<BindResult<i64>>()?;
        Variant::new(testkit::runtime().api(), &total).map(Some)
    });

    let result = testkit::call_callable(rt, &sum, &[variant(&2i64), variant(&40i64)]);
    assert_eq!(result.to::<i64>().unwrap(), 42);

    let failed = testkit::call_callable(rt, &sum, &[variant("nope")]);
    assert!(failed.is_nil());

    let silent = Callable::from_fn(rt, || {});
    assert!(testkit::call_callable(rt, &silent, &[]).is_nil());
}
