mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CountingRegistry, ReplyTransport, SilentTransport, context_with, record};
use param_bridge::{
    Builder, ParamError, ParamRegistry, ParamType, Selector, SliceSpec, Value,
};

#[test]
fn negative_indexes_resolve_against_array_size() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 30, "octet", ParamType::Uint16, 8));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("octet").build().unwrap();

    param.value().set(7i64, 42u16).unwrap();
    assert_eq!(param.value().get(-1i64).unwrap(), Value::Unsigned(42));

    assert!(matches!(
        param.value().get(-9i64),
        Err(ParamError::IndexOutOfRange { index: -9, len: 8, .. })
    ));
    assert!(matches!(
        param.value().get(8i64),
        Err(ParamError::IndexOutOfRange { index: 8, len: 8, .. })
    ));
}

#[test]
fn scalar_broadcasts_to_whole_array() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 31, "gains", ParamType::Uint32, 4));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("gains").build().unwrap();

    param.value().set(Selector::All, 7u32).unwrap();
    for i in 0..4i64 {
        assert_eq!(param.value().get(i).unwrap(), Value::Unsigned(7));
    }
}

#[test]
fn sequences_zip_against_selected_indexes() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 32, "curve", ParamType::Int32, 4));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("curve").build().unwrap();

    param
        .value()
        .set(Selector::Indexes(vec![0, 2]), vec![5i32, 6i32])
        .unwrap();
    assert_eq!(
        param.value().get(Selector::All).unwrap(),
        Value::Array(vec![
            Value::Signed(5),
            Value::Signed(0),
            Value::Signed(6),
            Value::Signed(0),
        ])
    );
}

#[test]
fn length_mismatch_is_an_error() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 33, "trim", ParamType::Uint32, 4));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("trim").build().unwrap();

    assert!(matches!(
        param.value().set(Selector::All, vec![1u32, 2, 3]),
        Err(ParamError::LengthMismatch { values: 3, indexes: 4, .. })
    ));
    assert!(matches!(
        param
            .value()
            .set(Selector::Indexes(vec![0, 1]), vec![1u32, 2, 3]),
        Err(ParamError::LengthMismatch { values: 3, indexes: 2, .. })
    ));
}

#[test]
fn scalar_against_explicit_selection_is_rejected() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 34, "span", ParamType::Uint32, 4));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("span").build().unwrap();

    assert!(matches!(
        param
            .value()
            .set(Selector::Slice(SliceSpec::new(Some(0), Some(2), 1)), 5u32),
        Err(ParamError::TypeMismatch { .. })
    ));
}

#[test]
fn retry_budget_is_exhausted_exactly() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(5, 35, "remote", ParamType::Float, 1));
    let transport = Arc::new(SilentTransport::new());
    let ctx = context_with(registry, transport.clone());

    let param = ctx
        .param("remote")
        .with_node(5)
        .with_retries(3)
        .with_timeout(Duration::from_millis(10))
        .build()
        .unwrap();
    assert!(matches!(
        param.value().get(Selector::All),
        Err(ParamError::NoReply { node: 5, attempts: 3 })
    ));
    assert_eq!(transport.pull_count(), 3);

    // Zero retries still means one attempt.
    assert!(matches!(
        param.value().with_retries(0).get(Selector::All),
        Err(ParamError::NoReply { node: 5, attempts: 1 })
    ));
    assert_eq!(transport.pull_count(), 4);
}

#[test]
fn remote_read_caches_per_proxy_instance() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(5, 36, "temp_sensor", ParamType::Double, 3));
    let transport = Arc::new(ReplyTransport::with_doubles(&[21.5, 21.6, 21.7]));
    let ctx = context_with(registry, transport.clone());

    let param = ctx
        .param("temp_sensor")
        .with_node(5)
        .with_timeout(Duration::from_millis(100))
        .with_retries(2)
        .build()
        .unwrap();

    let proxy = param.value();
    let first = proxy.get(Selector::All).unwrap();
    assert_eq!(
        first,
        Value::Array(vec![
            Value::Float(21.5),
            Value::Float(21.6),
            Value::Float(21.7),
        ])
    );
    assert_eq!(transport.pull_count(), 1);

    // The stub's reply changes, but the same proxy instance keeps its
    // cached resolution, selector and all.
    transport.set_doubles(&[30.0, 30.1, 30.2]);
    assert_eq!(proxy.get(Selector::All).unwrap(), first);
    assert_eq!(proxy.get(0i64).unwrap(), first);
    assert_eq!(transport.pull_count(), 1);

    // A fresh proxy re-resolves.
    let fresh = param.value().get(Selector::All).unwrap();
    assert_eq!(
        fresh,
        Value::Array(vec![
            Value::Float(30.0),
            Value::Float(30.1),
            Value::Float(30.2),
        ])
    );
    assert_eq!(transport.pull_count(), 2);
}

#[test]
fn local_reads_skip_the_transport() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 37, "local", ParamType::Uint32, 1));
    let transport = Arc::new(SilentTransport::new());
    let ctx = context_with(registry, transport.clone());

    let param = ctx.param("local").build().unwrap();
    param.value().set(Selector::All, 3u32).unwrap();
    assert_eq!(param.value().get(Selector::All).unwrap(), Value::Unsigned(3));
    assert_eq!(transport.pull_count(), 0);
    assert_eq!(transport.push_count(), 0);
}

#[test]
fn remote_disabled_reads_cached_storage() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(5, 38, "shadow", ParamType::Uint32, 1));
    let transport = Arc::new(SilentTransport::new());
    let ctx = context_with(registry.clone(), transport.clone());

    let param = ctx.param("shadow").with_node(5).build().unwrap();
    registry.find(5, 38).unwrap().write_elem(0, &9u32.to_le_bytes());

    let value = param.value().with_remote(false).get(Selector::All).unwrap();
    assert_eq!(value, Value::Unsigned(9));
    assert_eq!(transport.pull_count(), 0);
}

#[test]
fn hex_parameters_render_integers_as_hex_text() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 39, "hwreg", ParamType::Xint32, 1));
    let ctx = context_with(registry.clone(), Arc::new(SilentTransport::new()));
    let param = ctx.param("hwreg").build().unwrap();

    param.value().set(Selector::All, 0xBEEFu32).unwrap();
    assert_eq!(
        registry.find(0, 39).unwrap().read_elem(0),
        0xBEEFu32.to_le_bytes().to_vec()
    );
    assert_eq!(param.value().get(Selector::All).unwrap(), Value::Unsigned(0xBEEF));

    // Hex string input, with or without the 0x prefix.
    param.value().set(Selector::All, "0x1A").unwrap();
    assert_eq!(param.value().get(Selector::All).unwrap(), Value::Unsigned(0x1A));
}

#[test]
fn string_reads_index_characters_up_to_nul() {
    let registry = Arc::new(CountingRegistry::new());
    let rec = record(0, 40, "label", ParamType::String, 16);
    rec.write_all(b"hello");
    registry.add(&rec);
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("label").build().unwrap();

    assert_eq!(
        param.value().get(Selector::All).unwrap(),
        Value::Str("hello".into())
    );
    assert_eq!(param.value().get(-1i64).unwrap(), Value::Str("o".into()));
    assert_eq!(
        param
            .value()
            .get(Selector::Slice(SliceSpec::new(Some(1), Some(3), 1)))
            .unwrap(),
        Value::Str("el".into())
    );
    // Index 10 is inside the buffer but beyond the NUL.
    assert!(matches!(
        param.value().get(10i64),
        Err(ParamError::IndexOutOfRange { index: 10, len: 5, .. })
    ));
}

#[test]
fn string_writes_are_whole_value_only() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 41, "name", ParamType::String, 16));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("name").build().unwrap();

    assert!(matches!(
        param.value().set(0i64, "x"),
        Err(ParamError::TypeMismatch { .. })
    ));
    param.value().set(Selector::All, "csh").unwrap();
    assert_eq!(
        param.value().get(Selector::All).unwrap(),
        Value::Str("csh".into())
    );
}

#[test]
fn data_parameters_move_whole_buffers() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 42, "blob", ParamType::Data, 4));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("blob").build().unwrap();

    param
        .value()
        .set(Selector::All, Value::Data(vec![1, 2, 3, 4]))
        .unwrap();
    assert_eq!(
        param.value().get(Selector::All).unwrap(),
        Value::Data(vec![1, 2, 3, 4])
    );
    assert!(param.value().set(0i64, Value::Data(vec![9])).is_err());
}

#[test]
fn remote_write_pushes_once_and_applies_nothing_locally() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(5, 43, "setpoint", ParamType::Uint32, 1));
    let transport = Arc::new(SilentTransport::new());
    let ctx = context_with(registry, transport.clone());

    let param = ctx
        .param("setpoint")
        .with_node(5)
        .with_retries(2)
        .with_timeout(Duration::from_millis(10))
        .build()
        .unwrap();
    assert!(matches!(
        param.value().set(Selector::All, 1u32),
        Err(ParamError::NoReply { node: 5, attempts: 2 })
    ));
    assert_eq!(transport.push_count(), 2);
}

#[test]
fn proxy_iterates_resolved_elements() {
    let registry = Arc::new(CountingRegistry::new());
    registry.add(&record(0, 44, "seq", ParamType::Uint8, 3));
    let ctx = context_with(registry, Arc::new(SilentTransport::new()));
    let param = ctx.param("seq").build().unwrap();

    param.value().set(Selector::All, vec![1u8, 2, 3]).unwrap();
    let items: Vec<_> = param.value().iter().unwrap().collect();
    assert_eq!(
        items,
        vec![Value::Unsigned(1), Value::Unsigned(2), Value::Unsigned(3)]
    );
}
