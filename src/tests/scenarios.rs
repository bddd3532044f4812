use super::query_data;
use crate::runtime::{
    binding::ParamBinding,
    error::ParamError,
    internal::InternalKind,
    types::DataKind,
    value::{TypedValue, Value},
    QueryData,
};
use crate::wire::{decode_transport, WireParam, WireType, WireValue};
use crate::QueryDataConfig;

fn read(data: &QueryData, name: &str) -> (String, Value) {
    let guard = data.bind().expect("bind");
    let (ty, value) = data.read_value(&guard, name).expect("stored parameter");
    (ty.to_string(), value.clone())
}

#[test]
fn duplicate_name_keeps_first_value() {
    let mut data = query_data();
    let mut guard = data.bind().expect("bind");
    let ty = guard.types().uint64();
    let first = guard.alloc(Value::Uint64(1)).expect("alloc");
    let second = guard.alloc(Value::Uint64(2)).expect("alloc");
    assert!(data
        .add_value(&mut guard, "p", TypedValue::new(ty.clone(), first))
        .expect("first write"));
    assert!(!data
        .add_value(&mut guard, "p", TypedValue::new(ty, second))
        .expect("second write"));
    let (_, value) = data.read_value(&guard, "p").expect("read");
    assert_eq!(value, &Value::Uint64(1));
    assert_eq!(guard.live_values(), 1);
}

#[test]
fn serialized_form_decodes_to_the_stored_value() {
    let mut source = query_data();
    let params = [
        ("flag", WireParam::data(DataKind::Bool, WireValue::Bool(true))),
        ("count", WireParam::data(DataKind::Int64, WireValue::Int64(-12))),
        ("ratio", WireParam::data(DataKind::Double, WireValue::Double(0.25))),
        ("label", WireParam::data(DataKind::Utf8, WireValue::Text("héllo".into()))),
        (
            "ids",
            WireParam::new(
                WireType::List(Box::new(WireType::Data(DataKind::Uint32))),
                WireValue::Items(vec![WireValue::Uint32(3), WireValue::Uint32(5)]),
            ),
        ),
        (
            "maybe",
            WireParam::new(
                WireType::Optional(Box::new(WireType::Data(DataKind::String))),
                WireValue::Null,
            ),
        ),
    ];
    for (name, param) in &params {
        assert!(source.add_from_wire(*name, param).expect("import"));
    }

    let mut target = query_data();
    for (name, _) in &params {
        let wire = source
            .get_serialized(name)
            .expect("serialize")
            .expect("present")
            .clone();
        assert!(target.add_from_wire(*name, &wire).expect("re-import"));
        assert_eq!(read(&source, name), read(&target, name));
    }

    let chunk = source.serialize_param_value("ids").expect("transport chunk");
    let guard_owner = query_data();
    let mut guard = guard_owner.bind().expect("bind");
    let shipped = decode_transport(&mut guard, &chunk).expect("decode chunk");
    assert_eq!(shipped.ty.to_string(), "List<Uint32>");
    assert_eq!(
        guard.value(shipped.value).expect("live"),
        &Value::List(vec![Value::Uint32(3), Value::Uint32(5)])
    );
}

#[test]
fn random_uuid_is_stable_within_a_query() {
    let mut data = query_data();
    for name in ["u1", "u2"] {
        assert!(data
            .resolve_binding(&ParamBinding::internal(name, InternalKind::RandomUuid), true)
            .expect("internal binding"));
    }
    let (ty, first) = read(&data, "u1");
    let (_, second) = read(&data, "u2");
    assert_eq!(ty, "Uuid");
    assert_eq!(first, second);
    assert_eq!(first.as_bytes().map(<[u8]>::len), Some(16));

    data.clear().expect("clear");
    data.resolve_binding(&ParamBinding::internal("u1", InternalKind::RandomUuid), true)
        .expect("internal binding");
    let (_, regenerated) = read(&data, "u1");
    assert_ne!(first, regenerated);
}

#[test]
fn tx_result_binding_waits_for_its_result() {
    let mut data = query_data();
    let binding = ParamBinding::tx_result("rows", 1, 2);
    assert!(!data.resolve_binding(&binding, false).expect("not ready"));
    assert!(!data.contains("rows"));

    {
        let mut guard = data.bind().expect("bind");
        let ty = guard.types().utf8();
        let mut results = Vec::new();
        for text in ["a", "b", "c"] {
            let handle = guard.alloc(Value::Utf8(text.into())).expect("alloc");
            results.push(TypedValue::new(ty.clone(), handle));
        }
        assert!(data.add_tx_results(&mut guard, 1, results).expect("record"));
    }

    assert!(data.resolve_binding(&binding, false).expect("ready"));
    assert_eq!(read(&data, "rows"), ("Utf8".to_string(), Value::Utf8("c".into())));
}

#[test]
fn clear_resets_params_caches_and_internal_values() {
    let mut data = query_data();
    data.add_from_wire("p", &WireParam::data(DataKind::Uint64, WireValue::Uint64(1)))
        .expect("add");
    assert!(data.get_serialized("p").expect("serialize").is_some());
    data.resolve_binding(&ParamBinding::internal("r", InternalKind::RandomNumber), true)
        .expect("random");
    let (_, before) = read(&data, "r");

    data.clear().expect("clear");
    assert!(data.get_type("p").is_none());
    assert!(data.get_serialized("p").expect("lookup").is_none());
    assert!(data.is_empty());
    {
        let mut guard = data.bind().expect("bind");
        assert!(!guard.internals().is_cached(InternalKind::RandomNumber));
        assert_eq!(guard.live_values(), 0);
    }

    data.resolve_binding(&ParamBinding::internal("r", InternalKind::RandomNumber), true)
        .expect("random");
    let (_, after) = read(&data, "r");
    assert_ne!(before, after);
}

#[test]
fn client_uint64_serializes_back_to_42() {
    let mut data = query_data();
    {
        let mut guard = data.bind().expect("bind");
        let ty = guard.types().uint64();
        let handle = guard.alloc(Value::Uint64(42)).expect("alloc");
        assert!(data
            .add_value(&mut guard, "p1", TypedValue::new(ty, handle))
            .expect("add"));
    }
    let wire = data.get_serialized("p1").expect("serialize").expect("present");
    assert_eq!(wire, &WireParam::data(DataKind::Uint64, WireValue::Uint64(42)));
}

#[test]
fn now_binding_always_resolves() {
    let mut data = QueryData::new(&QueryDataConfig::default());
    assert!(data
        .resolve_binding(&ParamBinding::internal("now", InternalKind::Now), true)
        .expect("now"));
    let (ty, value) = read(&data, "now");
    assert_eq!(ty, "Uint64");
    assert!(value.as_u64().is_some());
}

#[test]
fn strict_external_binding_reports_missing_parameter() {
    let mut data = query_data();
    let err = data
        .resolve_binding(&ParamBinding::external("missing"), true)
        .expect_err("not supplied");
    assert_eq!(
        err,
        ParamError::ParameterNotFound {
            name: "missing".into()
        }
    );
    assert!(!data
        .resolve_binding(&ParamBinding::external("missing"), false)
        .expect("non-strict"));
}

#[test]
fn strict_tx_result_binding_fails_until_recorded() {
    let mut data = query_data();
    let binding = ParamBinding::tx_result("r", 0, 0);
    let err = data
        .resolve_binding(&binding, true)
        .expect_err("result missing");
    assert_eq!(
        err,
        ParamError::UpstreamResultNotReady {
            tx_index: 0,
            result_index: 0,
            strict: true,
        }
    );
    assert!(err.is_fatal());

    {
        let mut guard = data.bind().expect("bind");
        let ty = guard.types().int32();
        let handle = guard.alloc(Value::Int32(7)).expect("alloc");
        data.add_tx_results(&mut guard, 0, vec![TypedValue::new(ty, handle)])
            .expect("record");
    }
    assert!(data.resolve_binding(&binding, false).expect("resolved"));
    assert_eq!(read(&data, "r"), ("Int32".to_string(), Value::Int32(7)));
}
