use super::*;
use serde_json::json;

fn map(value: Value) -> Parameters {
    value.as_object().cloned().expect("object")
}

#[test]
fn query_error_codes_match_broker_contract() {
    assert_eq!(QueryError::NoError.code(), 0);
    assert_eq!(QueryError::Canceled.code(), 4);
    assert_eq!(QueryError::RefreshFailed.code(), 9);
    assert_eq!(QueryError::Forbidden.code(), 10);
    assert_eq!(QueryError::ForgotPassword.code(), 11);
    assert_eq!(QueryError::from_code(10), Some(QueryError::Forbidden));
    assert_eq!(QueryError::from_code(12), None);
}

#[test]
fn canceled_result_carries_only_error_code() {
    let result = canceled_result();
    assert_eq!(result.len(), 1);
    assert_eq!(result_error(&result), Some(QueryError::Canceled));
}

#[test]
fn expand_unwraps_top_level_variants() {
    let expanded = expand_arguments(map(json!({
        "Caption": {"signature": "s", "value": "Example"},
        "Identity": 5
    })));
    assert_eq!(expanded["Caption"], json!("Example"));
    assert_eq!(expanded["Identity"], json!(5));
}

#[test]
fn expand_unwraps_one_level_into_nested_maps() {
    let expanded = expand_arguments(map(json!({
        "ClientData": {"signature": "a{sv}", "value": {
            "WindowId": {"signature": "u", "value": 42},
            "Deep": {"Inner": {"signature": "b", "value": true}}
        }}
    })));
    let client_data = get_map(&expanded, keys::CLIENT_DATA).expect("client data");
    assert_eq!(get_u32(client_data, keys::WINDOW_ID), Some(42));
    assert_eq!(client_data["Deep"], json!({"Inner": {"signature": "b", "value": true}}));
}

#[test]
fn expand_leaves_ordinary_maps_alone() {
    let original = map(json!({"ClientData": {"signature": "x", "value": 1, "extra": 2}}));
    assert_eq!(expand_arguments(original.clone()), original);
}

#[test]
fn get_u32_accepts_integral_floats() {
    let params = map(json!({"a": 42, "b": 42.0, "c": 42.5, "d": -1, "e": "42", "f": 5_000_000_000_u64}));
    assert_eq!(get_u32(&params, "a"), Some(42));
    assert_eq!(get_u32(&params, "b"), Some(42));
    assert_eq!(get_u32(&params, "c"), None);
    assert_eq!(get_u32(&params, "d"), None);
    assert_eq!(get_u32(&params, "e"), None);
    assert_eq!(get_u32(&params, "f"), None);
    assert_eq!(get_u32(&params, "missing"), None);
}

#[test]
fn get_str_list_requires_all_strings() {
    let params = map(json!({"ok": ["https", "http"], "mixed": ["https", 1]}));
    assert_eq!(get_str_list(&params, "ok"), Some(vec!["https".to_owned(), "http".to_owned()]));
    assert_eq!(get_str_list(&params, "mixed"), None);
    assert_eq!(get_str_list(&params, "missing"), None);
}

#[test]
fn get_bool_defaults_to_false() {
    let params = map(json!({"yes": true, "text": "true"}));
    assert!(get_bool(&params, "yes"));
    assert!(!get_bool(&params, "text"));
    assert!(!get_bool(&params, "missing"));
}
