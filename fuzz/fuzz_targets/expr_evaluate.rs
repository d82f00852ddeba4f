#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlmap::expr;
use sqlmap::value::{ParamsMap, Value};

fuzz_target!(|data: &str| {
    let mut bindings = ParamsMap::new();
    bindings.insert("user".to_string(), Value::Int(1));
    bindings.insert("xs".to_string(), Value::Array(vec![Value::Int(1)]));

    // Sandbox rejection, tokenizing, and parsing must never panic on
    // arbitrary input, only return Ok or Err.
    let _ = expr::evaluate(data, &bindings);
    let _ = expr::evaluate_boolean(data, &bindings);
});
