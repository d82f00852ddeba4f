#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sqlmap::sql::{SqlNode, SqlSource, StaticSqlSource};
use sqlmap::value::{ParamsMap, Value};

/// A bounded, fuzzable mirror of [`SqlNode`]/[`Value`]: `Arbitrary` can't be
/// derived directly on the real types (recursive, and `Value::Object` keys on
/// a `BTreeMap` aren't a natural fit for the derive), so fuzzing builds one of
/// these and converts it into the real tree before rendering.
#[derive(Debug, Arbitrary)]
enum FuzzNode {
    Text(String),
    Mixed(Vec<FuzzNode>),
    If(String, Box<FuzzNode>),
    ForEach(String, String, Box<FuzzNode>),
    Where(Box<FuzzNode>),
}

impl FuzzNode {
    fn into_node(self, depth: u8) -> SqlNode {
        if depth == 0 {
            return SqlNode::Text(String::new());
        }
        match self {
            FuzzNode::Text(s) => SqlNode::Text(s),
            FuzzNode::Mixed(children) => SqlNode::Mixed(
                children
                    .into_iter()
                    .take(8)
                    .map(|c| c.into_node(depth - 1))
                    .collect(),
            ),
            FuzzNode::If(test, child) => SqlNode::If {
                test,
                child: Box::new(child.into_node(depth - 1)),
            },
            FuzzNode::ForEach(collection, item, child) => SqlNode::ForEach {
                collection,
                item,
                index: None,
                open: "(".to_string(),
                close: ")".to_string(),
                separator: ", ".to_string(),
                child: Box::new(child.into_node(depth - 1)),
            },
            FuzzNode::Where(child) => SqlNode::where_(child.into_node(depth - 1)),
        }
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<FuzzValue>),
}

impl FuzzValue {
    fn into_value(self, depth: u8) -> Value {
        if depth == 0 {
            return Value::Null;
        }
        match self {
            FuzzValue::Null => Value::Null,
            FuzzValue::Bool(b) => Value::Bool(b),
            FuzzValue::Int(i) => Value::Int(i),
            FuzzValue::Str(s) => Value::Str(s),
            FuzzValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .take(8)
                    .map(|v| v.into_value(depth - 1))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    node: FuzzNode,
    params: Vec<(String, FuzzValue)>,
}

fuzz_target!(|input: FuzzInput| {
    let node = input.node.into_node(6);
    let mut params = ParamsMap::new();
    for (name, value) in input.params.into_iter().take(16) {
        params.insert(name, value.into_value(4));
    }

    // Rendering an arbitrary node tree against arbitrary bindings must never
    // panic: `If`/`ForEach` test-expression errors and malformed marker text
    // should surface as `Err`, never a crash.
    let source = StaticSqlSource::new(node);
    let _ = source.get_bound_sql(Value::Object(params));
});
