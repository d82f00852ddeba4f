use criterion::{Criterion, criterion_group, criterion_main};
use sqlmap::expr;
use sqlmap::sql::{SqlNode, SqlSource, StaticSqlSource, When};
use sqlmap::value::{ParamsMap, Value};
use std::hint::black_box;

fn small_node() -> SqlNode {
    SqlNode::Mixed(vec![
        SqlNode::Text("SELECT id, name, meta FROM users".to_string()),
        SqlNode::where_(SqlNode::Mixed(vec![
            SqlNode::If {
                test: "status != null".to_string(),
                child: Box::new(SqlNode::Text("AND status = #{status}".to_string())),
            },
            SqlNode::If {
                test: "since != null".to_string(),
                child: Box::new(SqlNode::Text("AND created_at >= #{since}".to_string())),
            },
            SqlNode::If {
                test: "ids != null".to_string(),
                child: Box::new(SqlNode::ForEach {
                    collection: "ids".to_string(),
                    item: "id".to_string(),
                    index: None,
                    open: "AND id IN (".to_string(),
                    close: ")".to_string(),
                    separator: ", ".to_string(),
                    child: Box::new(SqlNode::Text("#{id}".to_string())),
                }),
            },
        ])),
        SqlNode::Text("ORDER BY ${order_by} LIMIT #{limit}".to_string()),
    ])
}

fn big_node() -> SqlNode {
    SqlNode::Mixed(vec![
        SqlNode::Text(
            "SELECT u.id, u.name, u.email, COUNT(p.id) AS post_count FROM users u LEFT JOIN posts p ON p.user_id = u.id"
                .to_string(),
        ),
        SqlNode::where_(SqlNode::Mixed(vec![
            SqlNode::If {
                test: "status != null".to_string(),
                child: Box::new(SqlNode::Text("AND u.status = #{status}".to_string())),
            },
            SqlNode::If {
                test: "roles != null".to_string(),
                child: Box::new(SqlNode::ForEach {
                    collection: "roles".to_string(),
                    item: "role".to_string(),
                    index: None,
                    open: "AND u.role IN (".to_string(),
                    close: ")".to_string(),
                    separator: ", ".to_string(),
                    child: Box::new(SqlNode::Text("#{role}".to_string())),
                }),
            },
            SqlNode::Choose {
                whens: vec![When {
                    test: "created_after != null".to_string(),
                    child: Box::new(SqlNode::Trim {
                        child: Box::new(SqlNode::Mixed(vec![
                            SqlNode::Text("AND u.created_at >= #{created_after}".to_string()),
                            SqlNode::If {
                                test: "created_before != null".to_string(),
                                child: Box::new(SqlNode::Text(
                                    "AND u.created_at <= #{created_before}".to_string(),
                                )),
                            },
                        ])),
                        prefix: None,
                        prefix_overrides: Vec::new(),
                        suffix: None,
                        suffix_overrides: Vec::new(),
                    }),
                }],
                otherwise: Some(Box::new(SqlNode::Text(String::new()))),
            },
        ])),
        SqlNode::Text("GROUP BY u.id".to_string()),
        SqlNode::If {
            test: "order_by != null".to_string(),
            child: Box::new(SqlNode::Text("ORDER BY ${order_by}".to_string())),
        },
        SqlNode::If {
            test: "limit != null".to_string(),
            child: Box::new(SqlNode::Text("LIMIT #{limit}".to_string())),
        },
        SqlNode::If {
            test: "offset != null".to_string(),
            child: Box::new(SqlNode::Text("OFFSET #{offset}".to_string())),
        },
    ])
}

fn params() -> Value {
    let mut map = ParamsMap::new();
    map.insert("status".to_string(), Value::Str("accepted".to_string()));
    map.insert("since".to_string(), Value::Str("2020-01-01".to_string()));
    map.insert(
        "ids".to_string(),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
    );
    map.insert(
        "roles".to_string(),
        Value::Array(vec![
            Value::Str("admin".to_string()),
            Value::Str("user".to_string()),
        ]),
    );
    map.insert(
        "created_after".to_string(),
        Value::Str("1111111".to_string()),
    );
    map.insert("order_by".to_string(), Value::Str("id".to_string()));
    map.insert("limit".to_string(), Value::Int(10));
    Value::Object(map)
}

fn bench_render(c: &mut Criterion) {
    let small = StaticSqlSource::new(small_node());
    let big = StaticSqlSource::new(big_node());

    c.bench_function("render_small_dynamic_statement", |b| {
        b.iter(|| {
            let _ = black_box(small.get_bound_sql(params()).unwrap());
        });
    });

    c.bench_function("render_big_dynamic_statement", |b| {
        b.iter(|| {
            let _ = black_box(big.get_bound_sql(params()).unwrap());
        });
    });
}

fn bench_expression(c: &mut Criterion) {
    let mut user = ParamsMap::new();
    user.insert("age".to_string(), Value::Int(25));
    user.insert("status".to_string(), Value::Str("active".to_string()));
    let mut bindings = ParamsMap::new();
    bindings.insert("user".to_string(), Value::Object(user));

    c.bench_function("expr_evaluate_boolean", |b| {
        b.iter(|| {
            let _ = black_box(
                expr::evaluate_boolean("user.age >= 18 && user.status == 'active'", &bindings)
                    .unwrap(),
            );
        });
    });
}

criterion_group!(benches, bench_render, bench_expression);
criterion_main!(benches);
