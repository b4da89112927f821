//! Executor behaviour tests
//!
//! Runs tokens end to end through the in-memory driver: safety limiting,
//! row-level filter semantics, batch isolation and telemetry redaction.

use std::sync::Arc;

use querytoken::config::QueryConfig;
use querytoken::executor::{ExecOptions, Executor, PaginationInfo};
use querytoken::memory::MemoryDriver;
use querytoken::observability::{MemorySink, TelemetryKind};
use querytoken::token::{build, FilterOp, FilterOpts, Order, SortDirection, Token};
use querytoken::value::{row, Value};

fn people() -> MemoryDriver {
    MemoryDriver::new().with_table(
        "people",
        vec![
            row([("id", Value::from(1)), ("name", Value::from("john")), ("age", Value::from(34))]),
            row([("id", Value::from(2)), ("name", Value::from("Johnny")), ("age", Value::from(19))]),
            row([("id", Value::from(3)), ("name", Value::from("Mary")), ("age", Value::from(52))]),
        ],
    )
}

fn numbers(n: i64) -> MemoryDriver {
    MemoryDriver::new().with_table(
        "numbers",
        (1..=n).map(|i| row([("id", Value::from(i))])).collect(),
    )
}

fn executor(driver: MemoryDriver) -> Executor {
    Executor::new(QueryConfig::default(), Arc::new(driver))
}

// =============================================================================
// SAFETY DEFAULT
// =============================================================================

#[tokio::test]
async fn test_unbounded_token_gets_default_page_size() {
    let driver = numbers(100);
    let config = QueryConfig {
        default_page_size: 15,
        ..Default::default()
    };
    let exec = Executor::new(config, Arc::new(driver.clone()));

    let result = exec
        .execute(&Token::table("numbers"), ExecOptions::new())
        .await
        .unwrap();

    assert_eq!(result.len(), 15);
    assert_eq!(driver.queries()[0].limit, Some(15));
    assert!(result.metadata.warnings[0].contains("default limit of 15"));
}

#[tokio::test]
async fn test_explicit_limit_is_not_overridden() {
    let driver = numbers(100);
    let t = build::limit(&Token::table("numbers"), 70).unwrap();
    let result = executor(driver).execute(&t, ExecOptions::new()).await.unwrap();
    assert_eq!(result.len(), 70);
    assert!(result.metadata.warnings.is_empty());
}

#[tokio::test]
async fn test_opt_out_returns_everything() {
    let result = executor(numbers(100))
        .execute(&Token::table("numbers"), ExecOptions::new().unbounded())
        .await
        .unwrap();
    assert_eq!(result.len(), 100);
}

// =============================================================================
// ROW SEMANTICS
// =============================================================================

#[tokio::test]
async fn test_case_insensitive_equality() {
    let t = build::filter_with(
        &Token::table("people"),
        "name",
        FilterOp::Eq,
        "John",
        FilterOpts {
            case_insensitive: true,
            ..Default::default()
        },
    )
    .unwrap();
    let result = executor(people()).execute(&t, ExecOptions::new()).await.unwrap();
    assert_eq!(result.column("id"), vec![Value::Integer(1)]);

    let exact = build::filter(&Token::table("people"), "name", FilterOp::Eq, "John").unwrap();
    let result = executor(people()).execute(&exact, ExecOptions::new()).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_starts_with_escapes_wildcards() {
    let driver = MemoryDriver::new().with_table(
        "files",
        vec![
            row([("name", "100%_done")]),
            row([("name", "100 percent")]),
        ],
    );
    let t = build::filter(&Token::table("files"), "name", FilterOp::StartsWith, "100%").unwrap();
    let result = executor(driver).execute(&t, ExecOptions::new()).await.unwrap();
    assert_eq!(result.column("name"), vec![Value::from("100%_done")]);
}

#[tokio::test]
async fn test_or_group_and_in_list() {
    let t = build::where_any(
        &Token::table("people"),
        vec![
            querytoken::token::Filter::new("age", FilterOp::Lt, 20),
            querytoken::token::Filter::new("age", FilterOp::Gt, 50),
        ],
    )
    .unwrap();
    let t = build::order(&t, "id", SortDirection::Asc).unwrap();
    let result = executor(people()).execute(&t, ExecOptions::new()).await.unwrap();
    assert_eq!(result.column("id"), vec![Value::Integer(2), Value::Integer(3)]);

    let t = build::filter(
        &Token::table("people"),
        "id",
        FilterOp::NotIn,
        vec![Value::from(1), Value::from(3)],
    )
    .unwrap();
    let result = executor(people()).execute(&t, ExecOptions::new()).await.unwrap();
    assert_eq!(result.column("id"), vec![Value::Integer(2)]);
}

// =============================================================================
// PAGINATION
// =============================================================================

#[tokio::test]
async fn test_walk_all_cursor_pages() {
    let exec = executor(numbers(7));
    let mut seen = Vec::new();
    let mut after = None;
    loop {
        let t = build::paginate_cursor(&Token::table("numbers"), vec![Order::asc("id")], 3, after, None)
            .unwrap();
        let result = exec.execute(&t, ExecOptions::new()).await.unwrap();
        seen.extend(result.column("id"));
        match result.pagination {
            PaginationInfo::Cursor {
                has_more: true,
                end_cursor,
                ..
            } => after = end_cursor,
            PaginationInfo::Cursor { has_more: false, .. } => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(seen, (1..=7).map(Value::from).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_total_count_is_stable_across_cursor_pages() {
    let exec = executor(numbers(10));
    let first = build::paginate_cursor(&Token::table("numbers"), vec![Order::asc("id")], 3, None, None)
        .unwrap();
    let page1 = exec
        .execute(&first, ExecOptions::new().with_total())
        .await
        .unwrap();
    assert_eq!(page1.metadata.total_count, Some(10));

    let end_cursor = match page1.pagination {
        PaginationInfo::Cursor { end_cursor, .. } => end_cursor,
        other => panic!("unexpected {:?}", other),
    };
    let second = build::paginate_cursor(&Token::table("numbers"), vec![Order::asc("id")], 3, end_cursor, None)
        .unwrap();
    let page2 = exec
        .execute(&second, ExecOptions::new().with_total())
        .await
        .unwrap();
    assert_eq!(page2.column("id"), vec![Value::from(4), Value::from(5), Value::from(6)]);
    assert_eq!(page2.metadata.total_count, Some(10));
}

async fn walk_pages(exec: &Executor, order: Vec<Order>) -> Vec<Value> {
    let mut seen = Vec::new();
    let mut after = None;
    for _ in 0..10 {
        let t = build::paginate_cursor(&Token::table("scores"), order.clone(), 1, after, None).unwrap();
        let result = exec.execute(&t, ExecOptions::new()).await.unwrap();
        assert!(!result.is_empty(), "page after {:?} came back empty", seen);
        seen.extend(result.column("id"));
        match result.pagination {
            PaginationInfo::Cursor {
                has_more: true,
                end_cursor,
                ..
            } => after = end_cursor,
            PaginationInfo::Cursor { has_more: false, .. } => return seen,
            other => panic!("unexpected {:?}", other),
        }
    }
    panic!("pagination never terminated: {:?}", seen)
}

#[tokio::test]
async fn test_walk_cursor_pages_over_nullable_column() {
    let driver = MemoryDriver::new().with_table(
        "scores",
        vec![
            row([("id", Value::from(1)), ("a", Value::from(1))]),
            row([("id", Value::from(2)), ("a", Value::from(2))]),
            row([("id", Value::from(3)), ("a", Value::Null)]),
            row([("id", Value::from(4)), ("a", Value::Null)]),
        ],
    );
    let exec = executor(driver);

    let ascending = walk_pages(&exec, vec![Order::asc("a"), Order::asc("id")]).await;
    assert_eq!(ascending, [1, 2, 3, 4].map(Value::from).to_vec());

    let descending = walk_pages(&exec, vec![Order::desc("a"), Order::asc("id")]).await;
    assert_eq!(descending, [3, 4, 2, 1].map(Value::from).to_vec());
}

// =============================================================================
// BATCH ISOLATION
// =============================================================================

#[tokio::test]
async fn test_batch_isolates_invalid_query() {
    let exec = executor(people());
    let good = build::filter(&Token::table("people"), "age", FilterOp::Gt, 20).unwrap();
    let bad = build::filter_with(
        &Token::table("people"),
        "title",
        FilterOp::Eq,
        "x",
        FilterOpts {
            binding: Some("posts".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let other = build::limit(&Token::table("people"), 1).unwrap();

    let results = exec.batch(vec![good, bad, other], ExecOptions::new()).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().len(), 2);
    assert_eq!(results[1].as_ref().unwrap_err().code(), "QT_UNKNOWN_BINDING");
    assert_eq!(results[2].as_ref().unwrap().len(), 1);
    assert_eq!(exec.metrics().snapshot().queries_failed, 1);
}

// =============================================================================
// TELEMETRY
// =============================================================================

#[tokio::test]
async fn test_telemetry_never_carries_values() {
    let sink = MemorySink::new();
    let exec = executor(people()).with_telemetry(Arc::new(sink.clone()));
    let t = build::filter(&Token::table("people"), "name", FilterOp::Eq, "secret-name").unwrap();
    exec.execute(&t, ExecOptions::new()).await.unwrap();

    assert_eq!(sink.kinds(), vec![TelemetryKind::Start, TelemetryKind::Stop]);
    for event in sink.events() {
        for value in event.fields().values() {
            assert!(!value.contains("secret-name"));
        }
    }
}
