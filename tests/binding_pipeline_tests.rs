//! # Binding Pipeline Tests
//!
//! End-to-end tests through `BindingHost` with the in-memory store:
//! - rule selection for every parameter shape
//! - registration failures (configuration, shapes, converters)
//! - item lookup, diff and update
//! - output collectors, replay and create-if-not-exists
//! - queries, invoke strings and invocation failures

use std::sync::Arc;

use rulebind::collector::AsyncCollectorHandle;
use rulebind::store::StoreCall;
use rulebind::{
    Arguments, AttributeCloner, BindError, BindingData, BindingHost, BindingOptions,
    Collector, ConverterManager, DocumentAttribute, InvocationContext, ItemType,
    MapNameResolver, MemoryStore, MemoryStoreFactory, Out, ParamType, Query, Record,
    StoreExtension, TableAttribute, TableHandle, TypedTable,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ═══════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    id: String,
    text: String,
}

impl Record for Todo {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    body: String,
}

impl Record for Note {
    const ID_FIELD: Option<&'static str> = None;
}

struct Fixture {
    host: BindingHost,
    store: Arc<MemoryStore>,
    factory: Arc<MemoryStoreFactory>,
}

fn resolver() -> MapNameResolver {
    MapNameResolver::new()
        .with("RULEBIND_TABLE_URI", "https://tables.example.net")
        .with(
            "RULEBIND_DOCUMENT_CONNECTION",
            "AccountEndpoint=https://docs.example.net;AccountKey=k",
        )
        .with("MyTableName", "TestTable")
        .with("MyId", "abc123")
        .with("SecureTableEndpoint", "https://secure.example.net")
        .with("SecureTableKey", "SUPER-SECRET-KEY")
        .with(
            "SecureDocs",
            "AccountEndpoint=https://secure-docs.example.net;AccountKey=SECRET-ACCOUNT-KEY",
        )
}

/// Log output with `RUST_LOG=rulebind=debug`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixture_with(store: MemoryStore, converters: Option<ConverterManager>) -> Fixture {
    init_tracing();
    let store = Arc::new(store);
    let factory = Arc::new(MemoryStoreFactory::with_store(Arc::clone(&store)));
    let mut extension =
        StoreExtension::new(BindingOptions::default(), factory.clone(), Arc::new(resolver()));
    if let Some(converters) = converters {
        extension = extension.with_converters(converters);
    }

    let mut host = BindingHost::new();
    extension.register(&mut host).unwrap();
    Fixture {
        host,
        store,
        factory,
    }
}

fn fixture() -> Fixture {
    fixture_with(MemoryStore::new(), None)
}

fn todos() -> TableAttribute {
    TableAttribute::new().with_table_name("todos")
}

fn data(id: &str) -> BindingData {
    BindingData::new().with("id", id)
}

async fn unchanged(arguments: Arguments) -> anyhow::Result<Arguments> {
    Ok(arguments)
}

fn updates(store: &MemoryStore) -> usize {
    store.count(|c| matches!(c, StoreCall::Update { .. }))
}

// ═══════════════════════════════════════════════════════════════
// Rule selection
// ═══════════════════════════════════════════════════════════════

mod resolution_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_shape_selects_its_rule() {
        let f = fixture();
        let attribute = todos().with_id("{id}");
        let todo = ItemType::record::<Todo>;

        let function = f
            .host
            .function("shapes")
            .bind("out", ParamType::Out(todo()), attribute.clone())
            .unwrap()
            .bind("out_array", ParamType::OutArray(todo()), attribute.clone())
            .unwrap()
            .bind("collector", ParamType::Collector(todo()), attribute.clone())
            .unwrap()
            .bind("async_collector", ParamType::AsyncCollector(todo()), attribute.clone())
            .unwrap()
            .bind("query", ParamType::Query(todo()), attribute.clone())
            .unwrap()
            .bind("array", ParamType::Array(todo()), attribute.clone())
            .unwrap()
            .bind("raw", ParamType::RawTable, attribute.clone())
            .unwrap()
            .bind("typed", ParamType::Table(todo()), attribute.clone())
            .unwrap()
            .bind("client", ParamType::Client, attribute.clone())
            .unwrap()
            .bind("item", ParamType::Item(todo()), attribute)
            .unwrap()
            .build()
            .unwrap();

        let expected = [
            ("out", "output"),
            ("out_array", "output"),
            ("collector", "output"),
            ("async_collector", "output"),
            ("query", "query"),
            ("array", "query"),
            ("raw", "table"),
            ("typed", "typed-table"),
            ("client", "client"),
            ("item", "item"),
        ];
        for (parameter, rule) in expected {
            assert_eq!(function.rule_for(parameter), Some(rule), "{parameter}");
        }
    }

    #[test]
    fn collector_of_json_never_falls_through_to_item() {
        let f = fixture();
        let function = f
            .host
            .function("f")
            .bind(
                "c",
                ParamType::Collector(ItemType::json()),
                todos().with_id("1"),
            )
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(function.rule_for("c"), Some("output"));
    }

    #[test]
    fn item_without_id_is_configuration_error() {
        let f = fixture();
        let err = f
            .host
            .function("f")
            .bind("todo", ParamType::Item(ItemType::record::<Todo>()), todos())
            .err()
            .unwrap();
        assert!(matches!(err, BindError::ConfigurationMissing { .. }), "{err}");
    }

    #[test]
    fn schemaless_query_needs_table_name() {
        let f = fixture();
        let err = f
            .host
            .function("f")
            .bind("q", ParamType::Query(ItemType::json()), TableAttribute::new())
            .err()
            .unwrap();
        assert!(matches!(err, BindError::InvalidParameterShape { .. }), "{err}");
    }

    #[test]
    fn record_without_identity_cannot_be_looked_up() {
        let f = fixture();
        let err = f
            .host
            .function("f")
            .bind(
                "note",
                ParamType::Item(ItemType::record::<Note>()),
                TableAttribute::new().with_id("1"),
            )
            .err()
            .unwrap();
        assert!(matches!(err, BindError::InvalidParameterShape { .. }));

        // Output of the same type is fine
        f.host
            .function("g")
            .bind("notes", ParamType::Collector(ItemType::record::<Note>()), TableAttribute::new())
            .unwrap();
    }

    #[test]
    fn missing_connection_fails_registration() {
        let extension = StoreExtension::new(
            BindingOptions::default(),
            Arc::new(MemoryStoreFactory::new()),
            Arc::new(MapNameResolver::new()),
        );
        let mut host = BindingHost::new();
        extension.register(&mut host).unwrap();

        let err = host
            .function("f")
            .bind("c", ParamType::Client, TableAttribute::new())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BindError::ConfigurationMissing { ref setting, .. } if setting == "RULEBIND_TABLE_URI"
        ));
    }

    #[test]
    fn missing_converter_fails_registration() {
        let f = fixture_with(MemoryStore::new(), Some(ConverterManager::new()));
        let err = f
            .host
            .function("f")
            .bind("raw", ParamType::Out(ItemType::bytes()), todos())
            .err()
            .unwrap();
        assert!(matches!(err, BindError::NoConverterFound { .. }), "{err}");
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let f = fixture();
        let err = f
            .host
            .function("f")
            .bind("c", ParamType::Client, todos())
            .unwrap()
            .bind("c", ParamType::Client, todos())
            .err()
            .unwrap();
        assert!(matches!(err, BindError::ArgumentInvalid { .. }));
    }

    #[test]
    fn contract_checks_tokens_at_build() {
        let f = fixture();
        let err = f
            .host
            .function("f")
            .with_contract(["orderId"])
            .bind("todo", ParamType::Item(ItemType::json()), todos().with_id("{id}"))
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, BindError::BindingDataMissing { ref token } if token == "id"));
    }
}

// ═══════════════════════════════════════════════════════════════
// Item lookup and diff
// ═══════════════════════════════════════════════════════════════

mod item_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded() -> Fixture {
        let f = fixture();
        f.store
            .seed("todos", vec![json!({"id": "1", "text": "a"})]);
        f
    }

    fn item_function(f: &Fixture) -> rulebind::FunctionBindings {
        f.host
            .function("edit")
            .bind(
                "todo",
                ParamType::Item(ItemType::record::<Todo>()),
                todos().with_id("{id}"),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn changed_record_is_updated_once() {
        let f = seeded();
        let function = item_function(&f);

        function
            .invoke(&data("1"), &InvocationContext::new(), |mut args| async move {
                let todo = args.get_mut::<Option<Todo>>("todo")?;
                assert_eq!(todo.as_ref().map(|t| t.text.as_str()), Some("a"));
                if let Some(todo) = todo.as_mut() {
                    todo.text = "b".into();
                }
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(updates(&f.store), 1);
        assert_eq!(f.store.records("todos"), vec![json!({"id": "1", "text": "b"})]);
    }

    #[tokio::test]
    async fn unchanged_record_is_not_written() {
        let f = seeded();
        let function = item_function(&f);

        function
            .invoke(&data("1"), &InvocationContext::new(), unchanged)
            .await
            .unwrap();

        assert_eq!(updates(&f.store), 0);
    }

    #[tokio::test]
    async fn identity_change_is_rejected() {
        let f = seeded();
        let function = item_function(&f);

        let err = function
            .invoke(&data("1"), &InvocationContext::new(), |mut args| async move {
                *args.get_mut::<Option<Todo>>("todo")? = Some(Todo {
                    id: "2".into(),
                    text: "b".into(),
                });
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BindError::InvariantViolation { .. }), "{err}");
        assert_eq!(updates(&f.store), 0);
        assert_eq!(f.store.records("todos"), vec![json!({"id": "1", "text": "a"})]);
    }

    #[tokio::test]
    async fn id_case_change_is_not_an_identity_change() {
        let f = fixture();
        f.store
            .seed("todos", vec![json!({"id": "abc", "text": "a"})]);
        let function = item_function(&f);

        function
            .invoke(&data("ABC"), &InvocationContext::new(), |mut args| async move {
                if let Some(todo) = args.get_mut::<Option<Todo>>("todo")?.as_mut() {
                    todo.id = "Abc".into();
                    todo.text = "b".into();
                }
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(updates(&f.store), 1);
    }

    #[tokio::test]
    async fn absent_record_binds_none_and_is_not_created() {
        let f = fixture();
        let function = item_function(&f);

        function
            .invoke(&data("missing"), &InvocationContext::new(), |mut args| async move {
                let todo = args.get_mut::<Option<Todo>>("todo")?;
                assert!(todo.is_none());
                *todo = Some(Todo {
                    id: "missing".into(),
                    text: "new".into(),
                });
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert!(f.store.records("todos").is_empty());
        assert_eq!(f.store.count(|c| !matches!(c, StoreCall::Lookup { .. })), 0);
    }

    #[tokio::test]
    async fn fields_the_type_does_not_model_are_not_changes() {
        let f = fixture();
        f.store
            .seed("todos", vec![json!({"id": "1", "text": "a", "_etag": "e1"})]);
        let function = item_function(&f);

        function
            .invoke(&data("1"), &InvocationContext::new(), unchanged)
            .await
            .unwrap();

        assert_eq!(updates(&f.store), 0);
    }

    #[tokio::test]
    async fn schemaless_item_diff_is_deep() {
        let f = fixture();
        f.store.seed(
            "todos",
            vec![json!({"id": "1", "meta": {"tags": ["x"], "done": false}})],
        );
        let function = f
            .host
            .function("edit")
            .bind("todo", ParamType::Item(ItemType::json()), todos().with_id("{id}"))
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&data("1"), &InvocationContext::new(), |mut args| async move {
                if let Some(todo) = args.get_mut::<Option<Value>>("todo")?.as_mut() {
                    todo["meta"]["tags"] = json!(["x", "y"]);
                }
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(
            f.store.records("todos"),
            vec![json!({"id": "1", "meta": {"tags": ["x", "y"], "done": false}})]
        );
    }

    #[tokio::test]
    async fn settings_resolve_before_lookup() {
        let f = fixture();
        f.store
            .seed("TestTable", vec![json!({"id": "abc123", "text": "hello"})]);
        let attribute = TableAttribute::new()
            .with_table_name("%MyTableName%")
            .with_id("%MyId%");

        let cloner = AttributeCloner::new(&attribute, &resolver()).unwrap();
        assert_eq!(cloner.name_resolved().table_name.as_deref(), Some("TestTable"));
        assert_eq!(cloner.name_resolved().id.as_deref(), Some("abc123"));

        let function = f
            .host
            .function("read")
            .bind("todo", ParamType::Item(ItemType::record::<Todo>()), attribute)
            .unwrap()
            .build()
            .unwrap();

        let args = function
            .invoke(&BindingData::new(), &InvocationContext::new(), unchanged)
            .await
            .unwrap();
        let todo = args.get::<Option<Todo>>("todo").unwrap().clone().unwrap();
        assert_eq!(todo.text, "hello");
    }
}

// ═══════════════════════════════════════════════════════════════
// Output collectors
// ═══════════════════════════════════════════════════════════════

mod output_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn todo(id: &str, text: &str) -> Todo {
        Todo {
            id: id.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn out_array_writes_all_records_in_order() {
        let f = fixture();
        let function = f
            .host
            .function("write")
            .bind("todos", ParamType::OutArray(ItemType::record::<Todo>()), todos())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), |mut args| async move {
                args.get_mut::<Out<Vec<Todo>>>("todos")?
                    .set(vec![todo("1", "a"), todo("2", "b")]);
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(
            f.store.calls(),
            vec![
                StoreCall::Insert {
                    collection: "todos".into(),
                    record: json!({"id": "1", "text": "a"}),
                },
                StoreCall::Insert {
                    collection: "todos".into(),
                    record: json!({"id": "2", "text": "b"}),
                },
            ]
        );
    }

    #[tokio::test]
    async fn unassigned_out_writes_nothing() {
        let f = fixture();
        let function = f
            .host
            .function("write")
            .bind("todo", ParamType::Out(ItemType::record::<Todo>()), todos())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), unchanged)
            .await
            .unwrap();
        assert!(f.store.calls().is_empty());
    }

    #[tokio::test]
    async fn record_type_implies_table_name() {
        let f = fixture();
        let function = f
            .host
            .function("write")
            .bind("todo", ParamType::Out(ItemType::record::<Todo>()), TableAttribute::new())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), |mut args| async move {
                args.get_mut::<Out<Todo>>("todo")?.set(todo("1", "a"));
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();
        assert_eq!(f.store.records("Todo").len(), 1);
    }

    #[tokio::test]
    async fn sync_collector_is_replayed_after_the_body() {
        let f = fixture();
        let store = Arc::clone(&f.store);
        let function = f
            .host
            .function("write")
            .bind("todos", ParamType::Collector(ItemType::record::<Todo>()), todos())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), |args| async move {
                let collector = args.get::<Collector<Todo>>("todos")?;
                collector.add(todo("1", "a"));
                collector.add(todo("2", "b"));
                assert!(store.records("todos").is_empty());
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(f.store.records("todos").len(), 2);
    }

    #[tokio::test]
    async fn async_collector_buffers_until_flush() {
        let f = fixture();
        let store = Arc::clone(&f.store);
        let function = f
            .host
            .function("write")
            .bind("todos", ParamType::AsyncCollector(ItemType::json()), todos())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), |args| async move {
                let collector = args.get::<AsyncCollectorHandle<Value>>("todos")?.clone();
                collector.add(json!({"id": "1"})).await?;
                assert!(store.calls().is_empty());
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(f.store.records("todos"), vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn text_payloads_convert_through_json_defaults() {
        let f = fixture();
        let function = f
            .host
            .function("write")
            .bind("raw", ParamType::Out(ItemType::text()), todos())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), |mut args| async move {
                args.get_mut::<Out<String>>("raw")?
                    .set(r#"{"id": "7", "text": "raw"}"#.to_string());
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(f.store.records("todos"), vec![json!({"id": "7", "text": "raw"})]);
    }

    #[tokio::test]
    async fn document_output_creates_missing_collection_once() {
        let f = fixture_with(MemoryStore::requiring_collections(), None);
        let attribute = DocumentAttribute::new("db", "{collection}")
            .with_partition_key("/tenant")
            .with_create_if_not_exists(Some(400));
        let function = f
            .host
            .function("write")
            .bind("doc", ParamType::Out(ItemType::json()), attribute)
            .unwrap()
            .build()
            .unwrap();

        let data = BindingData::new().with("collection", "orders");
        function
            .invoke(&data, &InvocationContext::new(), |mut args| async move {
                args.get_mut::<Out<Value>>("doc")?.set(json!({"id": "o-1"}));
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        let calls = f.store.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(
            calls[0],
            StoreCall::Upsert { ref collection, .. } if collection == "db/orders"
        ));
        assert!(matches!(
            calls[1],
            StoreCall::CreateCollection { ref options, .. }
                if options.partition_key.as_deref() == Some("/tenant")
                    && options.throughput == Some(400)
        ));
        assert!(matches!(calls[2], StoreCall::Upsert { .. }));
        assert_eq!(f.store.records("db/orders"), vec![json!({"id": "o-1"})]);
    }

    #[tokio::test]
    async fn missing_collection_without_create_propagates() {
        let f = fixture_with(MemoryStore::requiring_collections(), None);
        let function = f
            .host
            .function("write")
            .bind("doc", ParamType::Out(ItemType::json()), DocumentAttribute::new("db", "c"))
            .unwrap()
            .build()
            .unwrap();

        let err = function
            .invoke(&BindingData::new(), &InvocationContext::new(), |mut args| async move {
                args.get_mut::<Out<Value>>("doc")?.set(json!({"id": "1"}));
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

// ═══════════════════════════════════════════════════════════════
// Queries and tables
// ═══════════════════════════════════════════════════════════════

mod query_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded() -> Fixture {
        let f = fixture();
        f.store.seed(
            "todos",
            vec![
                json!({"id": "1", "text": "a"}),
                json!({"id": "2", "text": "b"}),
            ],
        );
        f
    }

    #[tokio::test]
    async fn array_runs_query_before_body() {
        let f = seeded();
        let function = f
            .host
            .function("list")
            .bind("todos", ParamType::Array(ItemType::record::<Todo>()), todos())
            .unwrap()
            .build()
            .unwrap();

        let args = function
            .invoke(&BindingData::new(), &InvocationContext::new(), unchanged)
            .await
            .unwrap();
        assert_eq!(args.get::<Vec<Todo>>("todos").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn query_is_executed_by_the_body() {
        let f = seeded();
        let function = f
            .host
            .function("find")
            .bind("todos", ParamType::Query(ItemType::record::<Todo>()), todos())
            .unwrap()
            .build()
            .unwrap();

        function
            .invoke(&BindingData::new(), &InvocationContext::new(), |args| async move {
                let found = args
                    .get::<Query<Todo>>("todos")?
                    .clone()
                    .where_eq("text", "b")
                    .execute()
                    .await?;
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].id, "2");
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sql_query_tokens_become_parameters() {
        let f = fixture();
        let attribute = DocumentAttribute::new("db", "orders")
            .with_sql_query("SELECT * FROM c WHERE c.customer = {customer.id}");
        let function = f
            .host
            .function("orders")
            .bind("orders", ParamType::Array(ItemType::json()), attribute)
            .unwrap()
            .build()
            .unwrap();

        let data = BindingData::new().with("customer", json!({"id": "c-9"}));
        function
            .invoke(&data, &InvocationContext::new(), unchanged)
            .await
            .unwrap();

        let calls = f.store.calls();
        let StoreCall::Query { spec, .. } = &calls[0] else {
            panic!("expected a query call, got {calls:?}");
        };
        let sql = spec.sql.as_ref().unwrap();
        assert_eq!(sql.text, "SELECT * FROM c WHERE c.customer = @customer_id");
        assert_eq!(sql.parameter("@customer_id"), Some("c-9"));
    }

    #[tokio::test]
    async fn tables_bind_to_resolved_names() {
        let f = seeded();
        let function = f
            .host
            .function("tables")
            .bind("raw", ParamType::RawTable, TableAttribute::new().with_table_name("{table}"))
            .unwrap()
            .bind("typed", ParamType::Table(ItemType::record::<Todo>()), todos())
            .unwrap()
            .build()
            .unwrap();

        let data = BindingData::new().with("table", "todos");
        function
            .invoke(&data, &InvocationContext::new(), |args| async move {
                let raw = args.get::<TableHandle>("raw")?;
                assert_eq!(raw.name(), "todos");
                raw.insert(json!({"id": "3", "text": "c"})).await?;

                let typed = args.get::<TypedTable<Todo>>("typed")?;
                let found = typed.lookup("3").await?;
                assert_eq!(found.map(|t| t.text), Some("c".to_string()));
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();
    }
}

// ═══════════════════════════════════════════════════════════════
// Invoke strings
// ═══════════════════════════════════════════════════════════════

mod invoke_string_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn replay_from_invoke_strings_without_trigger_data() {
        let f = fixture();
        f.store
            .seed("todos", vec![json!({"id": "42", "text": "answer"})]);
        let function = f
            .host
            .function("read")
            .bind(
                "todo",
                ParamType::Item(ItemType::record::<Todo>()),
                todos().with_id("{id}"),
            )
            .unwrap()
            .build()
            .unwrap();

        let strings = function.invoke_strings(&data("42")).unwrap();
        assert_eq!(strings["todo"], r#"{"tableName":"todos","id":"42"}"#);

        let args = function
            .invoke_from_strings(&strings, &InvocationContext::new(), unchanged)
            .await
            .unwrap();
        let todo = args.get::<Option<Todo>>("todo").unwrap().as_ref().unwrap();
        assert_eq!(todo.text, "answer");
    }

    #[tokio::test]
    async fn invoke_strings_keep_setting_names_not_secrets() {
        let f = fixture();
        f.store
            .seed("todos", vec![json!({"id": "42", "text": "answer"})]);
        let function = f
            .host
            .function("copy")
            .bind(
                "todo",
                ParamType::Item(ItemType::record::<Todo>()),
                todos()
                    .with_id("{id}")
                    .with_endpoint_setting("SecureTableEndpoint")
                    .with_api_key_setting("%SecureTableKey%"),
            )
            .unwrap()
            .bind(
                "doc",
                ParamType::Out(ItemType::json()),
                DocumentAttribute::new("db", "copies").with_connection_setting("SecureDocs"),
            )
            .unwrap()
            .build()
            .unwrap();

        let strings = function.invoke_strings(&data("42")).unwrap();
        for (name, value) in &strings {
            for secret in ["SUPER-SECRET-KEY", "SECRET-ACCOUNT-KEY", "secure.example.net"] {
                assert!(!value.contains(secret), "{name} leaks {secret}: {value}");
            }
        }
        let todo: Value = serde_json::from_str(&strings["todo"]).unwrap();
        assert_eq!(
            todo,
            json!({
                "tableName": "todos",
                "id": "42",
                "endpointSetting": "SecureTableEndpoint",
                "apiKeySetting": "SecureTableKey"
            })
        );

        let args = function
            .invoke_from_strings(&strings, &InvocationContext::new(), |mut args| async move {
                let text = args
                    .get::<Option<Todo>>("todo")?
                    .as_ref()
                    .map(|t| t.text.clone());
                args.get_mut::<Out<Value>>("doc")?
                    .set(json!({"id": "c-1", "text": text}));
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap();

        assert_eq!(
            args.get::<Option<Todo>>("todo").unwrap().as_ref().map(|t| t.id.as_str()),
            Some("42")
        );
        assert_eq!(
            f.store.records("db/copies"),
            vec![json!({"id": "c-1", "text": "answer"})]
        );
    }

    #[tokio::test]
    async fn malformed_invoke_string_is_rejected() {
        let f = fixture();
        let function = f
            .host
            .function("read")
            .bind("todo", ParamType::Item(ItemType::json()), todos().with_id("{id}"))
            .unwrap()
            .build()
            .unwrap();

        let mut strings = rustc_hash::FxHashMap::default();
        strings.insert("todo".to_string(), "not json".to_string());
        let err = function
            .invoke_from_strings(&strings, &InvocationContext::new(), unchanged)
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidInvokeString { .. }));

        let err = function
            .invoke_from_strings(&Default::default(), &InvocationContext::new(), unchanged)
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidInvokeString { .. }));
    }
}

// ═══════════════════════════════════════════════════════════════
// Invocation failures
// ═══════════════════════════════════════════════════════════════

mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn body_failure_skips_after_hooks() {
        let f = fixture();
        let function = f
            .host
            .function("write")
            .bind("todo", ParamType::Out(ItemType::json()), todos())
            .unwrap()
            .build()
            .unwrap();

        let err = function
            .invoke(&BindingData::new(), &InvocationContext::new(), |mut args| async move {
                args.get_mut::<Out<Value>>("todo")?.set(json!({"id": "1"}));
                Err::<Arguments, _>(anyhow::anyhow!("body failed"))
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BindError::FunctionFailed { ref function, .. } if function == "write"
        ));
        assert!(f.store.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_token_fails_the_invocation() {
        let f = fixture();
        let function = f
            .host
            .function("read")
            .bind("todo", ParamType::Item(ItemType::json()), todos().with_id("{id}"))
            .unwrap()
            .build()
            .unwrap();

        let err = function
            .invoke(&BindingData::new(), &InvocationContext::new(), unchanged)
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::BindingDataMissing { .. }));
        assert!(f.store.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_invocation_touches_nothing() {
        let f = fixture();
        let function = f
            .host
            .function("read")
            .bind("todo", ParamType::Item(ItemType::json()), todos().with_id("1"))
            .unwrap()
            .build()
            .unwrap();

        let cx = InvocationContext::new();
        cx.cancel();
        let err = function
            .invoke(&BindingData::new(), &cx, unchanged)
            .await
            .unwrap_err();

        assert!(matches!(err, BindError::Cancelled));
        assert!(f.store.calls().is_empty());
    }

    #[tokio::test]
    async fn dropped_argument_is_reported() {
        let f = fixture();
        let function = f
            .host
            .function("write")
            .bind("todo", ParamType::Out(ItemType::json()), todos())
            .unwrap()
            .build()
            .unwrap();

        let err = function
            .invoke(&BindingData::new(), &InvocationContext::new(), |mut args| async move {
                let _ = args.take::<Out<Value>>("todo")?;
                Ok::<_, anyhow::Error>(args)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::ArgumentInvalid { .. }));
    }

    #[tokio::test]
    async fn one_client_per_connection_across_invocations() {
        let f = fixture();
        let table = f
            .host
            .function("t")
            .bind("c", ParamType::Client, todos())
            .unwrap()
            .build()
            .unwrap();
        let document = f
            .host
            .function("d")
            .bind("c", ParamType::Client, DocumentAttribute::new("db", "c"))
            .unwrap()
            .build()
            .unwrap();

        for _ in 0..3 {
            table
                .invoke(&BindingData::new(), &InvocationContext::new(), unchanged)
                .await
                .unwrap();
            document
                .invoke(&BindingData::new(), &InvocationContext::new(), unchanged)
                .await
                .unwrap();
        }

        assert_eq!(f.factory.created(), 2);
    }
}
