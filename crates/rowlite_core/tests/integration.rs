//! Integration tests over the full store surface: builder, registry,
//! both backends, versioning and queued delivery.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use rowlite_core::{
    ColumnDef, ColumnMap, ColumnSpec, DeliveryOptions, DeliveryQueue, Engine, LocalGateway,
    LogicalType, RecordMapper, StoreBuilder, StoreConfig, StoreError, StoreResult, Value,
};

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: Option<i64>,
    name: String,
    age: i64,
}

fn user(name: &str, age: i64) -> User {
    User {
        id: None,
        name: name.to_string(),
        age,
    }
}

struct UserMapper;

impl RecordMapper for UserMapper {
    type Record = User;

    fn table_name(&self) -> &str {
        "users"
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
            ColumnSpec::new("name", LogicalType::Text).not_null(),
            ColumnSpec::new("age", LogicalType::Integer),
        ]
    }

    fn to_row(&self, record: &User) -> ColumnMap {
        ColumnMap::new()
            .with("id", record.id)
            .with("name", record.name.as_str())
            .with("age", record.age)
    }

    fn from_row(&self, row: &ColumnMap) -> StoreResult<User> {
        Ok(User {
            id: row.get_i64("id"),
            name: row
                .get_text("name")
                .ok_or_else(|| StoreError::mapping("users row without a name"))?
                .to_string(),
            age: row.get_i64("age").unwrap_or(0),
        })
    }
}

/// The version 1 schema, before ages were tracked.
struct LegacyUserMapper;

impl RecordMapper for LegacyUserMapper {
    type Record = User;

    fn table_name(&self) -> &str {
        "users"
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
            ColumnSpec::new("name", LogicalType::Text).not_null(),
        ]
    }

    fn to_row(&self, record: &User) -> ColumnMap {
        ColumnMap::new()
            .with("id", record.id)
            .with("name", record.name.as_str())
    }

    fn from_row(&self, row: &ColumnMap) -> StoreResult<User> {
        UserMapper.from_row(row)
    }
}

/// The retired shape that [`User`] replaced.
#[derive(Debug, Clone)]
struct Member {
    name: String,
}

impl From<Member> for User {
    fn from(member: Member) -> Self {
        User {
            id: None,
            name: member.name,
            age: 0,
        }
    }
}

fn wait_until(deadline: Duration, mut ready: impl FnMut() -> bool) {
    let start = Instant::now();
    while !ready() {
        assert!(start.elapsed() < deadline, "timed out waiting for delivery");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn user_lifecycle_on_the_direct_backend() {
    let store = StoreBuilder::new(StoreConfig::new("app"))
        .register(UserMapper)
        .build()
        .unwrap();

    // A fresh store assigns the first key.
    let key = store.try_insert(user("Ann", 30)).unwrap();
    assert_eq!(key, 1);

    let ann = store.try_query::<User>(Value::Integer(key)).unwrap().unwrap();
    assert_eq!(
        ann,
        User {
            id: Some(1),
            name: "Ann".to_string(),
            age: 30
        }
    );

    // A text key with the same numeric value finds the same row.
    let ann = store.try_query::<User>(Value::from("1")).unwrap().unwrap();
    assert_eq!(ann.name, "Ann");

    // Deleting the key empties the store; the next lookup misses.
    assert!(store.try_delete_key::<User>(Value::Integer(key)).unwrap());
    assert_eq!(store.try_query::<User>(Value::Integer(key)).unwrap(), None);
}

#[test]
fn user_lifecycle_through_a_gateway() {
    // The host side owns the schema; the gateway only moves rows.
    let host = Engine::in_memory();
    let columns = UserMapper.descriptor().unwrap().engine_columns();
    host.create_table("users", &columns).unwrap();

    let store = StoreBuilder::new(StoreConfig::new("remote"))
        .gateway(LocalGateway::new(host.clone()))
        .register(UserMapper)
        .build()
        .unwrap();

    let key = store.try_insert(user("Ann", 30)).unwrap();
    let ann = store.try_query::<User>(Value::Integer(key)).unwrap().unwrap();
    assert_eq!((ann.id, ann.age), (Some(key), 30));

    assert!(store.try_delete_key::<User>(Value::Integer(key)).unwrap());
    assert_eq!(store.try_query::<User>(Value::Integer(key)).unwrap(), None);

    // Schema management stays on the host.
    assert!(matches!(
        store.try_create_all_tables().unwrap_err(),
        StoreError::Unsupported { .. }
    ));
}

#[test]
fn records_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new("people").directory(dir.path());

    let store = StoreBuilder::new(config.clone())
        .register(UserMapper)
        .build()
        .unwrap();
    store.try_insert(user("Ann", 30)).unwrap();
    store.try_insert(user("Bea", 31)).unwrap();
    drop(store);

    // A second build over the same directory sees the stored rows.
    let store = StoreBuilder::new(config)
        .register(UserMapper)
        .build()
        .unwrap();
    assert_eq!(store.try_count::<User>(None, &[]).unwrap(), 2);

    // Key assignment picks up where the first run stopped.
    assert_eq!(store.try_insert(user("Cara", 32)).unwrap(), 3);
}

#[test]
fn upgrade_listener_migrates_stored_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new("people").directory(dir.path());

    // Version 1 ships without an age column.
    let store = StoreBuilder::new(config.clone().version(1))
        .register(LegacyUserMapper)
        .build()
        .unwrap();
    store.try_insert(user("Ann", 0)).unwrap();
    drop(store);

    // Version 2 declares the column; the listener adds it with a default
    // so rows written under version 1 read back with a usable age.
    let store = StoreBuilder::new(config.version(2))
        .register(UserMapper)
        .add_upgrade_listener(2, |engine: &Engine, _old: i64, _new: i64| {
            engine.add_column("users", ColumnDef::new("age").default_value(18))?;
            Ok(())
        })
        .build()
        .unwrap();

    let ann = store.try_query::<User>(Value::Integer(1)).unwrap().unwrap();
    assert_eq!((ann.name.as_str(), ann.age), ("Ann", 18));
    assert_eq!(store.engine().unwrap().schema_version(), 2);

    // New rows carry their own ages.
    let key = store.try_insert(user("Bea", 31)).unwrap();
    let bea = store.try_query::<User>(Value::Integer(key)).unwrap().unwrap();
    assert_eq!(bea.age, 31);
}

#[test]
fn queued_deliveries_wait_for_the_owning_thread() {
    let store = StoreBuilder::new(StoreConfig::new("ui"))
        .register(UserMapper)
        .build()
        .unwrap();
    store
        .try_batch_insert(vec![user("Ann", 30), user("Bea", 31), user("Cara", 12)])
        .unwrap();

    let queue = DeliveryQueue::new();
    let (tx, rx) = mpsc::channel();
    store.query_where_async::<User, _>(
        "age >= ? ORDER BY age",
        vec![Value::Integer(18)],
        DeliveryOptions::queued(&queue),
        move |result: StoreResult<Vec<User>>| {
            let names: Vec<String> = result.unwrap().into_iter().map(|u| u.name).collect();
            tx.send(names).unwrap();
        },
    );

    // The worker parks the result on the queue instead of running it.
    wait_until(Duration::from_secs(5), || !queue.is_empty());
    assert!(rx.try_recv().is_err());

    // Draining on this thread releases the callback.
    assert_eq!(queue.drain(), 1);
    assert_eq!(
        rx.recv().unwrap(),
        vec!["Ann".to_string(), "Bea".to_string()]
    );
}

#[test]
fn retired_types_route_to_their_replacement() {
    let store = StoreBuilder::new(StoreConfig::new("alias"))
        .register(UserMapper)
        .register_alias::<Member, User>()
        .build()
        .unwrap();

    // Old call sites keep inserting the retired type; rows land as users.
    let key = store
        .try_insert(Member {
            name: "Ann".to_string(),
        })
        .unwrap();
    let ann = store.try_query::<User>(Value::Integer(key)).unwrap().unwrap();
    assert_eq!((ann.name.as_str(), ann.age), ("Ann", 0));
}
