mod common;

use common::{Person, Tag, id_of, name_of, person_orm, session, tag_orm};
use sorm::prelude::*;
use sorm::{ConfigErrorKind, Matches};
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn create_fetches_key_and_read_returns_the_cached_instance() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();

    let ada = orm
        .create_one(&session, Person::named("Ada").with_height(170))
        .expect("create");
    assert_eq!(id_of(&ada), 1);

    let again = orm
        .read_one(&session, 1)
        .expect("read")
        .expect("row exists");
    assert!(Arc::ptr_eq(&ada, &again));
}

#[test]
fn uncached_session_reads_fresh_instances_from_storage() {
    let session = session("sqlite", CacheMode::None);
    let orm = person_orm();

    let ada = orm
        .create_one(&session, Person::named("Ada").with_height(170))
        .expect("create");
    let first = orm.read_one(&session, 1).expect("read").expect("row");
    let second = orm.read_one(&session, 1).expect("read").expect("row");

    assert!(!Arc::ptr_eq(&ada, &first));
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first.read().expect("lock"), *ada.read().expect("lock"));
}

#[test]
fn read_follows_key_order_and_skips_missing_rows() {
    let session = session("sqlite", CacheMode::None);
    let orm = person_orm();
    orm.create_all(&session, ["a", "b", "c"].map(Person::named))
        .expect("create");

    let people = orm.read(&session, &[3, 99, 1, 2]).expect("read");
    let ids: Vec<i64> = people.iter().map(id_of).collect();
    assert_eq!(ids, [3, 1, 2]);
    assert_eq!(name_of(&people[0]).as_deref(), Some("c"));
}

#[test]
fn all_cached_read_returns_every_key_in_any_order() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    let created = orm
        .create_all(&session, ["a", "b", "c"].map(Person::named))
        .expect("create");

    let people = orm.read(&session, &[3, 1, 2]).expect("read");
    let ids: HashSet<i64> = people.iter().map(id_of).collect();
    assert_eq!(ids, HashSet::from([1, 2, 3]));
    for handle in &people {
        assert!(created.iter().any(|c| Arc::ptr_eq(c, handle)));
    }
}

#[test]
fn group_fields_and_nulls_round_trip() {
    let session = session("sqlite", CacheMode::None);
    let orm = person_orm();

    orm.create_one(&session, Person::named("Tall").with_height(190))
        .expect("create");
    orm.create_one(&session, Person::default()).expect("create");

    let tall = orm.read_one(&session, 1).expect("read").expect("row");
    let tall = tall.read().expect("lock").clone();
    assert_eq!(tall.desc.and_then(|d| d.height), Some(190));

    let blank = orm.read_one(&session, 2).expect("read").expect("row");
    let blank = blank.read().expect("lock").clone();
    assert_eq!(blank.id, 2);
    assert_eq!(blank.name, None);
    assert_eq!(blank.desc.and_then(|d| d.height), None);
    assert_eq!(blank.spouse, None);
}

#[test]
fn update_writes_back_and_counts_rows() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    let people = orm
        .create_all(&session, ["a", "b"].map(Person::named))
        .expect("create");

    for handle in &people {
        let mut person = handle.write().expect("lock");
        person.name = Some(format!("{}!", person.name.clone().unwrap_or_default()));
    }
    assert_eq!(orm.update(&session, &people).expect("update"), 2);

    let renamed: Vec<i64> = orm
        .query(&session, "by_name", &[Value::Text("b!".to_string())])
        .expect("query");
    assert_eq!(renamed, [2]);
    assert_eq!(name_of(&people[1]).as_deref(), Some("b!"));
}

#[test]
fn delete_evicts_the_cached_instance() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    let ada = orm.create_one(&session, Person::named("Ada")).expect("create");
    assert!(session.cache_get::<Person>(&1).expect("cache").is_some());

    assert_eq!(orm.delete_one(&session, &ada).expect("delete"), 1);
    assert!(session.cache_get::<Person>(&1).expect("cache").is_none());
    assert!(orm.read_one(&session, 1).expect("read").is_none());
}

#[test]
fn named_query_binds_arguments_and_returns_keys_in_row_order() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    orm.create_all(&session, ["x", "y", "x"].map(Person::named))
        .expect("create");

    let ids: Vec<i64> = orm
        .query(&session, "by_name", &[Value::Text("x".to_string())])
        .expect("query");
    assert_eq!(ids, [1, 3]);

    let none: Vec<i64> = orm
        .query(&session, "by_name", &[Value::Text("z".to_string())])
        .expect("query");
    assert!(none.is_empty());

    assert!(matches!(
        orm.query::<i64, _>(&session, "by_name", &[]),
        Err(Error::Bind(_))
    ));
    assert_eq!(
        orm.query::<i64, _>(&session, "nope", &[])
            .unwrap_err()
            .config_kind(),
        Some(ConfigErrorKind::Invalid)
    );
}

#[test]
fn wildcard_serves_other_dialects_and_missing_branch_is_unknown_dialect() {
    let orm = person_orm();

    let h2 = session("h2", CacheMode::Immediate);
    match orm.create_one(&h2, Person::named("Ada")) {
        Err(Error::UnknownDialect(d)) => assert_eq!(d, "h2"),
        other => panic!("expected unknown dialect, got {other:?}"),
    }

    h2.connection()
        .expect("open")
        .execute_batch("INSERT INTO people (name) VALUES ('Ada')")
        .expect("insert");
    let ada = orm.read_one(&h2, 1).expect("wildcard read").expect("row");
    assert_eq!(name_of(&ada).as_deref(), Some("Ada"));
}

#[test]
fn pre_generated_keys_are_cached_after_create() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = tag_orm();

    let tag = orm
        .create_one(
            &session,
            Tag {
                code: "rs".to_string(),
                label: "Rust".to_string(),
            },
        )
        .expect("create");
    let cached = session
        .cache_get::<Tag>(&"rs".to_string())
        .expect("cache")
        .expect("cached");
    assert!(Arc::ptr_eq(&tag, &cached));

    let read = orm
        .read_one(&session, "rs".to_string())
        .expect("read")
        .expect("row");
    assert!(Arc::ptr_eq(&tag, &read));
}

#[test]
fn matches_streams_in_key_order_and_closes() {
    let session = session("sqlite", CacheMode::None);
    let orm = person_orm();
    orm.create_all(&session, ["a", "b", "c"].map(Person::named))
        .expect("create");

    let mut stream: Matches<'_, Person, _> = orm.matches(&session, [2, 7, 3]).expect("prepare");
    let first = stream.next().expect("item").expect("row");
    assert_eq!(id_of(&first), 2);
    assert_eq!(stream.remaining(), 2);
    let second = stream.next().expect("item").expect("row");
    assert_eq!(id_of(&second), 3);
    assert!(stream.next().is_none());
    stream.close().expect("close");

    let names: Vec<Option<String>> = orm
        .matches(&session, [1, 2])
        .expect("prepare")
        .map(|r| r.map(|h| name_of(&h)))
        .collect::<Result<_>>()
        .expect("stream");
    assert_eq!(names, [Some("a".to_string()), Some("b".to_string())]);
}

#[test]
fn bound_orm_forwards_to_its_session() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    let people = orm.bind(&session);

    let ada = people.create_one(Person::named("Ada")).expect("create");
    let read = people.read_one(1).expect("read").expect("row");
    assert!(Arc::ptr_eq(&ada, &read));
    assert_eq!(people.delete_one(&ada).expect("delete"), 1);
    assert!(people.read(&[1]).expect("read").is_empty());
}

#[test]
fn closed_session_rejects_routines() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    orm.create_one(&session, Person::named("Ada")).expect("create");
    session.close().expect("close");

    assert!(matches!(orm.read(&session, &[1]), Err(Error::IllegalState(_))));
    assert!(matches!(
        orm.create_one(&session, Person::named("Bob")),
        Err(Error::IllegalState(_))
    ));
    assert!(matches!(session.close(), Err(Error::IllegalState(_))));
}

#[test]
fn delayed_cache_mode_is_unsupported() {
    let conn = sorm_sqlite::SqliteConnection::open_memory().expect("open");
    assert!(matches!(
        Session::open(conn, "sqlite", CacheMode::Delayed),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn plan_for_another_entity_is_rejected() {
    let plan = tag_orm().plan().clone();
    let err = Orm::<Person>::from_plan(plan, Arc::default()).unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::Invalid));
}

#[test]
fn plan_serializes_for_emitters() {
    let json = person_orm().plan_json().expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(value["name"], "Person");
    assert_eq!(value["columns"].as_array().map(Vec::len), Some(3));
}

#[test]
fn context_sessions_keep_separate_caches() {
    let context = Context::new("sqlite", || {
        let conn = sorm_sqlite::SqliteConnection::open_memory()?;
        conn.execute_batch(common::TABLES)?;
        Ok(conn)
    });
    let orm = person_orm();

    let first = context.session().expect("session");
    let second = context.session().expect("session");
    let ada = orm.create_one(&first, Person::named("Ada")).expect("create");
    assert!(first.cache_get::<Person>(&id_of(&ada)).expect("cache").is_some());
    assert!(second.cache_get::<Person>(&id_of(&ada)).expect("cache").is_none());

    context.close().expect("close");
    assert!(matches!(context.session(), Err(Error::IllegalState(_))));
    assert!(!first.is_closed());
}

#[test]
fn dropped_instances_are_refetched_and_recached() {
    let session = session("sqlite", CacheMode::Immediate);
    let orm = person_orm();
    let ada = orm.create_one(&session, Person::named("Ada")).expect("create");
    let weak = Arc::downgrade(&ada);
    drop(ada);
    assert!(weak.upgrade().is_none());
    assert!(session.cache_get::<Person>(&1).expect("cache").is_none());

    let fresh = orm.read_one(&session, 1).expect("read").expect("row");
    assert_eq!(name_of(&fresh).as_deref(), Some("Ada"));
    let cached = session
        .cache_get::<Person>(&1)
        .expect("cache")
        .expect("reinserted");
    assert!(Arc::ptr_eq(&fresh, &cached));
}
