#![allow(dead_code)]

use sorm::prelude::*;
use sorm::FromValue;
use sorm_sqlite::SqliteConnection;

pub const TABLES: &str = "
    CREATE TABLE people (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        height INTEGER,
        spouse INTEGER
    );
    CREATE TABLE friends (a INTEGER NOT NULL, b INTEGER NOT NULL);
    CREATE TABLE tags (code TEXT PRIMARY KEY, label TEXT NOT NULL);
";

pub const PERSON: &str = r#"{
    "name": "Person",
    "package": "people",
    "fields": [
        { "name": "id", "type": "i64", "primary": true },
        { "name": "name", "type": "String", "nullable": true },
        { "name": "desc", "type": "Description", "group": true },
        { "name": "height", "type": "i32", "parent": "desc", "nullable": true },
        { "name": "spouse", "type": "i64", "nullable": true,
          "link": { "mode": "OneToOne", "type": "Person", "key_type": "i64" } },
        { "name": "friends", "type": "Vec<Person>",
          "link": { "mode": "ManyToMany", "type": "Person", "key_type": "i64",
                    "collection": {
                        "read": [ { "dialect": "*", "sql": "SELECT b AS id FROM friends WHERE a = %{} ORDER BY b" } ],
                        "create": [ { "dialect": "*", "sql": "INSERT INTO friends (a, b) VALUES (%{1.id}, %{2.id():Long})" } ],
                        "delete": [ { "dialect": "*", "sql": "DELETE FROM friends WHERE a = %{1.id} AND b = %{2.id():Long}" } ]
                    } } }
    ],
    "create": [ { "dialect": "*", "sql": "INSERT INTO people (name, height, spouse) VALUES (%{name}, %{desc.height}, %{spouse})" } ],
    "pk": [ { "dialect": "sqlite", "sql": "SELECT last_insert_rowid() AS id" } ],
    "read": [ { "dialect": "*", "sql": "SELECT id, name, height, spouse FROM people WHERE id = %{}" } ],
    "update": [ { "dialect": "*", "sql": "UPDATE people SET name = %{name}, height = %{desc.height}, spouse = %{spouse} WHERE id = %{id}" } ],
    "delete": [ { "dialect": "*", "sql": "DELETE FROM people WHERE id = %{}" } ],
    "queries": [
        { "name": "by_name", "type": "i64",
          "params": [ { "name": "name", "type": "String" } ],
          "query": [ { "dialect": "*", "sql": "SELECT id FROM people WHERE name = %{name} ORDER BY id" } ] }
    ]
}"#;

pub const TAG: &str = r#"{
    "name": "Tag",
    "fields": [
        { "name": "code", "type": "String", "primary": true, "generator": "Pre" },
        { "name": "label", "type": "String" }
    ],
    "create": [ { "dialect": "*", "sql": "INSERT INTO tags (code, label) VALUES (%{code}, %{label})" } ],
    "read": [ { "dialect": "*", "sql": "SELECT code, label FROM tags WHERE code = %{}" } ]
}"#;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Description {
    pub height: Option<i32>,
}

impl Record for Description {
    fn get(&self, accessor: &str) -> Option<Value> {
        match accessor {
            "height" => Some(self.height.into()),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: Option<String>,
    pub desc: Option<Description>,
    pub spouse: Option<i64>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_height(mut self, height: i32) -> Self {
        self.desc = Some(Description {
            height: Some(height),
        });
        self
    }
}

impl Record for Person {
    fn get(&self, accessor: &str) -> Option<Value> {
        match accessor {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "spouse" => Some(self.spouse.into()),
            _ => None,
        }
    }

    fn group(&self, accessor: &str) -> Option<&dyn Record> {
        match accessor {
            "desc" => self.desc.as_ref().map(|d| d as &dyn Record),
            _ => None,
        }
    }
}

impl Entity for Person {
    const NAME: &'static str = "Person";
    type Key = i64;

    fn set(&mut self, setter: &str, value: Value) -> Result<()> {
        match setter {
            "id" => self.id = i64::from_value(&value)?,
            "name" => self.name = Option::<String>::from_value(&value)?,
            "desc.height" => {
                self.desc.get_or_insert_with(Description::default).height =
                    Option::<i32>::from_value(&value)?;
            }
            "spouse" => self.spouse = Option::<i64>::from_value(&value)?,
            other => return Err(Error::Unsupported(format!("Person has no setter {other}"))),
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub code: String,
    pub label: String,
}

impl Record for Tag {
    fn get(&self, accessor: &str) -> Option<Value> {
        match accessor {
            "code" => Some(self.code.clone().into()),
            "label" => Some(self.label.clone().into()),
            _ => None,
        }
    }
}

impl Entity for Tag {
    const NAME: &'static str = "Tag";
    type Key = String;

    fn set(&mut self, setter: &str, value: Value) -> Result<()> {
        match setter {
            "code" => self.code = String::from_value(&value)?,
            "label" => self.label = String::from_value(&value)?,
            other => return Err(Error::Unsupported(format!("Tag has no setter {other}"))),
        }
        Ok(())
    }
}

pub fn person_orm() -> Orm<Person> {
    Orm::from_json(PERSON).expect("compile Person")
}

pub fn tag_orm() -> Orm<Tag> {
    Orm::from_json(TAG).expect("compile Tag")
}

/// A session on a fresh in-memory database with the test tables.
pub fn session(dialect: &str, mode: CacheMode) -> Session<SqliteConnection> {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_batch(TABLES).expect("create tables");
    Session::open(conn, dialect, mode).expect("open session")
}

pub fn name_of(handle: &EntityRef<Person>) -> Option<String> {
    handle.read().expect("read lock").name.clone()
}

pub fn id_of(handle: &EntityRef<Person>) -> i64 {
    handle.read().expect("read lock").id
}
