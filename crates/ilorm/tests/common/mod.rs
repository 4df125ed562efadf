//! Models and fixtures shared by the integration tests.

#![allow(dead_code)]

use ilorm::prelude::*;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub team_id: Option<i64>,
    pub age: Option<i64>,
}

impl User {
    pub fn new(id: i64, first_name: &str, team_id: i64, age: i64) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            team_id: Some(team_id),
            age: Some(age),
        }
    }
}

impl Model for User {
    const NAME: &'static str = "users";

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", FieldKind::Number).primary_key(true),
            FieldInfo::new("firstName", FieldKind::String),
            FieldInfo::new("teamId", FieldKind::Number).nullable(true),
            FieldInfo::new("age", FieldKind::Number).nullable(true),
        ];
        FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            first_name: row.get_named("firstName")?,
            team_id: row.get_opt("teamId")?,
            age: row.get_opt("age")?,
        })
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("firstName", self.first_name.clone().into()),
            ("teamId", self.team_id.into()),
            ("age", self.age.into()),
        ]
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

impl Model for Team {
    const NAME: &'static str = "teams";

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", FieldKind::Number).primary_key(true),
            FieldInfo::new("name", FieldKind::String),
        ];
        FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }
}

/// A user's badge, keyed by user and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Badge {
    pub user_id: i64,
    pub kind: String,
}

impl Model for Badge {
    const NAME: &'static str = "badges";

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("userId", FieldKind::Number).primary_key(true),
            FieldInfo::new("kind", FieldKind::String).primary_key(true),
        ];
        FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            user_id: row.get_named("userId")?,
            kind: row.get_named("kind")?,
        })
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("userId", self.user_id.into()), ("kind", self.kind.clone().into())]
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.user_id.into(), self.kind.clone().into()]
    }
}

/// Users 1-5 spread over teams 10 (core) and 20 (docs); badges for 1, 3, 4.
pub fn fixtures(config: MemoryConfig) -> Arc<MemoryConnector> {
    let connector = MemoryConnector::new(config);
    connector.seed(
        User::NAME,
        [
            User::new(1, "Guillaume", 10, 30),
            User::new(2, "Tom", 20, 25),
            User::new(3, "Ana", 10, 41),
            User::new(4, "Lea", 20, 19),
            User::new(5, "Marc", 10, 35),
        ]
        .iter()
        .map(|u| Row::from_pairs(u.to_row())),
    );
    connector.seed(
        Team::NAME,
        [
            Team { id: 10, name: "core".to_string() },
            Team { id: 20, name: "docs".to_string() },
        ]
        .iter()
        .map(|t| Row::from_pairs(t.to_row())),
    );
    connector.seed(
        Badge::NAME,
        [(1, "mentor"), (3, "mentor"), (4, "reviewer"), (3, "reviewer")]
            .into_iter()
            .map(|(user_id, kind)| {
                Row::from_pairs(
                    Badge {
                        user_id,
                        kind: kind.to_string(),
                    }
                    .to_row(),
                )
            }),
    );
    Arc::new(connector)
}

pub fn ids(users: &[User]) -> Vec<i64> {
    users.iter().map(|u| u.id).collect()
}
