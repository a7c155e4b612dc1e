//! Fixtures shared by the unit tests.

use strata_core::{Statement, Value};
use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::engine::{create_engine, Engine};
use crate::entity::{Entity, ModelClass};

pub const NOTES: ModelClass = ModelClass::new("notes", "id");

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub views: i64,
}

impl Note {
    pub fn new(id: i64, title: &str) -> Self {
        Note {
            id,
            title: title.to_string(),
            body: String::new(),
            views: 0,
        }
    }

    pub fn insert_statement(&self) -> Statement {
        Statement::insert(NOTES.table(), &self.columns()).unwrap()
    }
}

impl Entity for Note {
    const MODEL: Option<ModelClass> = Some(NOTES);

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("title", self.title.clone().into()),
            ("body", self.body.clone().into()),
            ("views", self.views.into()),
        ]
    }
}

pub fn note_schema() -> Statement {
    Statement::new(
        "CREATE TABLE notes (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            views INTEGER NOT NULL
        )",
    )
}

/// A file-backed engine with the `notes` table created outside any session,
/// so session counters start at zero.
pub async fn temp_engine() -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::sqlite(dir.path().join("test.db")).unwrap();
    let engine = create_engine(&config).unwrap();

    sqlx::query(note_schema().sql())
        .execute(engine.pool())
        .await
        .unwrap();

    (dir, engine)
}
