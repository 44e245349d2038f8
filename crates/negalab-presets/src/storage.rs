//! Preset storage using SQLite
//!
//! Every operation opens its own connection scope against the database
//! file, performs its statements, and releases the scope on every exit
//! path, so no operation can leave a dangling transaction behind.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use negalab_core::{DEFAULT_PRESET_NAME, Preset};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::{PresetStoreError, Result};

/// File name of the preset database, relative to the working directory.
pub const DB_FILE: &str = "presets.db";

const PRESET_COLUMNS: &str = "name, film_type, dark_threshold, light_threshold, border_crop, \
     flip, white_point, black_point, gamma, shadows, highlights, temp, tint, sat, \
     base_detect, base_rgb, remove_dust, selected";

/// Handle for database connections - either owned per call or shared
enum ConnectionHandle {
    Owned(Connection),
    /// Used for `:memory:` databases, where each fresh open would create a
    /// new empty database
    Shared(Arc<Mutex<Connection>>),
}

impl ConnectionHandle {
    fn with_conn<T, F: FnOnce(&Connection) -> Result<T>>(&self, f: F) -> Result<T> {
        match self {
            ConnectionHandle::Owned(conn) => f(conn),
            ConnectionHandle::Shared(arc) => {
                let guard = arc.lock().unwrap_or_else(|e| e.into_inner());
                f(&guard)
            }
        }
    }

    fn with_conn_mut<T, F: FnOnce(&mut Connection) -> Result<T>>(&mut self, f: F) -> Result<T> {
        match self {
            ConnectionHandle::Owned(conn) => f(conn),
            ConnectionHandle::Shared(arc) => {
                let mut guard = arc.lock().unwrap_or_else(|e| e.into_inner());
                f(&mut guard)
            }
        }
    }
}

/// SQLite-backed storage for conversion presets
pub struct PresetStore {
    db_path: PathBuf,
    /// Holds the connection for in-memory databases
    memory_conn: Option<Arc<Mutex<Connection>>>,
}

impl PresetStore {
    /// Open or create the preset database at its fixed location,
    /// [`DB_FILE`] in the working directory.
    pub fn open() -> Result<Self> {
        Self::open_at(DB_FILE)
    }

    /// Open or create a preset database at the given path.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            db_path,
            memory_conn: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory preset store for testing
    pub fn in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn =
            Connection::open_in_memory().map_err(|source| PresetStoreError::Unavailable {
                path: path.clone(),
                source,
            })?;
        let store = Self {
            db_path: path,
            memory_conn: Some(Arc::new(Mutex::new(conn))),
        };
        store.initialize()?;
        Ok(store)
    }

    fn connect(&self) -> Result<ConnectionHandle> {
        if let Some(conn) = &self.memory_conn {
            Ok(ConnectionHandle::Shared(conn.clone()))
        } else {
            let conn =
                Connection::open(&self.db_path).map_err(|source| PresetStoreError::Unavailable {
                    path: self.db_path.clone(),
                    source,
                })?;
            Ok(ConnectionHandle::Owned(conn))
        }
    }

    /// Create the schema and seed the `"Default"` record if it is missing.
    ///
    /// Runs on every open and is safe to repeat.
    fn initialize(&self) -> Result<()> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS presets (
                    name TEXT PRIMARY KEY,
                    film_type INTEGER NOT NULL,
                    dark_threshold INTEGER NOT NULL,
                    light_threshold INTEGER NOT NULL,
                    border_crop INTEGER NOT NULL,
                    flip INTEGER NOT NULL,
                    white_point INTEGER NOT NULL,
                    black_point INTEGER NOT NULL,
                    gamma INTEGER NOT NULL,
                    shadows INTEGER NOT NULL,
                    highlights INTEGER NOT NULL,
                    temp INTEGER NOT NULL,
                    tint INTEGER NOT NULL,
                    sat INTEGER NOT NULL,
                    base_detect INTEGER NOT NULL,
                    base_rgb TEXT NOT NULL,
                    remove_dust INTEGER NOT NULL,
                    selected INTEGER NOT NULL
                )",
                [],
            )?;

            let have_default: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM presets WHERE name = ?1)",
                params![DEFAULT_PRESET_NAME],
                |row| row.get(0),
            )?;
            if !have_default {
                debug!("Seeding default preset record");
                insert_preset(conn, &Preset::default())?;
            }
            Ok(())
        })
    }

    /// List all presets, sorted by name
    pub fn list_presets(&self) -> Result<Vec<Preset>> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {PRESET_COLUMNS} FROM presets ORDER BY name ASC"))?;
            let rows = stmt.query_map([], row_to_preset)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Get a preset by name, or `None` if no such record exists
    pub fn get_preset(&self, name: &str) -> Result<Option<Preset>> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {PRESET_COLUMNS} FROM presets WHERE name = ?1"))?;
            match stmt.query_row(params![name], row_to_preset) {
                Ok(preset) => Ok(Some(preset)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Insert a new preset.
    ///
    /// Fails with [`PresetStoreError::DuplicateName`] if a record with the
    /// same name already exists.
    pub fn add_preset(&self, preset: &Preset) -> Result<()> {
        let handle = self.connect()?;
        handle.with_conn(|conn| insert_preset(conn, preset))
    }

    /// Overwrite every parameter of the record matching `preset.name`.
    ///
    /// The name column itself is never rewritten here; renames go through
    /// [`PresetStore::rename_preset`]. Returns whether a record matched.
    /// Updating a name that does not exist is not an error.
    pub fn update_preset(&self, preset: &Preset) -> Result<bool> {
        let base_rgb = serde_json::to_string(&preset.base_rgb)?;
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE presets SET film_type = ?2, dark_threshold = ?3, light_threshold = ?4,
                    border_crop = ?5, flip = ?6, white_point = ?7, black_point = ?8, gamma = ?9,
                    shadows = ?10, highlights = ?11, temp = ?12, tint = ?13, sat = ?14,
                    base_detect = ?15, base_rgb = ?16, remove_dust = ?17, selected = ?18
                 WHERE name = ?1",
                params![
                    preset.name,
                    preset.film_type,
                    preset.dark_threshold,
                    preset.light_threshold,
                    preset.border_crop,
                    preset.flip,
                    preset.white_point,
                    preset.black_point,
                    preset.gamma,
                    preset.shadows,
                    preset.highlights,
                    preset.temp,
                    preset.tint,
                    preset.sat,
                    preset.base_detect,
                    base_rgb,
                    preset.remove_dust,
                    preset.selected,
                ],
            )?;
            if affected == 0 {
                debug!("No preset named '{}' to update", preset.name);
            }
            Ok(affected > 0)
        })
    }

    /// Rename a preset, keeping all other parameters.
    ///
    /// Returns whether a record matched `old_name`; fails with
    /// [`PresetStoreError::DuplicateName`] if `new_name` is already taken.
    pub fn rename_preset(&self, old_name: &str, new_name: &str) -> Result<bool> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE presets SET name = ?2 WHERE name = ?1",
                    params![old_name, new_name],
                )
                .map_err(|e| key_collision(new_name, e))?;
            if affected == 0 {
                debug!("No preset named '{}' to rename", old_name);
            }
            Ok(affected > 0)
        })
    }

    /// Delete a preset by name, returning whether a record was removed.
    ///
    /// Deleting the `"Default"` record is allowed; it is reseeded the next
    /// time the store is opened.
    pub fn delete_preset(&self, name: &str) -> Result<bool> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM presets WHERE name = ?1", params![name])?;
            Ok(affected > 0)
        })
    }

    /// Get the currently selected preset, if any.
    ///
    /// When more than one record carries the flag, the first in storage
    /// order wins.
    pub fn get_selected(&self) -> Result<Option<Preset>> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PRESET_COLUMNS} FROM presets WHERE selected = 1 LIMIT 1"
            ))?;
            match stmt.query_row([], row_to_preset) {
                Ok(preset) => Ok(Some(preset)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Make the named preset the selected one, clearing the flag everywhere
    /// else in a single transaction.
    ///
    /// Returns whether the named record exists. On a miss the clear still
    /// commits, leaving no preset selected.
    pub fn select_preset(&self, name: &str) -> Result<bool> {
        let mut handle = self.connect()?;
        handle.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("UPDATE presets SET selected = 0 WHERE selected = 1", [])?;
            let affected =
                tx.execute("UPDATE presets SET selected = 1 WHERE name = ?1", params![name])?;
            tx.commit()?;
            if affected == 0 {
                debug!("No preset named '{}' to select", name);
            }
            Ok(affected > 0)
        })
    }
}

fn insert_preset(conn: &Connection, preset: &Preset) -> Result<()> {
    let base_rgb = serde_json::to_string(&preset.base_rgb)?;
    conn.execute(
        "INSERT INTO presets (name, film_type, dark_threshold, light_threshold, border_crop,
            flip, white_point, black_point, gamma, shadows, highlights, temp, tint, sat,
            base_detect, base_rgb, remove_dust, selected)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            preset.name,
            preset.film_type,
            preset.dark_threshold,
            preset.light_threshold,
            preset.border_crop,
            preset.flip,
            preset.white_point,
            preset.black_point,
            preset.gamma,
            preset.shadows,
            preset.highlights,
            preset.temp,
            preset.tint,
            preset.sat,
            preset.base_detect,
            base_rgb,
            preset.remove_dust,
            preset.selected,
        ],
    )
    .map_err(|e| key_collision(&preset.name, e))?;
    Ok(())
}

fn row_to_preset(row: &rusqlite::Row) -> rusqlite::Result<Preset> {
    let base_rgb_json: String = row.get(15)?;
    Ok(Preset {
        name: row.get(0)?,
        film_type: row.get(1)?,
        dark_threshold: row.get(2)?,
        light_threshold: row.get(3)?,
        border_crop: row.get(4)?,
        flip: row.get(5)?,
        white_point: row.get(6)?,
        black_point: row.get(7)?,
        gamma: row.get(8)?,
        shadows: row.get(9)?,
        highlights: row.get(10)?,
        temp: row.get(11)?,
        tint: row.get(12)?,
        sat: row.get(13)?,
        base_detect: row.get(14)?,
        base_rgb: serde_json::from_str(&base_rgb_json).unwrap_or([255, 255, 255]),
        remove_dust: row.get(16)?,
        selected: row.get(17)?,
    })
}

/// Map a primary-key collision to `DuplicateName`; pass anything else
/// through as a storage error.
fn key_collision(name: &str, err: rusqlite::Error) -> PresetStoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            PresetStoreError::DuplicateName(name.to_string())
        }
        _ => PresetStoreError::Storage(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn warm_preset() -> Preset {
        let mut preset = Preset::named("Warm");
        preset.temp = 20;
        preset
    }

    fn selected_names(store: &PresetStore) -> Vec<String> {
        store
            .list_presets()
            .unwrap()
            .into_iter()
            .filter(|p| p.selected)
            .map(|p| p.name)
            .collect()
    }

    #[test]
    fn test_fresh_store_seeds_default() {
        let store = PresetStore::in_memory().unwrap();

        let presets = store.list_presets().unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0], Preset::default());
    }

    #[test]
    fn test_initialize_is_idempotent_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("presets.db");

        let store = PresetStore::open_at(&db_path).unwrap();
        store.add_preset(&warm_preset()).unwrap();
        drop(store);

        let store = PresetStore::open_at(&db_path).unwrap();
        let presets = store.list_presets().unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets[0], Preset::default());
        assert_eq!(presets[1], warm_preset());
    }

    #[test]
    fn test_list_is_sorted_by_name() {
        let store = PresetStore::in_memory().unwrap();
        store.add_preset(&warm_preset()).unwrap();
        store.add_preset(&Preset::named("BW Pan")).unwrap();

        let names: Vec<String> = store
            .list_presets()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["BW Pan", "Default", "Warm"]);
    }

    #[test]
    fn test_add_duplicate_name_fails_and_preserves_record() {
        let store = PresetStore::in_memory().unwrap();

        let mut clash = Preset::named("Default");
        clash.sat = 50;
        let err = store.add_preset(&clash).unwrap_err();
        assert!(matches!(err, PresetStoreError::DuplicateName(name) if name == "Default"));

        let existing = store.get_preset("Default").unwrap().unwrap();
        assert_eq!(existing, Preset::default());
    }

    #[test]
    fn test_update_rewrites_all_fields() {
        let store = PresetStore::in_memory().unwrap();
        store.add_preset(&warm_preset()).unwrap();

        let updated = Preset {
            name: "Warm".to_string(),
            film_type: 2,
            dark_threshold: 30,
            light_threshold: 90,
            border_crop: 3,
            flip: true,
            white_point: 5,
            black_point: -5,
            gamma: 10,
            shadows: 4,
            highlights: -4,
            temp: 35,
            tint: -10,
            sat: 80,
            base_detect: 1,
            base_rgb: [240, 190, 150],
            remove_dust: true,
            selected: false,
        };
        assert!(store.update_preset(&updated).unwrap());

        let presets = store.list_presets().unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(store.get_preset("Warm").unwrap().unwrap(), updated);
    }

    #[test]
    fn test_update_missing_is_noop() {
        let store = PresetStore::in_memory().unwrap();

        assert!(!store.update_preset(&Preset::named("Nope")).unwrap());
        assert_eq!(store.list_presets().unwrap().len(), 1);
    }

    #[test]
    fn test_rename_preserves_other_fields() {
        let store = PresetStore::in_memory().unwrap();
        store.add_preset(&warm_preset()).unwrap();

        assert!(store.rename_preset("Warm", "Tungsten").unwrap());

        assert!(store.get_preset("Warm").unwrap().is_none());
        let renamed = store.get_preset("Tungsten").unwrap().unwrap();
        assert_eq!(renamed.temp, 20);
        assert_eq!(
            renamed,
            Preset {
                name: "Tungsten".to_string(),
                ..warm_preset()
            }
        );
    }

    #[test]
    fn test_rename_missing_is_noop() {
        let store = PresetStore::in_memory().unwrap();

        assert!(!store.rename_preset("Nope", "Still Nope").unwrap());
        assert_eq!(store.list_presets().unwrap().len(), 1);
    }

    #[test]
    fn test_rename_onto_existing_name_fails() {
        let store = PresetStore::in_memory().unwrap();
        store.add_preset(&warm_preset()).unwrap();

        let err = store.rename_preset("Warm", "Default").unwrap_err();
        assert!(matches!(err, PresetStoreError::DuplicateName(name) if name == "Default"));

        // Both records survive the failed rename
        assert!(store.get_preset("Warm").unwrap().is_some());
        assert!(store.get_preset("Default").unwrap().is_some());
    }

    #[test]
    fn test_delete_preset() {
        let store = PresetStore::in_memory().unwrap();
        store.add_preset(&warm_preset()).unwrap();

        assert!(store.delete_preset("Warm").unwrap());
        assert_eq!(store.list_presets().unwrap().len(), 1);

        assert!(!store.delete_preset("Warm").unwrap());
        assert_eq!(store.list_presets().unwrap().len(), 1);
    }

    #[test]
    fn test_deleted_default_is_reseeded_on_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("presets.db");

        let store = PresetStore::open_at(&db_path).unwrap();
        assert!(store.delete_preset("Default").unwrap());
        assert!(store.list_presets().unwrap().is_empty());
        drop(store);

        let store = PresetStore::open_at(&db_path).unwrap();
        let presets = store.list_presets().unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0], Preset::default());
    }

    #[test]
    fn test_get_selected_returns_seeded_default() {
        let store = PresetStore::in_memory().unwrap();

        let selected = store.get_selected().unwrap().unwrap();
        assert_eq!(selected.name, "Default");
    }

    #[test]
    fn test_select_preset_moves_selection_exclusively() {
        let store = PresetStore::in_memory().unwrap();
        store.add_preset(&warm_preset()).unwrap();

        assert!(store.select_preset("Warm").unwrap());

        assert_eq!(selected_names(&store), vec!["Warm"]);
        assert_eq!(store.get_selected().unwrap().unwrap().name, "Warm");
    }

    #[test]
    fn test_select_missing_clears_selection() {
        let store = PresetStore::in_memory().unwrap();

        assert!(!store.select_preset("Nope").unwrap());
        assert!(store.get_selected().unwrap().is_none());
        assert!(selected_names(&store).is_empty());
    }

    #[test]
    fn test_select_collapses_multiple_selected_records() {
        let store = PresetStore::in_memory().unwrap();
        // add_preset does not police the flag, so two records can carry it
        let mut warm = warm_preset();
        warm.selected = true;
        store.add_preset(&warm).unwrap();
        assert_eq!(selected_names(&store).len(), 2);

        assert!(store.select_preset("Default").unwrap());
        assert_eq!(selected_names(&store), vec!["Default"]);
    }

    #[test]
    fn test_get_preset_miss_returns_none() {
        let store = PresetStore::in_memory().unwrap();

        assert!(store.get_preset("Nope").unwrap().is_none());
    }

    #[test]
    fn test_presets_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("deep").join("presets.db");

        let store = PresetStore::open_at(&db_path).unwrap();
        store.add_preset(&warm_preset()).unwrap();
        store.select_preset("Warm").unwrap();
        drop(store);

        let store = PresetStore::open_at(&db_path).unwrap();
        assert_eq!(
            store.get_preset("Warm").unwrap().unwrap(),
            Preset {
                selected: true,
                ..warm_preset()
            }
        );
        assert_eq!(store.get_selected().unwrap().unwrap().name, "Warm");
    }
}
