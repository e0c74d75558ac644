#![forbid(unsafe_code)]

mod error;
mod requests;
mod window;

pub use error::{ErrorCategory, StoreError};
pub use requests::*;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use sl_core::{Node, NodeId, Story, StoryId, slugify};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_VERSION: i64 = 1;
const DB_FILE: &str = "storyloom.db";
const MAX_SLUG_ATTEMPTS: u32 = 10_000;

const STORY_COLUMNS: &str = "id, slug, title, root_id, created_at_ms, updated_at_ms";
const NODE_COLUMNS: &str =
    "id, story_id, parent_id, depth, choice_index, text, active_child_id, created_at_ms, updated_at_ms";

/// The StoryTree engine: one durable SQLite database per deployment holding
/// all story and node rows. Every mutation runs inside a single transaction,
/// so a sibling-index shift is never observable without its insertion.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Create a story and its root node atomically. Missing optional fields
    /// fall back to defaults; slug collisions are disambiguated with `-2`,
    /// `-3`, and so on.
    pub fn create_story(&mut self, request: CreateStoryRequest) -> Result<(Story, Node), StoreError> {
        let title = match request.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => "Untitled Story".to_string(),
        };
        let slug_base = slugify(request.slug.as_deref().unwrap_or(&title));
        let root_text = request.root_text.unwrap_or_default();
        let now_ms = now_ms();

        let story_id = StoryId::generate();
        let root_id = NodeId::generate();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let slug = disambiguate_slug_tx(&tx, &slug_base)?;

        tx.execute(
            "INSERT INTO stories(id, slug, title, root_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![story_id.as_str(), slug, title, root_id.as_str(), now_ms],
        )?;
        tx.execute(
            "INSERT INTO nodes(id, story_id, parent_id, depth, choice_index, text, active_child_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, NULL, 0, 0, ?3, NULL, ?4, ?4)",
            params![root_id.as_str(), story_id.as_str(), root_text, now_ms],
        )?;
        tx.commit()?;

        let story = Story {
            id: story_id.clone(),
            slug,
            title,
            root_id: root_id.clone(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        let root = Node {
            id: root_id,
            story_id,
            parent_id: None,
            depth: 0,
            choice_index: 0,
            text: root_text,
            active_child_id: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        Ok((story, root))
    }

    /// Insert one child beneath a parent, shifting later siblings to keep
    /// `choice_index` values contiguous from 0.
    pub fn create_child(&mut self, request: CreateChildRequest) -> Result<Node, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let story = story_by_ref_tx(&tx, &request.story)?;
        let parent = node_tx(&tx, &story.id, &request.parent_id)?;

        let sibling_count = child_count_tx(&tx, &story.id, parent.id.as_str())?;
        let choice_index = request
            .choice_index
            .map(|index| index.min(sibling_count))
            .unwrap_or(sibling_count);

        if choice_index < sibling_count {
            shift_siblings_tx(&tx, &story.id, parent.id.as_str(), choice_index)?;
        }

        let node_id = NodeId::generate();
        tx.execute(
            "INSERT INTO nodes(id, story_id, parent_id, depth, choice_index, text, active_child_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7)",
            params![
                node_id.as_str(),
                story.id.as_str(),
                parent.id.as_str(),
                parent.depth + 1,
                choice_index,
                request.text,
                now_ms,
            ],
        )?;

        if request.make_active {
            tx.execute(
                "UPDATE nodes SET active_child_id=?3, updated_at_ms=?4 WHERE story_id=?1 AND id=?2",
                params![story.id.as_str(), parent.id.as_str(), node_id.as_str(), now_ms],
            )?;
        }

        touch_story_tx(&tx, &story.id, now_ms)?;
        let node = node_tx(&tx, &story.id, node_id.as_str())?;
        tx.commit()?;
        Ok(node)
    }

    /// Thread a chunk list into a single-child chain beneath `parent_id`,
    /// favoring each new link, as one atomic insertion.
    pub fn create_chain(
        &mut self,
        story_ref: &str,
        parent_id: &str,
        chunks: &[String],
    ) -> Result<Vec<Node>, StoreError> {
        if chunks.is_empty() {
            return Err(StoreError::InvalidInput("chunk list must not be empty"));
        }

        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let story = story_by_ref_tx(&tx, story_ref)?;
        let mut parent = node_tx(&tx, &story.id, parent_id)?;

        let mut out: Vec<Node> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let choice_index = child_count_tx(&tx, &story.id, parent.id.as_str())?;
            let node_id = NodeId::generate();
            tx.execute(
                "INSERT INTO nodes(id, story_id, parent_id, depth, choice_index, text, active_child_id, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7)",
                params![
                    node_id.as_str(),
                    story.id.as_str(),
                    parent.id.as_str(),
                    parent.depth + 1,
                    choice_index,
                    chunk,
                    now_ms,
                ],
            )?;
            tx.execute(
                "UPDATE nodes SET active_child_id=?3, updated_at_ms=?4 WHERE story_id=?1 AND id=?2",
                params![story.id.as_str(), parent.id.as_str(), node_id.as_str(), now_ms],
            )?;
            if let Some(prev) = out.last_mut() {
                prev.active_child_id = Some(node_id.clone());
                prev.updated_at_ms = now_ms;
            }
            parent = node_tx(&tx, &story.id, node_id.as_str())?;
            out.push(parent.clone());
        }

        touch_story_tx(&tx, &story.id, now_ms)?;
        tx.commit()?;
        Ok(out)
    }

    /// Update only the supplied fields. A bad `active_child_id` fails
    /// validation and leaves the prior value untouched.
    pub fn update_node(&mut self, request: UpdateNodeRequest) -> Result<Node, StoreError> {
        if request.text.is_none() && request.active_child_id.is_none() {
            return Err(StoreError::InvalidInput(
                "update requires text or active_child_id",
            ));
        }

        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let story = story_by_ref_tx(&tx, &request.story)?;
        let node = node_tx(&tx, &story.id, &request.node_id)?;

        if let Some(active_child_id) = request.active_child_id.as_deref() {
            let is_child = tx
                .query_row(
                    "SELECT 1 FROM nodes WHERE story_id=?1 AND id=?2 AND parent_id=?3",
                    params![story.id.as_str(), active_child_id, node.id.as_str()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            if !is_child {
                return Err(StoreError::InvalidInput(
                    "active_child_id must name a child of the node",
                ));
            }
            tx.execute(
                "UPDATE nodes SET active_child_id=?3, updated_at_ms=?4 WHERE story_id=?1 AND id=?2",
                params![story.id.as_str(), node.id.as_str(), active_child_id, now_ms],
            )?;
        }

        if let Some(text) = request.text.as_deref() {
            tx.execute(
                "UPDATE nodes SET text=?3, updated_at_ms=?4 WHERE story_id=?1 AND id=?2",
                params![story.id.as_str(), node.id.as_str(), text, now_ms],
            )?;
        }

        touch_story_tx(&tx, &story.id, now_ms)?;
        let updated = node_tx(&tx, &story.id, node.id.as_str())?;
        tx.commit()?;
        Ok(updated)
    }

    /// Look up a story by id or slug.
    pub fn get_story(&self, story_ref: &str) -> Result<Story, StoreError> {
        story_by_ref(&self.conn, story_ref)
    }

    pub fn get_node(&self, story_ref: &str, node_id: &str) -> Result<Node, StoreError> {
        let story = story_by_ref(&self.conn, story_ref)?;
        node_in_story(&self.conn, &story.id, node_id)
    }

    /// All stories in creation order.
    pub fn list_stories(&self) -> Result<Vec<Story>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORY_COLUMNS} FROM stories ORDER BY created_at_ms ASC, rowid ASC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(story_from_row(row)?);
        }
        Ok(out)
    }

    /// The most recently updated story, used as the default landing story.
    pub fn primary_story(&self) -> Result<Option<Story>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORY_COLUMNS} FROM stories ORDER BY updated_at_ms DESC, rowid DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(story_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = ["store_state", "stories", "nodes"].into_iter().collect();

    if tables.iter().any(|table| !required.contains(table.as_str())) {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }
    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stories (
          id TEXT PRIMARY KEY,
          slug TEXT NOT NULL UNIQUE,
          title TEXT NOT NULL,
          root_id TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_stories_created
          ON stories(created_at_ms, id);
        CREATE INDEX IF NOT EXISTS idx_stories_updated
          ON stories(updated_at_ms, id);

        CREATE TABLE IF NOT EXISTS nodes (
          id TEXT PRIMARY KEY,
          story_id TEXT NOT NULL,
          parent_id TEXT,
          depth INTEGER NOT NULL,
          choice_index INTEGER NOT NULL,
          text TEXT NOT NULL,
          active_child_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(story_id) REFERENCES stories(id) ON DELETE CASCADE,
          CHECK(parent_id IS NULL OR parent_id <> id),
          CHECK((parent_id IS NULL) = (depth = 0))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_siblings
          ON nodes(story_id, parent_id, choice_index);
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

fn disambiguate_slug_tx(tx: &Transaction<'_>, base: &str) -> Result<String, StoreError> {
    if !slug_taken(tx, base)? {
        return Ok(base.to_string());
    }
    for suffix in 2..MAX_SLUG_ATTEMPTS {
        let candidate = format!("{base}-{suffix}");
        if !slug_taken(tx, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(StoreError::InvalidInput("could not derive a unique slug"))
}

fn slug_taken(conn: &Connection, slug: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM stories WHERE slug=?1",
            params![slug],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn story_by_ref(conn: &Connection, story_ref: &str) -> Result<Story, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {STORY_COLUMNS} FROM stories WHERE id=?1 OR slug=?1"),
            params![story_ref],
            story_tuple,
        )
        .optional()?;
    match row {
        Some(tuple) => story_from_tuple(tuple),
        None => Err(StoreError::StoryNotFound),
    }
}

fn story_by_ref_tx(tx: &Transaction<'_>, story_ref: &str) -> Result<Story, StoreError> {
    story_by_ref(tx, story_ref)
}

fn node_in_story(conn: &Connection, story_id: &StoryId, node_id: &str) -> Result<Node, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE story_id=?1 AND id=?2"),
            params![story_id.as_str(), node_id],
            node_tuple,
        )
        .optional()?;
    match row {
        Some(tuple) => node_from_tuple(tuple),
        None => Err(StoreError::NodeNotFound),
    }
}

fn node_tx(tx: &Transaction<'_>, story_id: &StoryId, node_id: &str) -> Result<Node, StoreError> {
    node_in_story(tx, story_id, node_id)
}

fn child_count_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    parent_id: &str,
) -> Result<u32, StoreError> {
    let count = tx.query_row(
        "SELECT COUNT(1) FROM nodes WHERE story_id=?1 AND parent_id=?2",
        params![story_id.as_str(), parent_id],
        |row| row.get::<_, i64>(0),
    )?;
    u32::try_from(count).map_err(|_| StoreError::InvalidInput("sibling count overflow"))
}

/// Shift `choice_index >= at` siblings by +1 without tripping the unique
/// sibling index. The shift detours through negative values because SQLite
/// checks uniqueness row by row during UPDATE.
fn shift_siblings_tx(
    tx: &Transaction<'_>,
    story_id: &StoryId,
    parent_id: &str,
    at: u32,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE nodes SET choice_index = -(choice_index + 2) \
         WHERE story_id=?1 AND parent_id=?2 AND choice_index >= ?3",
        params![story_id.as_str(), parent_id, at],
    )?;
    tx.execute(
        "UPDATE nodes SET choice_index = -choice_index - 1 \
         WHERE story_id=?1 AND parent_id=?2 AND choice_index < 0",
        params![story_id.as_str(), parent_id],
    )?;
    Ok(())
}

fn touch_story_tx(tx: &Transaction<'_>, story_id: &StoryId, now_ms: i64) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE stories SET updated_at_ms=?2 WHERE id=?1",
        params![story_id.as_str(), now_ms],
    )?;
    Ok(())
}

type StoryTuple = (String, String, String, String, i64, i64);

fn story_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoryTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn story_from_tuple(tuple: StoryTuple) -> Result<Story, StoreError> {
    let (id, slug, title, root_id, created_at_ms, updated_at_ms) = tuple;
    Ok(Story {
        id: StoryId::try_new(id).map_err(|_| StoreError::InvalidInput("invalid story row"))?,
        slug,
        title,
        root_id: NodeId::try_new(root_id)
            .map_err(|_| StoreError::InvalidInput("invalid story row"))?,
        created_at_ms,
        updated_at_ms,
    })
}

fn story_from_row(row: &rusqlite::Row<'_>) -> Result<Story, StoreError> {
    story_from_tuple(story_tuple(row)?)
}

type NodeTuple = (
    String,
    String,
    Option<String>,
    i64,
    i64,
    String,
    Option<String>,
    i64,
    i64,
);

fn node_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn node_from_tuple(tuple: NodeTuple) -> Result<Node, StoreError> {
    let (
        id,
        story_id,
        parent_id,
        depth,
        choice_index,
        text,
        active_child_id,
        created_at_ms,
        updated_at_ms,
    ) = tuple;
    let invalid = |_| StoreError::InvalidInput("invalid node row");
    Ok(Node {
        id: NodeId::try_new(id).map_err(invalid)?,
        story_id: StoryId::try_new(story_id).map_err(invalid)?,
        parent_id: parent_id.map(NodeId::try_new).transpose().map_err(invalid)?,
        depth: u32::try_from(depth).map_err(|_| StoreError::InvalidInput("invalid node row"))?,
        choice_index: u32::try_from(choice_index)
            .map_err(|_| StoreError::InvalidInput("invalid node row"))?,
        text,
        active_child_id: active_child_id
            .map(NodeId::try_new)
            .transpose()
            .map_err(invalid)?,
        created_at_ms,
        updated_at_ms,
    })
}

pub(crate) fn node_from_row(row: &rusqlite::Row<'_>) -> Result<Node, StoreError> {
    node_from_tuple(node_tuple(row)?)
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
