use async_trait::async_trait;

use crate::models::*;
use crate::pagination::Window;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("storage failure: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn get_password_hash(&self, id: Id) -> RepoResult<String>;
    async fn set_password_hash(&self, id: Id, hash: String) -> RepoResult<()>;
    /// Removes the user with their posts, comments and follow edges.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait GroupRepo: Send + Sync {
    async fn list_groups(&self) -> RepoResult<Vec<Group>>;
    async fn create_group(&self, new: NewGroup) -> RepoResult<Group>;
    async fn get_group(&self, id: Id) -> RepoResult<Group>;
    async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group>;
    /// Posts of the group survive with `group` cleared.
    async fn delete_group(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Comments of the post are deleted with it.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64>;
    /// Newest first (`created` desc, ties broken by id desc).
    async fn list_posts(&self, filter: &PostFilter, window: Window) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// Returns `true` when a new edge was stored, `false` when it already
    /// existed. Self-follow is a `Conflict`.
    async fn create_follow(&self, user_id: Id, author_id: Id) -> RepoResult<bool>;
    /// Returns `true` when an edge was removed.
    async fn delete_follow(&self, user_id: Id, author_id: Id) -> RepoResult<bool>;
    async fn is_following(&self, user_id: Id, author_id: Id) -> RepoResult<bool>;
    async fn list_following(&self, user_id: Id) -> RepoResult<Vec<Id>>;
}

pub trait Repo: UserRepo + GroupRepo + PostRepo + CommentRepo + FollowRepo {}

impl<T> Repo for T where T: UserRepo + GroupRepo + PostRepo + CommentRepo + FollowRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

    #[derive(Clone, Serialize, Deserialize)]
    struct StoredUser {
        user: User,
        password_hash: String,
    }

    #[derive(Clone, Serialize, Deserialize)]
    struct PostRow {
        id: Id,
        text: String,
        created: DateTime<Utc>,
        author_id: Id,
        group_id: Option<Id>,
        image: Option<String>,
    }

    #[derive(Clone, Serialize, Deserialize)]
    struct CommentRow {
        id: Id,
        text: String,
        created: DateTime<Utc>,
        author_id: Id,
        post_id: Id,
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, StoredUser>,
        groups: HashMap<Id, Group>,
        posts: HashMap<Id, PostRow>,
        comments: HashMap<Id, CommentRow>,
        follows: HashMap<Id, Follow>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn username(&self, id: Id) -> String {
            self.users.get(&id).map(|u| u.user.username.clone()).unwrap_or_default()
        }

        fn hydrate_post(&self, row: &PostRow) -> Post {
            Post {
                id: row.id,
                text: row.text.clone(),
                created: row.created,
                author_id: row.author_id,
                author: self.username(row.author_id),
                group_id: row.group_id,
                group: row.group_id.and_then(|g| self.groups.get(&g)).map(|g| g.slug.clone()),
                image: row.image.clone(),
            }
        }

        fn hydrate_comment(&self, row: &CommentRow) -> Comment {
            Comment {
                id: row.id,
                text: row.text.clone(),
                created: row.created,
                author_id: row.author_id,
                author: self.username(row.author_id),
                post_id: row.post_id,
            }
        }

        fn remove_post(&mut self, id: Id) -> Option<PostRow> {
            let row = self.posts.remove(&id)?;
            self.comments.retain(|_, c| c.post_id != id);
            Some(row)
        }
    }

    /// Mirrors the `btrim(text) <> ''` CHECK of the SQL schema.
    fn blank_guard(text: &str) -> RepoResult<()> {
        if text.trim().is_empty() { Err(RepoError::Conflict) } else { Ok(()) }
    }

    /// Process-local repository. Every operation holds the state lock for its
    /// whole check-and-write, so uniqueness rules cannot race.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
        /// Held from reading the state to renaming the file, so the snapshot
        /// left on disk is always the newest one taken.
        persist_lock: Arc<Mutex<()>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        /// Loads `path` if present and rewrites it after every mutation.
        pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
                persist_lock: Arc::default(),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}' ({e}); starting empty", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            let Ok(_order) = self.persist_lock.lock() else {
                log::error!("snapshot lock poisoned; '{}' not written", path.display());
                return;
            };
            let bytes = {
                let Ok(state) = self.state.read() else { return };
                match serde_json::to_vec_pretty(&*state) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::error!("failed to serialize snapshot: {e}");
                        return;
                    }
                }
            };
            if let Some(dir) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    log::error!("failed to create snapshot dir '{}': {e}", dir.display());
                    return;
                }
            }
            let tmp = path.with_extension("json.tmp");
            if let Err(e) = std::fs::write(&tmp, &bytes).and_then(|()| std::fs::rename(&tmp, path.as_path())) {
                log::error!("failed to write snapshot '{}': {e}", path.display());
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.user.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let user = User {
                id,
                username: new.username,
                email: new.email,
                first_name: new.first_name,
                last_name: new.last_name,
                is_admin: new.is_admin,
                date_joined: Utc::now(),
            };
            s.users.insert(id, StoredUser { user: user.clone(), password_hash: new.password_hash });
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).map(|u| u.user.clone()).ok_or(RepoError::NotFound)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            let s = self.read()?;
            s.users
                .values()
                .find(|u| u.user.username == username)
                .map(|u| u.user.clone())
                .ok_or(RepoError::NotFound)
        }

        async fn get_password_hash(&self, id: Id) -> RepoResult<String> {
            let s = self.read()?;
            s.users.get(&id).map(|u| u.password_hash.clone()).ok_or(RepoError::NotFound)
        }

        async fn set_password_hash(&self, id: Id, hash: String) -> RepoResult<()> {
            let mut s = self.write()?;
            let stored = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            stored.password_hash = hash;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.users.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            let owned: Vec<Id> = s.posts.values().filter(|p| p.author_id == id).map(|p| p.id).collect();
            for post_id in owned {
                s.remove_post(post_id);
            }
            s.comments.retain(|_, c| c.author_id != id);
            s.follows.retain(|_, f| f.user_id != id && f.author_id != id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl GroupRepo for InMemRepo {
        async fn list_groups(&self) -> RepoResult<Vec<Group>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.groups.values().cloned().collect();
            v.sort_by(|a, b| a.title.cmp(&b.title));
            Ok(v)
        }

        async fn create_group(&self, new: NewGroup) -> RepoResult<Group> {
            let mut s = self.write()?;
            if s.groups.values().any(|g| g.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let group = Group { id, title: new.title, slug: new.slug, description: new.description };
            s.groups.insert(id, group.clone());
            drop(s);
            self.persist();
            Ok(group)
        }

        async fn get_group(&self, id: Id) -> RepoResult<Group> {
            let s = self.read()?;
            s.groups.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group> {
            let s = self.read()?;
            s.groups.values().find(|g| g.slug == slug).cloned().ok_or(RepoError::NotFound)
        }

        async fn delete_group(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.groups.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            for post in s.posts.values_mut().filter(|p| p.group_id == Some(id)) {
                post.group_id = None;
            }
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            blank_guard(&new.text)?;
            let mut s = self.write()?;
            if !s.users.contains_key(&new.author_id) {
                return Err(RepoError::NotFound);
            }
            if let Some(g) = new.group_id {
                if !s.groups.contains_key(&g) {
                    return Err(RepoError::NotFound);
                }
            }
            let id = s.next_id();
            let row = PostRow {
                id,
                text: new.text,
                created: Utc::now(),
                author_id: new.author_id,
                group_id: new.group_id,
                image: new.image,
            };
            let post = s.hydrate_post(&row);
            s.posts.insert(id, row);
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.get(&id).map(|row| s.hydrate_post(row)).ok_or(RepoError::NotFound)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            blank_guard(&upd.text)?;
            let mut s = self.write()?;
            if let Some(g) = upd.group_id {
                if !s.groups.contains_key(&g) {
                    return Err(RepoError::NotFound);
                }
            }
            let row = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            row.text = upd.text;
            row.group_id = upd.group_id;
            row.image = upd.image;
            let row = row.clone();
            let post = s.hydrate_post(&row);
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            s.remove_post(id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64> {
            let s = self.read()?;
            Ok(s.posts.values().filter(|p| filter.matches(p.author_id, p.group_id)).count() as u64)
        }

        async fn list_posts(&self, filter: &PostFilter, window: Window) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut rows: Vec<&PostRow> = s
                .posts
                .values()
                .filter(|p| filter.matches(p.author_id, p.group_id))
                .collect();
            rows.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
            Ok(rows
                .into_iter()
                .skip(window.offset)
                .take(window.limit)
                .map(|row| s.hydrate_post(row))
                .collect())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            blank_guard(&new.text)?;
            let mut s = self.write()?;
            if !s.posts.contains_key(&new.post_id) || !s.users.contains_key(&new.author_id) {
                return Err(RepoError::NotFound);
            }
            let id = s.next_id();
            let row = CommentRow {
                id,
                text: new.text,
                created: Utc::now(),
                author_id: new.author_id,
                post_id: new.post_id,
            };
            let comment = s.hydrate_comment(&row);
            s.comments.insert(id, row);
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut rows: Vec<&CommentRow> = s.comments.values().filter(|c| c.post_id == post_id).collect();
            rows.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
            Ok(rows.into_iter().map(|row| s.hydrate_comment(row)).collect())
        }
    }

    #[async_trait]
    impl FollowRepo for InMemRepo {
        async fn create_follow(&self, user_id: Id, author_id: Id) -> RepoResult<bool> {
            if user_id == author_id {
                return Err(RepoError::Conflict);
            }
            let mut s = self.write()?;
            if !s.users.contains_key(&user_id) || !s.users.contains_key(&author_id) {
                return Err(RepoError::NotFound);
            }
            if s.follows.values().any(|f| f.user_id == user_id && f.author_id == author_id) {
                return Ok(false);
            }
            let id = s.next_id();
            s.follows.insert(id, Follow { id, user_id, author_id });
            drop(s);
            self.persist();
            Ok(true)
        }

        async fn delete_follow(&self, user_id: Id, author_id: Id) -> RepoResult<bool> {
            let mut s = self.write()?;
            let before = s.follows.len();
            s.follows.retain(|_, f| !(f.user_id == user_id && f.author_id == author_id));
            let removed = s.follows.len() != before;
            drop(s);
            if removed {
                self.persist();
            }
            Ok(removed)
        }

        async fn is_following(&self, user_id: Id, author_id: Id) -> RepoResult<bool> {
            let s = self.read()?;
            Ok(s.follows.values().any(|f| f.user_id == user_id && f.author_id == author_id))
        }

        async fn list_following(&self, user_id: Id) -> RepoResult<Vec<Id>> {
            let s = self.read()?;
            let mut ids: Vec<Id> = s.follows.values().filter(|f| f.user_id == user_id).map(|f| f.author_id).collect();
            ids.sort_unstable();
            Ok(ids)
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, QueryBuilder};

    const USER_COLUMNS: &str = "id, username, email, first_name, last_name, is_admin, date_joined";

    const POST_SELECT: &str = r#"
        SELECT p.id, p.text, p.created, p.author_id, u.username AS author,
               p.group_id, g.slug AS "group", p.image
        FROM posts p
        JOIN users u ON u.id = p.author_id
        LEFT JOIN groups g ON g.id = p.group_id
    "#;

    const COMMENT_SELECT: &str = r#"
        SELECT c.id, c.text, c.created, c.author_id, u.username AS author, c.post_id
        FROM comments c
        JOIN users u ON u.id = c.author_id
    "#;

    /// Postgres-backed repository. Uniqueness, cascades and the self-follow
    /// ban live in the schema (`migrations/`).
    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    fn db_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation, check_violation
                Some("23505") | Some("23514") => RepoError::Conflict,
                // foreign_key_violation
                Some("23503") => RepoError::NotFound,
                _ => RepoError::Internal(e.to_string()),
            },
            _ => RepoError::Internal(e.to_string()),
        }
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
        match filter {
            PostFilter::All => {}
            PostFilter::Group(id) => { qb.push(" WHERE p.group_id = ").push_bind(*id); }
            PostFilter::Author(id) => { qb.push(" WHERE p.author_id = ").push_bind(*id); }
            PostFilter::Authors(ids) => { qb.push(" WHERE p.author_id = ANY(").push_bind(ids.clone()).push(")"); }
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (username, email, first_name, last_name, password_hash, is_admin) \
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING {USER_COLUMNS}"
            ))
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.password_hash)
            .bind(new.is_admin)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn get_password_hash(&self, id: Id) -> RepoResult<String> {
            sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn set_password_hash(&self, id: Id, hash: String) -> RepoResult<()> {
            let done = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                .bind(id)
                .bind(hash)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let done = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl GroupRepo for PgRepo {
        async fn list_groups(&self) -> RepoResult<Vec<Group>> {
            sqlx::query_as::<_, Group>("SELECT id, title, slug, description FROM groups ORDER BY title")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn create_group(&self, new: NewGroup) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>(
                "INSERT INTO groups (title, slug, description) VALUES ($1,$2,$3) RETURNING id, title, slug, description",
            )
            .bind(&new.title)
            .bind(&new.slug)
            .bind(&new.description)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_group(&self, id: Id) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>("SELECT id, title, slug, description FROM groups WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>("SELECT id, title, slug, description FROM groups WHERE slug = $1")
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn delete_group(&self, id: Id) -> RepoResult<()> {
            let done = sqlx::query("DELETE FROM groups WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let id = sqlx::query_scalar::<_, Id>(
                "INSERT INTO posts (text, author_id, group_id, image) VALUES ($1,$2,$3,$4) RETURNING id",
            )
            .bind(&new.text)
            .bind(new.author_id)
            .bind(new.group_id)
            .bind(new.image.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            self.get_post(id).await
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let done = sqlx::query("UPDATE posts SET text = $2, group_id = $3, image = $4 WHERE id = $1")
                .bind(id)
                .bind(&upd.text)
                .bind(upd.group_id)
                .bind(upd.image.as_deref())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            self.get_post(id).await
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let done = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64> {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
            push_filter(&mut qb, filter);
            let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await.map_err(db_err)?;
            Ok(n as u64)
        }

        async fn list_posts(&self, filter: &PostFilter, window: Window) -> RepoResult<Vec<Post>> {
            let mut qb = QueryBuilder::<Postgres>::new(POST_SELECT);
            push_filter(&mut qb, filter);
            qb.push(" ORDER BY p.created DESC, p.id DESC LIMIT ")
                .push_bind(window.limit as i64)
                .push(" OFFSET ")
                .push_bind(window.offset as i64);
            qb.build_query_as::<Post>().fetch_all(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let id = sqlx::query_scalar::<_, Id>(
                "INSERT INTO comments (text, author_id, post_id) VALUES ($1,$2,$3) RETURNING id",
            )
            .bind(&new.text)
            .bind(new.author_id)
            .bind(new.post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(&format!(
                "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created DESC, c.id DESC"
            ))
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }
    }

    #[async_trait]
    impl FollowRepo for PgRepo {
        async fn create_follow(&self, user_id: Id, author_id: Id) -> RepoResult<bool> {
            // The unique index decides; concurrent inserts of the same pair
            // resolve to exactly one row.
            let inserted = sqlx::query_scalar::<_, Id>(
                "INSERT INTO follows (user_id, author_id) VALUES ($1,$2) \
                 ON CONFLICT (user_id, author_id) DO NOTHING RETURNING id",
            )
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(inserted.is_some())
        }

        async fn delete_follow(&self, user_id: Id, author_id: Id) -> RepoResult<bool> {
            let done = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
                .bind(user_id)
                .bind(author_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(done.rows_affected() > 0)
        }

        async fn is_following(&self, user_id: Id, author_id: Id) -> RepoResult<bool> {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
            )
            .bind(user_id)
            .bind(author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn list_following(&self, user_id: Id) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar::<_, Id>("SELECT author_id FROM follows WHERE user_id = $1 ORDER BY author_id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)
        }
    }
}
