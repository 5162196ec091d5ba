use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Group {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post as listings see it: `author` and `group` are resolved from the
/// owning rows at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub text: String,
    pub created: DateTime<Utc>,
    pub author_id: Id,
    pub author: String, // username
    pub group_id: Option<Id>,
    pub group: Option<String>, // group slug
    pub image: Option<String>, // media path, e.g. "posts/cat.gif"
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub text: String,
    pub author_id: Id,
    pub group_id: Option<Id>,
    pub image: Option<String>,
}

/// Editable fields of a post. There is no author field: ownership is fixed at
/// creation.
#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub text: String,
    pub group_id: Option<Id>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub text: String,
    pub created: DateTime<Utc>,
    pub author_id: Id,
    pub author: String, // username
    pub post_id: Id,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub text: String,
    pub author_id: Id,
    pub post_id: Id,
}

/// Directed edge: `user_id` receives `author_id`'s posts in their feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Follow {
    pub id: Id,
    pub user_id: Id,
    pub author_id: Id,
}

/// Which posts a listing selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(Id),
    Author(Id),
    Authors(Vec<Id>),
}

impl PostFilter {
    pub fn matches(&self, post_author: Id, post_group: Option<Id>) -> bool {
        match self {
            PostFilter::All => true,
            PostFilter::Group(g) => post_group == Some(*g),
            PostFilter::Author(a) => post_author == *a,
            PostFilter::Authors(ids) => ids.contains(&post_author),
        }
    }
}
