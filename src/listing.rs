//! Paginated post listings shared by the public views.

use serde::Serialize;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::models::{Group, Post, PostFilter, User};
use crate::pagination::{Page, Paginator};
use crate::repo::Repo;

/// Counts the filtered posts, settles the page number, then reads just that
/// window (newest first).
pub async fn fetch_page(repo: &dyn Repo, filter: &PostFilter, page: Option<&str>) -> Result<Page<Post>, ApiError> {
    let count = repo.count_posts(filter).await?;
    let slot = Paginator::default().locate(count, page);
    let items = if slot.window.limit == 0 {
        Vec::new()
    } else {
        repo.list_posts(filter, slot.window).await?
    };
    Ok(Page::new(items, slot))
}

pub async fn index(repo: &dyn Repo, page: Option<&str>) -> Result<Page<Post>, ApiError> {
    fetch_page(repo, &PostFilter::All, page).await
}

#[derive(Debug, Serialize)]
pub struct GroupListing {
    pub group: Group,
    pub page: Page<Post>,
}

pub async fn group_posts(repo: &dyn Repo, slug: &str, page: Option<&str>) -> Result<GroupListing, ApiError> {
    let group = repo.get_group_by_slug(slug).await?;
    let page = fetch_page(repo, &PostFilter::Group(group.id), page).await?;
    Ok(GroupListing { group, page })
}

#[derive(Debug, Serialize)]
pub struct ProfileListing {
    pub author: User,
    pub posts_count: u64,
    /// Whether the caller follows this author; always false for anonymous callers.
    pub following: bool,
    pub page: Page<Post>,
}

pub async fn profile(repo: &dyn Repo, caller: &Caller, username: &str, page: Option<&str>) -> Result<ProfileListing, ApiError> {
    let author = repo.get_user_by_username(username).await?;
    let page = fetch_page(repo, &PostFilter::Author(author.id), page).await?;
    let following = match caller.identity() {
        Some(me) => repo.is_following(me.id, author.id).await?,
        None => false,
    };
    Ok(ProfileListing { posts_count: page.count, author, following, page })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, Role};
    use crate::models::{NewGroup, NewPost, NewUser};
    use crate::repo::inmem::InMemRepo;
    use crate::repo::{FollowRepo, GroupRepo, PostRepo, UserRepo};

    async fn user(repo: &InMemRepo, name: &str) -> User {
        repo.create_user(NewUser {
            username: name.into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: String::new(),
            is_admin: false,
        })
        .await
        .unwrap()
    }

    async fn posts(repo: &InMemRepo, author: &User, group_id: Option<i64>, n: usize) {
        for i in 0..n {
            repo.create_post(NewPost { text: format!("post {i}"), author_id: author.id, group_id, image: None })
                .await
                .unwrap();
        }
    }

    #[actix_web::test]
    async fn thirteen_posts_split_ten_and_three() {
        let repo = InMemRepo::new();
        let leo = user(&repo, "leo").await;
        posts(&repo, &leo, None, 13).await;

        let first = index(&repo, None).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].text, "post 12", "newest first");
        let second = index(&repo, Some("2")).await.unwrap();
        assert_eq!(second.items.len(), 3);
        let clamped = index(&repo, Some("99")).await.unwrap();
        assert_eq!(clamped.number, 2);
        assert_eq!(clamped.items, second.items);
    }

    #[actix_web::test]
    async fn group_listing_filters_and_404s() {
        let repo = InMemRepo::new();
        let leo = user(&repo, "leo").await;
        let cats = repo
            .create_group(NewGroup { title: "Cats".into(), slug: "cats".into(), description: String::new() })
            .await
            .unwrap();
        posts(&repo, &leo, Some(cats.id), 2).await;
        posts(&repo, &leo, None, 3).await;

        let listing = group_posts(&repo, "cats", None).await.unwrap();
        assert_eq!(listing.page.count, 2);
        assert!(listing.page.items.iter().all(|p| p.group.as_deref() == Some("cats")));
        assert!(matches!(group_posts(&repo, "dogs", None).await, Err(ApiError::NotFound)));
    }

    #[actix_web::test]
    async fn profile_reports_following_for_the_caller() {
        let repo = InMemRepo::new();
        let leo = user(&repo, "leo").await;
        let ann = user(&repo, "ann").await;
        posts(&repo, &leo, None, 4).await;
        repo.create_follow(ann.id, leo.id).await.unwrap();

        let ann_caller = Caller(Some(Identity { id: ann.id, username: "ann".into(), roles: vec![Role::User] }));
        let seen_by_ann = profile(&repo, &ann_caller, "leo", None).await.unwrap();
        assert_eq!(seen_by_ann.posts_count, 4);
        assert!(seen_by_ann.following);

        let anonymous = profile(&repo, &Caller::default(), "leo", None).await.unwrap();
        assert!(!anonymous.following);
        assert!(matches!(profile(&repo, &Caller::default(), "ghost", None).await, Err(ApiError::NotFound)));
    }
}
