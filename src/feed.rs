//! Subscriptions and the personal feed built from them.

use crate::error::ApiError;
use crate::models::{Id, Post, PostFilter, User};
use crate::pagination::Page;
use crate::repo::{Repo, RepoError};

/// Posts by every author `user_id` follows, newest first. Nobody followed
/// means an empty first page.
pub async fn follow_feed(repo: &dyn Repo, user_id: Id, page: Option<&str>) -> Result<Page<Post>, ApiError> {
    let authors = repo.list_following(user_id).await?;
    if authors.is_empty() {
        return Ok(Page::empty());
    }
    crate::listing::fetch_page(repo, &PostFilter::Authors(authors), page).await
}

/// Subscribes `user_id` to `author`. Following yourself or someone already
/// followed changes nothing.
pub async fn follow(repo: &dyn Repo, user_id: Id, author: &User) -> Result<bool, ApiError> {
    if user_id == author.id {
        return Ok(false);
    }
    match repo.create_follow(user_id, author.id).await {
        Ok(created) => {
            if created {
                log::info!("user {user_id} now follows {}", author.username);
            }
            Ok(created)
        }
        // lost a race with a concurrent follow of the same pair
        Err(RepoError::Conflict) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Removes the subscription if there is one.
pub async fn unfollow(repo: &dyn Repo, user_id: Id, author: &User) -> Result<bool, ApiError> {
    let removed = repo.delete_follow(user_id, author.id).await?;
    if removed {
        log::info!("user {user_id} unfollowed {}", author.username);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPost, NewUser};
    use crate::repo::inmem::InMemRepo;
    use crate::repo::{FollowRepo, PostRepo, UserRepo};

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

    async fn post(repo: &InMemRepo, author: &User, text: &str) -> Post {
        repo.create_post(NewPost { text: text.into(), author_id: author.id, group_id: None, image: None })
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn feed_holds_exactly_followed_authors() {
        let repo = InMemRepo::new();
        let (ann, leo, bob) = (user(&repo, "ann").await, user(&repo, "leo").await, user(&repo, "bob").await);
        post(&repo, &leo, "from leo").await;
        post(&repo, &bob, "from bob").await;
        post(&repo, &ann, "from ann").await;

        assert_eq!(follow_feed(&repo, ann.id, None).await.unwrap().count, 0);
        assert!(follow(&repo, ann.id, &leo).await.unwrap());
        let feed = follow_feed(&repo, ann.id, None).await.unwrap();
        let texts: Vec<_> = feed.items.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["from leo"]);
    }

    #[actix_web::test]
    async fn follow_is_idempotent_and_skips_self() {
        let repo = InMemRepo::new();
        let (ann, leo) = (user(&repo, "ann").await, user(&repo, "leo").await);
        assert!(follow(&repo, ann.id, &leo).await.unwrap());
        assert!(!follow(&repo, ann.id, &leo).await.unwrap());
        assert_eq!(repo.list_following(ann.id).await.unwrap(), vec![leo.id]);

        assert!(!follow(&repo, ann.id, &ann).await.unwrap());
        assert!(!repo.is_following(ann.id, ann.id).await.unwrap());

        assert!(unfollow(&repo, ann.id, &leo).await.unwrap());
        assert!(!unfollow(&repo, ann.id, &leo).await.unwrap());
        assert!(follow_feed(&repo, ann.id, None).await.unwrap().items.is_empty());
    }
}
