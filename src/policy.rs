//! Authorization predicates. Handlers evaluate them before doing any work; a
//! failed predicate becomes the redirect the caller should follow.

use actix_web::HttpRequest;

use crate::auth::{Caller, Identity};
use crate::error::ApiError;
use crate::models::Post;

/// Path plus query of the request, used as the post-login return target.
pub fn full_path(req: &HttpRequest) -> String {
    match req.query_string() {
        "" => req.path().to_string(),
        q => format!("{}?{}", req.path(), q),
    }
}

pub fn post_url(id: crate::models::Id) -> String {
    format!("/posts/{id}/")
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{username}/")
}

/// Authentication gate.
pub fn login_required<'a>(caller: &'a Caller, req: &HttpRequest) -> Result<&'a Identity, ApiError> {
    caller.identity().ok_or_else(|| ApiError::Unauthenticated { next: full_path(req) })
}

/// Ownership gate: anyone but the author is sent to the read-only detail page.
pub fn author_only(identity: &Identity, post: &Post) -> Result<(), ApiError> {
    if identity.id == post.author_id {
        Ok(())
    } else {
        Err(ApiError::Unauthorized { location: post_url(post.id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use actix_web::test::TestRequest;

    fn identity(id: i64) -> Identity {
        Identity { id, username: format!("u{id}"), roles: vec![Role::User] }
    }

    fn post_by(author_id: i64) -> Post {
        Post {
            id: 9,
            text: "t".into(),
            created: chrono::Utc::now(),
            author_id,
            author: format!("u{author_id}"),
            group_id: None,
            group: None,
            image: None,
        }
    }

    #[test]
    fn anonymous_is_sent_to_login_with_full_path() {
        let req = TestRequest::get().uri("/follow/?page=2").to_http_request();
        match login_required(&Caller::default(), &req) {
            Err(ApiError::Unauthenticated { next }) => assert_eq!(next, "/follow/?page=2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn authenticated_caller_passes() {
        let req = TestRequest::get().uri("/create/").to_http_request();
        let caller = Caller(Some(identity(1)));
        assert_eq!(login_required(&caller, &req).unwrap().id, 1);
    }

    #[test]
    fn only_the_author_may_edit() {
        assert!(author_only(&identity(4), &post_by(4)).is_ok());
        match author_only(&identity(5), &post_by(4)) {
            Err(ApiError::Unauthorized { location }) => assert_eq!(location, "/posts/9/"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
