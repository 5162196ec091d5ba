use crate::forms::{CommentForm, LoginForm, PasswordChangeForm, SignupForm};
use crate::models::{Comment, Follow, Group, NewGroup, Post, User};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::index,
        crate::routes::group_posts,
        crate::routes::profile,
        crate::routes::post_detail,
        crate::routes::post_create_form,
        crate::routes::post_create,
        crate::routes::post_edit_form,
        crate::routes::post_edit,
        crate::routes::add_comment,
        crate::routes::follow_index,
        crate::routes::profile_follow,
        crate::routes::profile_unfollow,
        crate::routes::signup,
        crate::routes::login_form,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::auth_me,
        crate::routes::password_change,
        crate::routes::admin_create_group,
        crate::routes::admin_delete_group,
        crate::routes::admin_delete_post,
        crate::routes::admin_clear_cache,
    ),
    components(schemas(
        User, Group, NewGroup, Post, Comment, Follow,
        CommentForm, SignupForm, LoginForm, PasswordChangeForm,
        crate::routes::TokenResponse,
    )),
    tags(
        (name = "posts", description = "Listings, post pages and post forms"),
        (name = "follow", description = "Subscriptions and the personal feed"),
        (name = "auth", description = "Accounts and tokens"),
        (name = "admin", description = "Administration"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/", "/group/{slug}/", "/posts/{id}/edit/", "/follow/", "/auth/login/", "/auth/logout/"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
