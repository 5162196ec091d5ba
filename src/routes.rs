use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, verify_password, Caller, JwtKeys, Role, TOKEN_COOKIE};
use crate::cache::PageCache;
use crate::error::ApiError;
use crate::forms::{
    CommentForm, FieldErrors, ImageUpload, LoginForm, PasswordChangeForm, PostForm, SignupForm, Upload,
    BAD_CREDENTIALS, IMAGE_SIZE_LIMIT, INVALID_TEXT, TEXT_FIELD_LIMIT, TEXT_TOO_LONG, UNREADABLE_FORM,
    USERNAME_TAKEN, WRONG_OLD_PASSWORD,
};
use crate::models::*;
use crate::policy::{author_only, login_required, post_url, profile_url};
use crate::repo::{Repo, RepoError};
use crate::storage::{media_url, store_upload, MediaStore, MediaStoreError};
use crate::{feed, listing};

const JSON: &str = "application/json";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/group/{slug}/").route(web::get().to(group_posts)))
        .service(web::resource("/profile/{username}/").route(web::get().to(profile)))
        .service(web::resource("/profile/{username}/follow/").route(web::post().to(profile_follow)))
        .service(web::resource("/profile/{username}/unfollow/").route(web::post().to(profile_unfollow)))
        .service(web::resource("/follow/").route(web::get().to(follow_index)))
        .service(
            web::resource("/create/")
                .route(web::get().to(post_create_form))
                .route(web::post().to(post_create)),
        )
        .service(web::resource("/posts/{id}/").route(web::get().to(post_detail)))
        .service(
            web::resource("/posts/{id}/edit/")
                .route(web::get().to(post_edit_form))
                .route(web::post().to(post_edit)),
        )
        .service(web::resource("/posts/{id}/comment/").route(web::post().to(add_comment)))
        // public fetch route so `image_url` values resolve directly
        .service(web::resource("/media/{path:.*}").route(web::get().to(get_media)));

    cfg.service(
        web::scope("/auth")
            .service(web::resource("/signup/").route(web::post().to(signup)))
            .service(
                web::resource("/login/")
                    .route(web::get().to(login_form))
                    .route(web::post().to(login)),
            )
            .service(web::resource("/logout/").route(web::post().to(logout)))
            .service(web::resource("/me/").route(web::get().to(auth_me)))
            .service(web::resource("/password_change/").route(web::post().to(password_change))),
    );

    // Admin endpoints
    cfg.service(
        web::scope("/admin")
            .service(web::resource("/groups/").route(web::post().to(admin_create_group)))
            .service(web::resource("/groups/{slug}/").route(web::delete().to(admin_delete_group)))
            .service(web::resource("/posts/{id}/").route(web::delete().to(admin_delete_post)))
            .service(web::resource("/cache/").route(web::delete().to(admin_clear_cache))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media: Arc<dyn MediaStore>,
    pub cache: PageCache,
    pub keys: JwtKeys,
    /// Usernames that receive the admin role when they sign up.
    pub bootstrap_admins: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

/// A post as rendered: the stored fields plus a URL for its image.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub image_url: Option<String>,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        let image_url = post.image.as_deref().map(media_url);
        Self { post, image_url }
    }
}

type PostPage = crate::pagination::Page<PostView>;

#[derive(Serialize)]
struct PageView {
    page: PostPage,
}

#[derive(Serialize)]
struct GroupView {
    group: Group,
    page: PostPage,
}

#[derive(Serialize)]
struct ProfileView {
    author: User,
    posts_count: u64,
    following: bool,
    page: PostPage,
}

#[derive(Serialize)]
struct DetailView {
    post: PostView,
    posts_count: u64,
    comments: Vec<Comment>,
    is_author: bool,
    form: CommentForm,
}

#[derive(Serialize)]
struct PostFormView {
    form: PostForm,
    groups: Vec<Group>,
    is_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    post: Option<PostView>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
    /// Where the client should go next.
    pub next: String,
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().insert_header((header::LOCATION, location)).finish()
}

fn render(view: &impl Serialize) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(view).map_err(|e| {
        log::error!("render failed: {e}");
        ApiError::Internal
    })
}

/// Body extractors are taken as `Result` so the login gate runs first; a body
/// that still fails to parse becomes a non-field form error.
fn unreadable(form: impl Serialize, e: impl std::fmt::Display) -> ApiError {
    log::debug!("unreadable form body: {e}");
    ApiError::validation(form, FieldErrors::single(FieldErrors::NON_FIELD, UNREADABLE_FORM))
}

/// Default service for unmatched routes.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "not found", "path": req.path() }))
}

#[utoipa::path(
    get,
    path = "/",
    params(("page" = Option<String>, Query, description = "1-based page number")),
    responses((status = 200, description = "Newest posts, ten per page; served from the page cache"))
)]
pub async fn index(req: HttpRequest, data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let key = index_cache_key(req.path(), query.page.as_deref());
    if let Some(hit) = data.cache.get(&key) {
        return Ok(HttpResponse::Ok().content_type(hit.content_type).body(hit.body));
    }
    let page = listing::index(data.repo.as_ref(), query.page.as_deref()).await?;
    let body = render(&PageView { page: page.map(PostView::from) })?;
    data.cache.put(key, body.clone(), JSON);
    Ok(HttpResponse::Ok().content_type(JSON).body(body))
}

/// Only a numeric `page` tells index pages apart; any other query shares the
/// entry of the page it resolves to.
fn index_cache_key(path: &str, page: Option<&str>) -> String {
    match page.and_then(|p| p.trim().parse::<u64>().ok()) {
        Some(n) => PageCache::key(path, &format!("page={n}")),
        None => PageCache::key(path, ""),
    }
}

#[utoipa::path(
    get,
    path = "/group/{slug}/",
    params(("slug" = String, Path, description = "Group slug"), ("page" = Option<String>, Query, description = "1-based page number")),
    responses(
        (status = 200, description = "Posts of the group"),
        (status = 404, description = "Unknown group")
    )
)]
pub async fn group_posts(data: web::Data<AppState>, path: web::Path<String>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let listing = listing::group_posts(data.repo.as_ref(), &path, query.page.as_deref()).await?;
    Ok(HttpResponse::Ok().json(GroupView { group: listing.group, page: listing.page.map(PostView::from) }))
}

#[utoipa::path(
    get,
    path = "/profile/{username}/",
    params(("username" = String, Path, description = "Author username"), ("page" = Option<String>, Query, description = "1-based page number")),
    responses(
        (status = 200, description = "Author, post count, follow status and posts"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn profile(caller: Caller, data: web::Data<AppState>, path: web::Path<String>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let p = listing::profile(data.repo.as_ref(), &caller, &path, query.page.as_deref()).await?;
    Ok(HttpResponse::Ok().json(ProfileView {
        author: p.author,
        posts_count: p.posts_count,
        following: p.following,
        page: p.page.map(PostView::from),
    }))
}

#[utoipa::path(
    get,
    path = "/posts/{id}/",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post, author's post count, comments and an empty comment form"),
        (status = 404, description = "Unknown post")
    )
)]
pub async fn post_detail(caller: Caller, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let posts_count = data.repo.count_posts(&PostFilter::Author(post.author_id)).await?;
    let comments = data.repo.list_comments(post.id).await?;
    let is_author = caller.identity().is_some_and(|me| me.id == post.author_id);
    Ok(HttpResponse::Ok().json(DetailView {
        post: post.into(),
        posts_count,
        comments,
        is_author,
        form: CommentForm::default(),
    }))
}

#[utoipa::path(
    get,
    path = "/create/",
    responses(
        (status = 200, description = "Blank post form with the selectable groups"),
        (status = 302, description = "Not logged in; redirected to login")
    )
)]
pub async fn post_create_form(req: HttpRequest, caller: Caller, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    login_required(&caller, &req)?;
    let groups = data.repo.list_groups().await?;
    Ok(HttpResponse::Ok().json(PostFormView { form: PostForm::default(), groups, is_edit: false, post: None }))
}

#[utoipa::path(
    post,
    path = "/create/",
    responses(
        (status = 302, description = "Created; redirected to the author's profile (or to login when anonymous)"),
        (status = 400, description = "Form errors")
    )
)]
pub async fn post_create(req: HttpRequest, caller: Caller, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let form = read_post_form(payload).await?;
    let groups = data.repo.list_groups().await?;
    let clean = form.clean(&groups).map_err(|errors| ApiError::validation(&form, errors))?;
    let image = match &clean.image {
        Some(upload) => Some(save_image(data.media.as_ref(), upload).await?),
        None => None,
    };
    let post = insert_post(&data, NewPost { text: clean.text, author_id: me.id, group_id: clean.group_id, image }).await?;
    log::info!("post {} created by {}", post.id, me.username);
    Ok(redirect(&profile_url(&me.username)))
}

#[utoipa::path(
    get,
    path = "/posts/{id}/edit/",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Form prefilled with the post"),
        (status = 302, description = "Not logged in, or not the author"),
        (status = 404, description = "Unknown post")
    )
)]
pub async fn post_edit_form(req: HttpRequest, caller: Caller, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let post = data.repo.get_post(path.into_inner()).await?;
    author_only(me, &post)?;
    let groups = data.repo.list_groups().await?;
    let form = PostForm {
        text: post.text.clone(),
        group: post.group_id.map(|g| g.to_string()).unwrap_or_default(),
        image: None,
    };
    Ok(HttpResponse::Ok().json(PostFormView { form, groups, is_edit: true, post: Some(post.into()) }))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/edit/",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 302, description = "Saved (or refused) and redirected to the post"),
        (status = 400, description = "Form errors"),
        (status = 404, description = "Unknown post")
    )
)]
pub async fn post_edit(
    req: HttpRequest,
    caller: Caller,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let post = data.repo.get_post(path.into_inner()).await?;
    author_only(me, &post)?;
    let form = read_post_form(payload).await?;
    let groups = data.repo.list_groups().await?;
    let clean = form.clean(&groups).map_err(|errors| ApiError::validation(&form, errors))?;
    let saved = match &clean.image {
        Some(upload) => Some(save_image(data.media.as_ref(), upload).await?),
        None => None,
    };
    // no new file keeps the current image
    let image = saved.clone().or_else(|| post.image.clone());
    if let Err(e) = data
        .repo
        .update_post(post.id, UpdatePost { text: clean.text, group_id: clean.group_id, image })
        .await
    {
        if let Some(path) = &saved {
            discard_media(data.media.as_ref(), path).await;
        }
        return Err(e.into());
    }
    log::info!("post {} edited by {}", post.id, me.username);
    Ok(redirect(&post_url(post.id)))
}

#[utoipa::path(
    post,
    path = "/posts/{id}/comment/",
    params(("id" = Id, Path, description = "Post id")),
    request_body(content = CommentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Comment saved; redirected to the post (or to login when anonymous)"),
        (status = 400, description = "Form errors"),
        (status = 404, description = "Unknown post")
    )
)]
pub async fn add_comment(
    req: HttpRequest,
    caller: Caller,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: Result<web::Form<CommentForm>, actix_web::Error>,
) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let post = data.repo.get_post(path.into_inner()).await?;
    let form = form.map_err(|e| unreadable(CommentForm::default(), e))?.into_inner();
    let text = form.clean().map_err(|errors| ApiError::validation(&form, errors))?;
    data.repo.create_comment(NewComment { text, author_id: me.id, post_id: post.id }).await?;
    Ok(redirect(&post_url(post.id)))
}

#[utoipa::path(
    get,
    path = "/follow/",
    params(("page" = Option<String>, Query, description = "1-based page number")),
    responses(
        (status = 200, description = "Posts by followed authors"),
        (status = 302, description = "Not logged in; redirected to login")
    )
)]
pub async fn follow_index(req: HttpRequest, caller: Caller, data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let page = feed::follow_feed(data.repo.as_ref(), me.id, query.page.as_deref()).await?;
    Ok(HttpResponse::Ok().json(PageView { page: page.map(PostView::from) }))
}

#[utoipa::path(
    post,
    path = "/profile/{username}/follow/",
    params(("username" = String, Path, description = "Author to follow")),
    responses(
        (status = 302, description = "Redirected to the profile (or to login when anonymous)"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn profile_follow(req: HttpRequest, caller: Caller, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let author = data.repo.get_user_by_username(&path).await?;
    feed::follow(data.repo.as_ref(), me.id, &author).await?;
    Ok(redirect(&profile_url(&author.username)))
}

#[utoipa::path(
    post,
    path = "/profile/{username}/unfollow/",
    params(("username" = String, Path, description = "Author to unfollow")),
    responses(
        (status = 302, description = "Redirected to the profile (or to login when anonymous)"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn profile_unfollow(req: HttpRequest, caller: Caller, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let author = data.repo.get_user_by_username(&path).await?;
    feed::unfollow(data.repo.as_ref(), me.id, &author).await?;
    Ok(redirect(&profile_url(&author.username)))
}

pub async fn get_media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    match data.media.load(&path).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header((header::CONTENT_TYPE, mime)).body(bytes)),
        Err(MediaStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("media load error for '{}': {e}", path.as_str());
            Err(ApiError::Internal)
        }
    }
}

// ---------------- Post form plumbing ----------------

/// Collects the multipart post form. Files are buffered up to one byte past
/// the size limit so validation can still report them as too large; text
/// fields over their own limit are refused outright.
async fn read_post_form(mut payload: Multipart) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();
    let mut errors = FieldErrors::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| unreadable(PostForm::default(), e))? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let filename = field.content_disposition().get_filename().map(str::to_string);
        let limit = if name == "image" { IMAGE_SIZE_LIMIT + 1 } else { TEXT_FIELD_LIMIT };
        let mut bytes: Vec<u8> = Vec::new();
        let mut overflow = false;
        while let Some(chunk) = field.try_next().await.map_err(|e| unreadable(PostForm::default(), e))? {
            let room = limit.saturating_sub(bytes.len());
            overflow |= chunk.len() > room;
            bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
        let slot = match name.as_str() {
            "text" => &mut form.text,
            "group" => &mut form.group,
            "image" => {
                form.image = Some(Upload { filename: filename.unwrap_or_default(), bytes });
                continue;
            }
            _ => continue,
        };
        if overflow {
            errors.add(&name, TEXT_TOO_LONG);
            continue;
        }
        match String::from_utf8(bytes) {
            Ok(text) => *slot = text,
            Err(_) => errors.add(&name, INVALID_TEXT),
        }
    }
    if errors.is_empty() { Ok(form) } else { Err(ApiError::validation(&form, errors)) }
}

/// Stores the post; an image saved for it is removed again if the insert fails.
async fn insert_post(data: &AppState, new: NewPost) -> Result<Post, ApiError> {
    let image = new.image.clone();
    match data.repo.create_post(new).await {
        Ok(post) => Ok(post),
        Err(e) => {
            if let Some(path) = &image {
                discard_media(data.media.as_ref(), path).await;
            }
            Err(e.into())
        }
    }
}

async fn discard_media(media: &dyn MediaStore, path: &str) {
    if let Err(e) = media.delete(path).await {
        log::warn!("could not remove orphaned media '{path}': {e}");
    }
}

async fn save_image(media: &dyn MediaStore, upload: &ImageUpload) -> Result<String, ApiError> {
    store_upload(media, upload).await.map_err(|e| {
        log::error!("media save error: {e}");
        ApiError::Internal
    })
}

// ---------------- Auth ----------------

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Only same-site paths are honoured as a post-login target.
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/".to_string(),
    }
}

fn token_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

fn issue_token(keys: &JwtKeys, user: &User) -> Result<String, ApiError> {
    keys.issue(user).map_err(|e| {
        log::error!("jwt encode error: {e}");
        ApiError::Internal
    })
}

#[utoipa::path(
    post,
    path = "/auth/signup/",
    request_body = SignupForm,
    responses(
        (status = 201, description = "Account created", body = TokenResponse),
        (status = 400, description = "Form errors")
    )
)]
pub async fn signup(data: web::Data<AppState>, payload: web::Json<SignupForm>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.clean().map_err(|errors| ApiError::validation(&form, errors))?;
    let password_hash = hash_password(&form.password).map_err(|e| {
        log::error!("password hash error: {e}");
        ApiError::Internal
    })?;
    let username = form.username.trim().to_string();
    let new = NewUser {
        is_admin: data.bootstrap_admins.iter().any(|a| *a == username),
        username,
        email: form.email.trim().to_string(),
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        password_hash,
    };
    let user = match data.repo.create_user(new).await {
        Ok(u) => u,
        Err(RepoError::Conflict) => {
            return Err(ApiError::validation(&form, FieldErrors::single("username", USERNAME_TAKEN)))
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("user {} signed up", user.username);
    let token = issue_token(&data.keys, &user)?;
    Ok(HttpResponse::Created()
        .cookie(token_cookie(&token))
        .json(TokenResponse { token, user, next: "/".into() }))
}

#[utoipa::path(
    get,
    path = "/auth/login/",
    params(("next" = Option<String>, Query, description = "Path to return to after login")),
    responses((status = 200, description = "Login form descriptor echoing `next`"))
)]
pub async fn login_form(query: web::Query<NextQuery>) -> HttpResponse {
    let form = LoginForm { next: query.into_inner().next, ..LoginForm::default() };
    HttpResponse::Ok().json(serde_json::json!({ "form": form }))
}

#[utoipa::path(
    post,
    path = "/auth/login/",
    request_body = LoginForm,
    responses(
        (status = 200, description = "Token issued and set as a cookie", body = TokenResponse),
        (status = 400, description = "Bad credentials")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginForm>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    let rejected = || ApiError::validation(&form, FieldErrors::single(FieldErrors::NON_FIELD, BAD_CREDENTIALS));
    let user = match data.repo.get_user_by_username(form.username.trim()).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Err(rejected()),
        Err(e) => return Err(e.into()),
    };
    let hash = data.repo.get_password_hash(user.id).await?;
    if !verify_password(&form.password, &hash) {
        log::debug!("failed login for {}", user.username);
        return Err(rejected());
    }
    let token = issue_token(&data.keys, &user)?;
    let next = safe_next(form.next.as_deref());
    Ok(HttpResponse::Ok().cookie(token_cookie(&token)).json(TokenResponse { token, user, next }))
}

#[utoipa::path(
    post,
    path = "/auth/logout/",
    responses((status = 204, description = "Session cookie removed"))
)]
pub async fn logout(caller: Caller) -> HttpResponse {
    if let Some(me) = caller.identity() {
        log::info!("user {} logged out", me.username);
    }
    let mut cookie = token_cookie("");
    cookie.make_removal();
    HttpResponse::NoContent().cookie(cookie).finish()
}

#[utoipa::path(
    get,
    path = "/auth/me/",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 302, description = "Not logged in; redirected to login")
    )
)]
pub async fn auth_me(req: HttpRequest, caller: Caller, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let user = data.repo.get_user(me.id).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/auth/password_change/",
    request_body = PasswordChangeForm,
    responses(
        (status = 204, description = "Password changed"),
        (status = 302, description = "Not logged in; redirected to login"),
        (status = 400, description = "Form errors")
    )
)]
pub async fn password_change(
    req: HttpRequest,
    caller: Caller,
    data: web::Data<AppState>,
    payload: Result<web::Json<PasswordChangeForm>, actix_web::Error>,
) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    let form = payload.map_err(|e| unreadable(PasswordChangeForm::default(), e))?.into_inner();
    form.clean().map_err(|errors| ApiError::validation(&form, errors))?;
    let current = data.repo.get_password_hash(me.id).await?;
    if !verify_password(&form.old_password, &current) {
        return Err(ApiError::validation(&form, FieldErrors::single("old_password", WRONG_OLD_PASSWORD)));
    }
    let hash = hash_password(&form.new_password).map_err(|e| {
        log::error!("password hash error: {e}");
        ApiError::Internal
    })?;
    data.repo.set_password_hash(me.id, hash).await?;
    log::info!("user {} changed password", me.username);
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Admin ----------------

#[utoipa::path(
    post,
    path = "/admin/groups/",
    request_body = NewGroup,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Slug already taken")
    )
)]
pub async fn admin_create_group(
    req: HttpRequest,
    caller: Caller,
    data: web::Data<AppState>,
    payload: Result<web::Json<NewGroup>, actix_web::Error>,
) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    crate::require_role!(me, Role::Admin);
    let new = payload.map_err(|e| unreadable(serde_json::Value::Null, e))?.into_inner();
    let group = data.repo.create_group(new).await?;
    log::info!("group '{}' created by {}", group.slug, me.username);
    Ok(HttpResponse::Created().json(group))
}

#[utoipa::path(
    delete,
    path = "/admin/groups/{slug}/",
    params(("slug" = String, Path, description = "Group slug")),
    responses(
        (status = 204, description = "Deleted; its posts remain without a group"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown group")
    )
)]
pub async fn admin_delete_group(req: HttpRequest, caller: Caller, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    crate::require_role!(me, Role::Admin);
    let group = data.repo.get_group_by_slug(&path).await?;
    data.repo.delete_group(group.id).await?;
    log::info!("group '{}' deleted by {}", group.slug, me.username);
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/admin/posts/{id}/",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Deleted together with its comments"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown post")
    )
)]
pub async fn admin_delete_post(req: HttpRequest, caller: Caller, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    crate::require_role!(me, Role::Admin);
    let post = data.repo.get_post(path.into_inner()).await?;
    data.repo.delete_post(post.id).await?;
    if let Some(image) = &post.image {
        if let Err(e) = data.media.delete(image).await {
            log::warn!("could not remove media '{image}' of post {}: {e}", post.id);
        }
    }
    log::info!("post {} deleted by {}", post.id, me.username);
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/admin/cache/",
    responses(
        (status = 204, description = "Page cache cleared"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_clear_cache(req: HttpRequest, caller: Caller, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let me = login_required(&caller, &req)?;
    crate::require_role!(me, Role::Admin);
    data.cache.clear();
    log::info!("page cache cleared by {}", me.username);
    Ok(HttpResponse::NoContent().finish())
}
