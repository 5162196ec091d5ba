#![cfg(feature = "inmem-store")]

use actix_web::cookie::Cookie;
use actix_web::{dev::Payload, test, web, App, FromRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use yatube::auth::{Caller, Identify, Identity, JwtKeys, Role, TOKEN_COOKIE};
use yatube::cache::PageCache;
use yatube::error::ApiError;
use yatube::models::{NewPost, PostFilter};
use yatube::repo::inmem::InMemRepo;
use yatube::routes::{config, not_found, AppState};
use yatube::storage::FsMediaStore;
use yatube::{forms, require_role};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use yatube::repo::{GroupRepo, PostRepo, UserRepo};

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

fn state(repo: Arc<InMemRepo>, media: &std::path::Path) -> AppState {
    AppState {
        repo,
        media: Arc::new(FsMediaStore::new(media)),
        cache: PageCache::new(Duration::from_secs(60)),
        keys: JwtKeys::new(SECRET),
        bootstrap_admins: vec!["root".into()],
    }
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .wrap(Identify)
                .configure(config)
                .default_service(web::route().to(not_found)),
        )
        .await
    };
}

macro_rules! signup {
    ($app:expr, $username:expr) => {{
        let username: &str = $username;
        let req = test::TestRequest::post()
            .uri("/auth/signup/")
            .set_json(json!({ "username": username, "password": "password123", "email": format!("{username}@example.com") }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201);
        let v: Value = test::read_body_json(resp).await;
        format!("Bearer {}", v["token"].as_str().unwrap())
    }};
}

#[actix_web::test]
async fn jwt_roundtrip_and_tampering() {
    let keys = JwtKeys::new(SECRET);
    let user = yatube::models::User {
        id: 42,
        username: "tester".into(),
        email: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        is_admin: false,
        date_joined: chrono::Utc::now(),
    };
    let token = keys.issue(&user).unwrap();
    let claims = keys.decode(&token).unwrap();
    assert_eq!(claims.sub, "42");
    assert_eq!(claims.username, "tester");
    assert_eq!(claims.roles, vec![Role::User]);

    assert!(JwtKeys::new("another-secret-that-is-32-bytes-long").decode(&token).is_err());
    assert!(keys.decode("notatoken").is_err());
}

#[actix_web::test]
async fn caller_extractor_defaults_to_anonymous() {
    let req = test::TestRequest::default().to_http_request();
    let mut pl = Payload::None;
    let caller = Caller::from_request(&req, &mut pl).await.unwrap();
    assert!(caller.identity().is_none());
}

#[actix_web::test]
async fn require_role_macro_enforces_roles() {
    fn guarded(identity: &Identity) -> Result<(), ApiError> {
        require_role!(identity, Role::Admin);
        Ok(())
    }
    let admin = Identity { id: 1, username: "root".into(), roles: vec![Role::User, Role::Admin] };
    let user = Identity { id: 2, username: "ann".into(), roles: vec![Role::User] };
    assert!(guarded(&admin).is_ok());
    assert!(matches!(guarded(&user), Err(ApiError::Forbidden)));
}

#[actix_web::test]
async fn signup_login_and_password_change() {
    let media = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemRepo::new());
    let app = init_app!(state(repo.clone(), media.path()));

    let ann = signup!(app, "ann");
    let v: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/auth/me/").insert_header(("Authorization", ann.clone())).to_request(),
    )
    .await;
    assert_eq!(v["username"], "ann");
    assert_eq!(v["is_admin"], false);
    assert!(v.get("password_hash").is_none());

    // same username again
    let req = test::TestRequest::post()
        .uri("/auth/signup/")
        .set_json(json!({ "username": "ann", "password": "password123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["errors"]["username"][0], forms::USERNAME_TAKEN);

    // login form echoes next
    let v: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/auth/login/?next=/create/").to_request()).await;
    assert_eq!(v["form"]["next"], "/create/");

    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_json(json!({ "username": "ann", "password": "wrong-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["errors"]["__all__"][0], forms::BAD_CREDENTIALS);

    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_json(json!({ "username": "ann", "password": "password123", "next": "/create/" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let set_cookie = resp.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
    assert!(set_cookie.starts_with(&format!("{TOKEN_COOKIE}=")));
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["next"], "/create/");
    let token = v["token"].as_str().unwrap().to_string();

    // the cookie alone authenticates
    let req = test::TestRequest::get().uri("/create/").cookie(Cookie::new(TOKEN_COOKIE, token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/auth/password_change/")
        .insert_header(("Authorization", ann.clone()))
        .set_json(json!({ "old_password": "nope-nope", "new_password": "brand-new-pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/auth/password_change/")
        .insert_header(("Authorization", ann))
        .set_json(json!({ "old_password": "password123", "new_password": "brand-new-pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_json(json!({ "username": "ann", "password": "brand-new-pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn deleted_user_token_is_anonymous() {
    let media = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemRepo::new());
    let app = init_app!(state(repo.clone(), media.path()));

    let ann = signup!(app, "ann");
    let id = repo.get_user_by_username("ann").await.unwrap().id;
    repo.delete_user(id).await.unwrap();

    let req = test::TestRequest::get().uri("/auth/me/").insert_header(("Authorization", ann)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get("location").unwrap(), "/auth/login/?next=/auth/me/");
}

#[actix_web::test]
async fn admin_endpoints_require_the_admin_role() {
    let media = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemRepo::new());
    let app = init_app!(state(repo.clone(), media.path()));

    let root = signup!(app, "root");
    let ann = signup!(app, "ann");
    let group = json!({ "title": "Cats", "slug": "cats", "description": "Meow" });

    let req = test::TestRequest::post()
        .uri("/admin/groups/")
        .insert_header(("Authorization", ann.clone()))
        .set_json(&group)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri("/admin/groups/")
        .insert_header(("Authorization", root.clone()))
        .set_json(&group)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let group_id = created["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/admin/groups/")
        .insert_header(("Authorization", root.clone()))
        .set_json(&group)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let ann_id = repo.get_user_by_username("ann").await.unwrap().id;
    let p = repo
        .create_post(NewPost { text: "tagged".into(), author_id: ann_id, group_id: Some(group_id), image: None })
        .await
        .unwrap();

    let req = test::TestRequest::delete()
        .uri("/admin/groups/cats/")
        .insert_header(("Authorization", root.clone()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    assert!(repo.list_groups().await.unwrap().is_empty());
    assert_eq!(repo.get_post(p.id).await.unwrap().group_id, None);

    let req = test::TestRequest::delete()
        .uri(&format!("/admin/posts/{}/", p.id))
        .insert_header(("Authorization", ann))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::delete()
        .uri(&format!("/admin/posts/{}/", p.id))
        .insert_header(("Authorization", root))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    assert_eq!(repo.count_posts(&PostFilter::All).await.unwrap(), 0);
}

#[actix_web::test]
async fn logout_removes_the_session_cookie() {
    let media = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemRepo::new());
    let app = init_app!(state(repo.clone(), media.path()));
    signup!(app, "ann");

    let req = test::TestRequest::post()
        .uri("/auth/login/")
        .set_json(json!({ "username": "ann", "password": "password123" }))
        .to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    let session = Cookie::new(TOKEN_COOKIE, v["token"].as_str().unwrap().to_string());

    let req = test::TestRequest::get().uri("/auth/me/").cookie(session.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post().uri("/auth/logout/").cookie(session).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    let removal = resp.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
    assert!(removal.starts_with(&format!("{TOKEN_COOKIE}=;")), "{removal}");
    assert!(removal.contains("Max-Age=0"), "{removal}");

    // what the browser keeps after the removal cookie
    let cleared = Cookie::parse(removal).unwrap();
    assert_eq!(cleared.value(), "");
    let req = test::TestRequest::get().uri("/auth/me/").cookie(Cookie::new(TOKEN_COOKIE, "")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get("location").unwrap(), "/auth/login/?next=/auth/me/");
}
