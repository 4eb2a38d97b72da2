mod support;

use axum::http::{StatusCode, header};

use support::{CSRF_TOKEN, SMALL_GIF, TestApp, body_text, index_cache, location};
use yatube::application::forms::INVALID_IMAGE_MESSAGE;

fn article_count(html: &str) -> usize {
    html.matches("<article>").count()
}

#[tokio::test]
async fn public_pages_render_for_anonymous_visitors() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let group = app.store.add_group("Тестовая группа", "test-slug").await;
    let post = app.store.add_post(&author, "Тестовый пост", Some(&group)).await;

    let pages = [
        "/".to_string(),
        "/group/test-slug/".to_string(),
        "/profile/auth/".to_string(),
        format!("/posts/{}/", post.id),
        "/about/author/".to_string(),
        "/about/tech/".to_string(),
        "/auth/signup/".to_string(),
        "/auth/login/".to_string(),
    ];
    for uri in pages {
        let response = app.get(&uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    }
}

#[tokio::test]
async fn unknown_pages_return_not_found_with_path() {
    let app = TestApp::new();

    for uri in ["/unexisting_page/", "/group/missing/", "/profile/nobody/", "/posts/999/", "/posts/abc/"] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {uri}");
    }

    let body = body_text(app.get("/unexisting_page/", None).await).await;
    assert!(body.contains("/unexisting_page/"));
}

#[tokio::test]
async fn first_visit_sets_csrf_cookie() {
    let app = TestApp::new();
    let response = app.get("/", None).await;

    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    assert!(cookies.iter().any(|cookie| cookie.starts_with("csrftoken=")));
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let post = app.store.add_post(&author, "Тестовый пост", None).await;

    let response = app.get("/create/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=/create/");

    let edit = format!("/posts/{}/edit/", post.id);
    let response = app.get(&edit, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/auth/login/?next={edit}"));

    let response = app.get("/follow/", None).await;
    assert_eq!(location(&response), "/auth/login/?next=/follow/");
}

#[tokio::test]
async fn authorized_user_creates_post() {
    let app = TestApp::new();
    let user = app.store.add_user("leo").await;
    let group = app.store.add_group("Тестовая группа", "test-slug").await;
    let cookie = app.session_cookie("leo").await;

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let group_id = group.id.to_string();
    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("text", "Новый пост"),
                ("group", group_id.as_str()),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/leo/");

    let posts = app.store.posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].text, "Новый пост");
    assert_eq!(posts[0].author_id, Some(user.id));
    assert_eq!(posts[0].group_id, Some(group.id));
}

#[tokio::test]
async fn created_image_is_served_from_media() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "С картинкой")],
            Some(("small.gif", SMALL_GIF)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let posts = app.store.posts().await;
    let image = posts[0].image.clone().expect("image stored");
    assert!(image.starts_with("posts/"));

    let response = app.get(&format!("/media/{image}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let detail = body_text(app.get(&format!("/posts/{}/", posts[0].id), None).await).await;
    assert!(detail.contains(&format!("/media/{image}")));
}

#[tokio::test]
async fn non_image_upload_rerenders_form() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "Текст")],
            Some(("notes.txt", &b"plain text, not a picture"[..])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(INVALID_IMAGE_MESSAGE));
    assert!(app.store.posts().await.is_empty());
}

#[tokio::test]
async fn blank_text_rerenders_form() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "   ")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.posts().await.is_empty());
}

#[tokio::test]
async fn missing_csrf_token_is_forbidden() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app
        .post_multipart("/create/", Some(&cookie), &[("text", "Без токена")], None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[
                ("csrfmiddlewaretoken", "ffffffffffffffffffffffffffffffff"),
                ("text", "Чужой токен"),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.store.posts().await.is_empty());
}

#[tokio::test]
async fn author_edits_own_post() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let post = app.store.add_post(&author, "Старый текст", None).await;
    let cookie = app.session_cookie("auth").await;

    let uri = format!("/posts/{}/edit/", post.id);
    let response = app.get(&uri, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Старый текст"));

    let response = app
        .post_multipart(
            &uri,
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "Новый текст")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let stored = app.store.post(post.id).await.expect("post kept");
    assert_eq!(stored.text, "Новый текст");
    assert_eq!(stored.pub_date, post.pub_date);
}

#[tokio::test]
async fn non_author_edit_redirects_to_detail() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    app.store.add_user("other").await;
    let post = app.store.add_post(&author, "Неизменный текст", None).await;
    let cookie = app.session_cookie("other").await;

    let uri = format!("/posts/{}/edit/", post.id);
    let response = app.get(&uri, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let response = app
        .post_multipart(
            &uri,
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "Взлом")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let stored = app.store.post(post.id).await.expect("post kept");
    assert_eq!(stored.text, "Неизменный текст");
}

#[tokio::test]
async fn comments_require_login_and_appear_on_detail() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let post = app.store.add_post(&author, "Пост", None).await;
    let uri = format!("/posts/{}/comment/", post.id);

    let anonymous = format!("csrftoken={CSRF_TOKEN}");
    let response = app
        .post_form(
            &uri,
            Some(&anonymous),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "Аноним")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/auth/login/?next="));
    assert!(app.store.comments().await.is_empty());

    let cookie = app.session_cookie("auth").await;
    let response = app
        .post_form(
            &uri,
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "Первый комментарий")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let comments = app.store.comments().await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].post_id, Some(post.id));

    let detail = body_text(app.get(&format!("/posts/{}/", post.id), None).await).await;
    assert!(detail.contains("Первый комментарий"));

    let response = app
        .post_form(
            "/posts/999/comment/",
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "В пустоту")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_comment_redirects_without_saving() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let post = app.store.add_post(&author, "Пост", None).await;
    let cookie = app.session_cookie("auth").await;

    let response = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", " ")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));
    assert!(app.store.comments().await.is_empty());
}

#[tokio::test]
async fn listings_paginate_by_ten() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let group = app.store.add_group("Тестовая группа", "test-slug").await;
    for index in 0..13 {
        app.store
            .add_post(&author, &format!("Пост номер {index}"), Some(&group))
            .await;
    }

    for base in ["/", "/group/test-slug/", "/profile/auth/"] {
        let first = body_text(app.get(base, None).await).await;
        assert_eq!(article_count(&first), 10, "first page of {base}");

        let second = body_text(app.get(&format!("{base}?page=2"), None).await).await;
        assert_eq!(article_count(&second), 3, "second page of {base}");

        let beyond = body_text(app.get(&format!("{base}?page=99"), None).await).await;
        assert_eq!(article_count(&beyond), 3, "clamped page of {base}");
    }
}

#[tokio::test]
async fn newest_post_comes_first() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    app.store.add_post(&author, "Ранний пост", None).await;
    app.store.add_post(&author, "Поздний пост", None).await;

    let body = body_text(app.get("/", None).await).await;
    let early = body.find("Ранний пост").expect("early post listed");
    let late = body.find("Поздний пост").expect("late post listed");
    assert!(late < early);
}

#[tokio::test]
async fn group_page_lists_only_its_posts() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let first = app.store.add_group("Первая", "first").await;
    app.store.add_group("Вторая", "second").await;
    app.store.add_post(&author, "Пост первой группы", Some(&first)).await;

    let body = body_text(app.get("/group/first/", None).await).await;
    assert!(body.contains("Пост первой группы"));

    let body = body_text(app.get("/group/second/", None).await).await;
    assert!(!body.contains("Пост первой группы"));
    assert_eq!(article_count(&body), 0);
}

#[tokio::test]
async fn index_serves_cached_listing_until_cleared() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    let post = app.store.add_post(&author, "Кешированный пост", None).await;

    let body = body_text(app.get("/", None).await).await;
    assert!(body.contains("Кешированный пост"));

    app.store.remove_post(post.id).await;
    let body = body_text(app.get("/", None).await).await;
    assert!(body.contains("Кешированный пост"));

    app.cache.clear().await;
    let body = body_text(app.get("/", None).await).await;
    assert!(!body.contains("Кешированный пост"));
}

#[tokio::test]
async fn index_cache_keys_on_the_resolved_page() {
    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    app.store.add_post(&author, "Единственный пост", None).await;

    let mut queries: Vec<String> = (0..50).map(|index| format!("junk{index}")).collect();
    queries.extend(
        ["", "0", "-4", "1", "abc", "99999999999999999999"]
            .into_iter()
            .map(str::to_string),
    );
    for query in queries {
        let response = app.get(&format!("/?page={query}"), None).await;
        assert_eq!(response.status(), StatusCode::OK, "page={query}");
    }

    assert_eq!(app.cache.len().await, 1);
}

#[tokio::test]
async fn writes_clear_cache_when_configured() {
    let app = TestApp::with_options(
        index_cache(std::time::Duration::from_secs(20)),
        true,
    );
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let body = body_text(app.get("/", None).await).await;
    assert_eq!(article_count(&body), 0);

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            &[("csrfmiddlewaretoken", CSRF_TOKEN), ("text", "Свежий пост")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let body = body_text(app.get("/", None).await).await;
    assert!(body.contains("Свежий пост"));
}

#[tokio::test]
async fn follow_is_idempotent_and_feeds_followed_authors() {
    let app = TestApp::new();
    let author = app.store.add_user("author").await;
    let stranger = app.store.add_user("stranger").await;
    let reader = app.store.add_user("reader").await;
    app.store.add_post(&author, "Пост автора", None).await;
    app.store.add_post(&stranger, "Пост незнакомца", None).await;
    let cookie = app.session_cookie("reader").await;

    let response = app.get("/profile/author/follow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/follow/");

    let response = app.get("/profile/author/follow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let follows = app.store.follows().await;
    assert_eq!(follows.len(), 1);
    assert_eq!(follows[0].user_id, reader.id);
    assert_eq!(follows[0].author_id, author.id);

    let feed = body_text(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(feed.matches("Пост автора").count(), 1);
    assert!(!feed.contains("Пост незнакомца"));

    let profile = body_text(app.get("/profile/author/", Some(&cookie)).await).await;
    assert!(profile.contains("/profile/author/unfollow/"));

    let response = app.get("/profile/author/unfollow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(app.store.follows().await.is_empty());

    let feed = body_text(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(article_count(&feed), 0);
}

#[tokio::test]
async fn following_yourself_changes_nothing() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app.get("/profile/leo/follow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.follows().await.is_empty());

    let response = app.get("/profile/leo/unfollow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/leo/");

    let response = app.get("/profile/nobody/follow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signup_logs_the_new_user_in() {
    let app = TestApp::new();
    let anonymous = format!("csrftoken={CSRF_TOKEN}");

    let response = app
        .post_form(
            "/auth/signup/",
            Some(&anonymous),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("first_name", "Лев"),
                ("last_name", "Толстой"),
                ("username", "leo"),
                ("email", "leo@example.com"),
                ("password1", "war-and-peace-1869"),
                ("password2", "war-and-peace-1869"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let session_set = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|cookie| cookie.starts_with("sessionid="));
    assert!(session_set);

    let user = app.store.find_user("leo").await.expect("user stored");
    assert_eq!(user.full_name(), "Лев Толстой");
}

#[tokio::test]
async fn signup_rejects_mismatched_passwords() {
    let app = TestApp::new();
    let anonymous = format!("csrftoken={CSRF_TOKEN}");

    let response = app
        .post_form(
            "/auth/signup/",
            Some(&anonymous),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("username", "leo"),
                ("password1", "war-and-peace-1869"),
                ("password2", "anna-karenina-1877"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.find_user("leo").await.is_none());
}

#[tokio::test]
async fn login_follows_safe_next_only() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let anonymous = format!("csrftoken={CSRF_TOKEN}");

    let response = app
        .post_form(
            "/auth/login/?next=/create/",
            Some(&anonymous),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("username", "leo"),
                ("password", support::PASSWORD),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/create/");

    let response = app
        .post_form(
            "/auth/login/?next=//evil.example/",
            Some(&anonymous),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("username", "leo"),
                ("password", support::PASSWORD),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app
        .post_form(
            "/auth/login/?next=/a%0D%0Ab",
            Some(&anonymous),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("username", "leo"),
                ("password", support::PASSWORD),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app
        .post_form(
            "/auth/login/",
            Some(&anonymous),
            &[
                ("csrfmiddlewaretoken", CSRF_TOKEN),
                ("username", "leo"),
                ("password", "wrong-password"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::new();
    app.store.add_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/auth/logout/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn database_health_endpoint_reports_no_content() {
    let app = TestApp::new();
    let response = app.get("/_health/db", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
