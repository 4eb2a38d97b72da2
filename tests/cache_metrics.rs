mod support;

use std::collections::HashSet;

use axum::http::StatusCode;
use metrics_util::debugging::DebuggingRecorder;

use support::TestApp;

#[tokio::test]
async fn page_cache_and_sessions_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let app = TestApp::new();
    let author = app.store.add_user("auth").await;
    app.store.add_post(&author, "Пост для метрик", None).await;

    // miss, then hit
    for _ in 0..2 {
        let response = app.get("/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    app.cache.clear().await;
    app.session_cookie("auth").await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "yatube_page_cache_miss_total",
        "yatube_page_cache_hit_total",
        "yatube_page_cache_clear_total",
        "yatube_sessions_issued_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
