mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::{json_body, worker_request, TestApp, ADMIN_KEY};

fn form_body(fields: &[(&str, &str)]) -> Body {
    let encoded: Vec<String> = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencode(v)))
        .collect();
    Body::from(encoded.join("&"))
}

fn urlencode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[tokio::test]
async fn test_register_get_and_post() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/register").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["worker_id"].is_string());
    assert_eq!(body["api_key"].as_str().unwrap().len(), 44);

    let (second_id, _) = app.register().await;
    assert_ne!(body["worker_id"].as_str().unwrap(), second_id);
}

#[tokio::test]
async fn test_heartbeat_wrong_key_asks_for_restart() {
    let app = TestApp::new().await;
    let (worker_id, _) = app.register().await;

    let response = app
        .send(
            worker_request("POST", "/heartbeat", &worker_id, "wrong-key")
                .header("content-type", "application/json")
                .body(Body::from(json!({"cpu_usage": 1.0}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "restart");
    assert_eq!(body["message"], "Worker auth failed");

    // 缺少请求头同样要求重启
    let response = app
        .send(Request::get("/tasks").body(Body::empty()).unwrap())
        .await;
    assert_eq!(json_body(response).await["status"], "restart");
}

#[tokio::test]
async fn test_heartbeat_reports_hold_and_continue() {
    let app = TestApp::new().await;
    let (worker_id, api_key) = app.register().await;
    let payload = json!({
        "cpu_usage": 20.0,
        "ram_usage": 30.0,
        "disk_usage": {"name": "/dev/sda1", "usage_percent": 50.0},
        "network": {"in": 1.0, "out": 2.0},
        "public_ip": "198.51.100.1"
    })
    .to_string();

    let heartbeat = || {
        worker_request("POST", "/heartbeat", &worker_id, &api_key)
            .header("content-type", "application/json")
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let body = json_body(app.send(heartbeat()).await).await;
    assert_eq!(body["status"], "continue");
    assert_eq!(body["worker_id"], worker_id.as_str());

    let response = app.admin_action("worker_hold", json!(true)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(app.send(heartbeat()).await).await;
    assert_eq!(body["status"], "hold");

    app.admin_action("restart_workers", json!(true)).await;
    let body = json_body(app.send(heartbeat()).await).await;
    assert_eq!(body["status"], "restart");
    let body = json_body(app.send(heartbeat()).await).await;
    assert_eq!(body["status"], "hold");
}

#[tokio::test]
async fn test_tasks_and_queue_hold() {
    let app = TestApp::new().await;
    let (worker_id, api_key) = app.register().await;

    let response = app
        .send(
            worker_request("GET", "/tasks", &worker_id, &api_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let urls = json_body(response).await;
    let urls = urls.as_array().unwrap();
    assert_eq!(urls.len(), 45);
    assert!(urls.iter().all(|u| {
        let u = u.as_str().unwrap();
        u.starts_with("https://bit.ly/")
            || u.starts_with("https://s.id/")
            || u.starts_with("https://shorturl.at/")
    }));

    app.admin_action("queue_hold", json!(true)).await;
    let response = app
        .send(
            worker_request("GET", "/tasks", &worker_id, &api_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_result_submission_and_validation() {
    let app = TestApp::new().await;
    let (worker_id, api_key) = app.register().await;

    let tasks = app
        .send(
            worker_request("GET", "/tasks", &worker_id, &api_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let tasks = json_body(tasks).await;
    let url = tasks[0].as_str().unwrap().to_string();

    let form = |fields: &[(&str, &str)]| {
        worker_request("POST", "/result", &worker_id, &api_key)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(form_body(fields))
            .unwrap()
    };

    let response = app
        .send(form(&[("status", "success"), ("unresolved_url", url.as_str())]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("resolved_url"));

    let response = app
        .send(form(&[("status", "unknown"), ("unresolved_url", url.as_str())]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(form(&[
            ("status", "success"),
            ("unresolved_url", url.as_str()),
            ("resolved_url", "https://example.com/article"),
            ("title", "An article"),
            ("short_description", "Short"),
            ("full_text_blob", "Full text"),
            ("scraped_at", "2024-05-01 10:00:00"),
        ]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");

    // 等待合并写入窗口后刷新结果缓存
    let mut queue_size = -1;
    for _ in 0..100 {
        queue_size = app.stat("queue_size").await;
        if queue_size == 44 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(queue_size, 44);
    app.cache.flush().await;
    assert_eq!(app.stat("scraped_pages").await, 1);
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/stats").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::get("/stats")
                .header("X-Admin-Key", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::get("/stats")
                .header("X-Admin-Key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["success"].as_bool().unwrap());
    assert_eq!(body["data"]["workers_total"], 0);
    assert_eq!(body["data"]["cursors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_actions_rejected() {
    let app = TestApp::new().await;

    let response = app.admin_action("self_destruct", json!(true)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.admin_action("delay_per_batch", json!("soon")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.admin_action("delay_per_batch", json!(100_000)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(
            Request::post("/actions")
                .header("X-Admin-Key", ADMIN_KEY)
                .header("content-type", "application/json")
                .body(Body::from(json!({"state_type": "queue_hold"}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.admin_action("delay_per_batch", json!(2)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["flags"]["delay_seconds"], 2);
    assert_eq!(body["message"], "Action executed successfully");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}
