use axum::Router;
use axum::body::to_bytes;
use lifeos::application::task_list::TaskListManager;
use lifeos::domain::store::TaskStore;
use lifeos::http::{routing, routing::tasks};
use lifeos::infrastructure::{broadcast_feed::BroadcastChangeFeed, sqlite_store::SqliteTaskStore};
use serde_json::{Value, json};

async fn app() -> Router {
    // in-memory sqlite, a single pooled connection
    let store = SqliteTaskStore::connect("sqlite::memory:", BroadcastChangeFeed::default()).await.unwrap();
    store.init().await.unwrap();
    let manager = TaskListManager::new(store, Default::default());
    manager.load().await.unwrap();
    routing::app(tasks::router(tasks::AppState { manager }))
}

#[tokio::test]
async fn acceptance_insert_toggle_reorder_delete() {
    let app = app().await;

    let res = request(&app, "GET", "/health", None).await;
    assert_eq!(res.status(), 200);

    let mut ids = Vec::new();
    for (i, label) in ["A", "B", "C", "D"].into_iter().enumerate() {
        let res = request(&app, "POST", "/tasks", Some(json!({ "label": label }))).await;
        assert_eq!(res.status(), 201);
        let body = json_body(res).await;
        assert_eq!(body["position"], i as u64 + 1);
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    // toggle
    let res = request(&app, "POST", &format!("/tasks/{}/toggle", ids[1]), None).await;
    assert_eq!(res.status(), 200);
    assert_eq!(json_body(res).await["completed"], true);

    // reorder A from index 0 to index 2
    let res = request(&app, "POST", "/tasks/reorder", Some(json!({ "task_id": ids[0], "from_index": 0, "to_index": 2 }))).await;
    assert_eq!(res.status(), 200);
    assert_eq!(labels(&json_body(res).await), ["B", "C", "A", "D"]);

    // delete needs confirmation
    let res = request(&app, "DELETE", &format!("/tasks/{}", ids[2]), None).await;
    assert_eq!(res.status(), 428);
    let res = request(&app, "DELETE", &format!("/tasks/{}?confirm=true", ids[2]), None).await;
    assert_eq!(res.status(), 204);

    // reload from the store and check order, density and summary
    let res = request(&app, "POST", "/tasks/reload", None).await;
    assert_eq!(res.status(), 200);
    let view = json_body(res).await;
    assert_eq!(labels(&view["tasks"]), ["B", "A", "D"]);
    let positions: Vec<u64> = view["tasks"].as_array().unwrap().iter().map(|t| t["position"].as_u64().unwrap()).collect();
    assert_eq!(positions, [1, 2, 3]);
    assert_eq!(view["summary"], json!({ "completed": 1, "total": 3 }));
    assert_eq!(view["phase"], "ready");
}

#[tokio::test]
async fn acceptance_rejections() {
    let app = app().await;

    let res = request(&app, "POST", "/tasks", Some(json!({ "label": "   " }))).await;
    assert_eq!(res.status(), 422);

    let res = request(&app, "POST", "/tasks/not-a-uuid/toggle", None).await;
    assert_eq!(res.status(), 400);

    let res = request(&app, "POST", &format!("/tasks/{}/toggle", uuid_str()), None).await;
    assert_eq!(res.status(), 404);

    let res = request(&app, "POST", "/tasks", Some(json!({ "label": "only" }))).await;
    let id = json_body(res).await["id"].as_str().unwrap().to_string();
    let res = request(&app, "POST", "/tasks/reorder", Some(json!({ "task_id": id, "from_index": 0, "to_index": 0 }))).await;
    assert_eq!(res.status(), 422);

    let res = request(&app, "GET", "/tasks", None).await;
    assert_eq!(json_body(res).await["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn acceptance_overlapping_deletes_both_land() {
    let app = app().await;
    let mut ids = Vec::new();
    for label in ["A", "B", "C", "D"] {
        let res = request(&app, "POST", "/tasks", Some(json!({ "label": label }))).await;
        ids.push(json_body(res).await["id"].as_str().unwrap().to_string());
    }

    let first = format!("/tasks/{}?confirm=true", ids[0]);
    let third = format!("/tasks/{}?confirm=true", ids[2]);
    let (a, c) = tokio::join!(request(&app, "DELETE", &first, None), request(&app, "DELETE", &third, None));
    assert_eq!(a.status(), 204);
    assert_eq!(c.status(), 204);

    let res = request(&app, "POST", "/tasks/reload", None).await;
    let view = json_body(res).await;
    assert_eq!(labels(&view["tasks"]), ["B", "D"]);
    let positions: Vec<u64> = view["tasks"].as_array().unwrap().iter().map(|t| t["position"].as_u64().unwrap()).collect();
    assert_eq!(positions, [1, 2]);
    assert_eq!(view["deleting"], json!([]));
}

fn uuid_str() -> String { "00000000-0000-0000-0000-00000000abcd".to_string() }

fn labels(tasks: &Value) -> Vec<String> {
    tasks.as_array().unwrap().iter().map(|t| t["label"].as_str().unwrap().to_string()).collect()
}

async fn json_body(res: hyper::Response<axum::body::Body>) -> Value {
    serde_json::from_slice(&to_bytes(res.into_body(), 1024 * 1024).await.unwrap()).unwrap()
}

async fn request(app: &Router, method: &str, path: &str, body: Option<Value>) -> hyper::Response<axum::body::Body> {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    let req = Request::builder().method(Method::from_bytes(method.as_bytes()).unwrap()).uri(path);
    let req = match body {
        Some(json) => req.header("content-type", "application/json").body(Body::from(json.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(req).await.unwrap()
}
