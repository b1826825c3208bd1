use axum::http::StatusCode;
use brightpath_server::{server, storage};
use brightpath_shared::api::endpoints;
use brightpath_shared::domain::{Child, Module};
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                &endpoints::auth_login(""),
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }

    async fn upload_bytes(
        &self,
        path: &str,
        token: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let parent_pwd = "secret123";
    let child_pwd = "kidpass";
    let parent_hash = bcrypt::hash(parent_pwd, bcrypt::DEFAULT_COST).unwrap();
    let child_hash = bcrypt::hash(child_pwd, bcrypt::DEFAULT_COST).unwrap();
    let config = server::AppConfig {
        children: vec![
            Child {
                id: "alice".into(),
                display_name: "Alice".into(),
                email: "alice@example.com".into(),
            },
            Child {
                id: "bob".into(),
                display_name: "Bob".into(),
                email: "bob@example.com".into(),
            },
        ],
        modules: vec![
            Module {
                id: "math-1".into(),
                title: "Numbers and Counting".into(),
                lesson_count: 10,
                published: true,
            },
            Module {
                id: "reading-1".into(),
                title: "First Words".into(),
                lesson_count: 5,
                published: true,
            },
            Module {
                id: "science-1".into(),
                title: "Weather Watchers".into(),
                lesson_count: 8,
                published: true,
            },
            Module {
                id: "art-1".into(),
                title: "Colors and Shapes".into(),
                lesson_count: 4,
                published: true,
            },
            Module {
                id: "draft-1".into(),
                title: "Unreleased".into(),
                lesson_count: 3,
                published: false,
            },
        ],
        jwt_secret: "testsecret".into(),
        users: vec![
            server::UserConfig {
                username: "mom".into(),
                password_hash: parent_hash,
                role: server::Role::Parent,
                email: Some("mom@example.com".into()),
                child_id: None,
            },
            server::UserConfig {
                username: "alice".into(),
                password_hash: child_hash,
                role: server::Role::Child,
                email: Some("alice@example.com".into()),
                child_id: Some("alice".into()),
            },
        ],
        media: None,
        dev_cors_origin: None,
        listen_port: None,
    };

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    store
        .seed_from_config(&config.children, &config.modules)
        .await
        .expect("seed");

    let state = server::AppState::new(config, store, None);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

fn kind_of(body: &Value) -> &str {
    body.get("kind").and_then(|v| v.as_str()).unwrap_or("")
}

async fn link_alice(server: &TestServer, parent_token: &str) {
    let body = server
        .request_expect(
            "POST",
            &endpoints::children_link(""),
            Some(parent_token),
            Some(json!({"child_email": "alice@example.com"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(body.get("child_id").and_then(|v| v.as_str()), Some("alice"));
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .request_expect("GET", "/healthz", None, None, StatusCode::OK)
        .await;
    let token = server.login("mom", "secret123").await;
    assert!(!token.is_empty());
    let (status, body) = server
        .request(
            "POST",
            &endpoints::auth_login(""),
            None,
            Some(json!({"username":"mom","password":"wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(kind_of(&body), "unauthorized");
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", endpoints::children(""), None),
        ("GET", endpoints::modules(""), None),
        (
            "POST",
            endpoints::children_link(""),
            Some(json!({"child_email":"alice@example.com"})),
        ),
        ("GET", endpoints::child_assignments("", "alice"), None),
        (
            "POST",
            endpoints::child_assignments("", "alice"),
            Some(json!({"module_id":"math-1"})),
        ),
        (
            "PUT",
            endpoints::child_progress("", "alice", "math-1"),
            Some(json!({"completed_lessons":1})),
        ),
        ("GET", endpoints::child_tasks("", "alice"), None),
        (
            "POST",
            endpoints::child_tasks("", "alice"),
            Some(json!({"title":"Chores"})),
        ),
        (
            "PUT",
            endpoints::child_task("", "alice", 1),
            Some(json!({"completed":true})),
        ),
        (
            "POST",
            endpoints::child_xp("", "alice"),
            Some(json!({"amount":10})),
        ),
    ];
    for (method, path, body) in cases.iter() {
        let (status, value) = server.request(method, path, None, body.clone()).await;
        assert_eq!(
            status,
            StatusCode::UNAUTHORIZED,
            "{method} {path}: {value:?}"
        );
        assert_eq!(kind_of(&value), "unauthorized", "{method} {path}");
    }
}

#[tokio::test]
async fn link_child_flow() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;

    // Before linking, the parent sees no children
    let children = server
        .request_expect(
            "GET",
            &endpoints::children(""),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(children.as_array().unwrap().is_empty());

    link_alice(&server, &parent_token).await;

    let children = server
        .request_expect(
            "GET",
            &endpoints::children(""),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let alice = &children.as_array().unwrap()[0];
    assert_eq!(alice.get("id").and_then(|v| v.as_str()), Some("alice"));
    assert_eq!(alice.get("xp").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(alice.get("level").and_then(|v| v.as_i64()), Some(1));

    // Relinking an already linked child is a conflict
    let (status, body) = server
        .request(
            "POST",
            &endpoints::children_link(""),
            Some(&parent_token),
            Some(json!({"child_email": "alice@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "already_linked");

    // Unknown email
    let (status, body) = server
        .request(
            "POST",
            &endpoints::children_link(""),
            Some(&parent_token),
            Some(json!({"child_email": "nobody@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "not_found");

    // An email that belongs to a parent account, not a child
    let (status, body) = server
        .request(
            "POST",
            &endpoints::children_link(""),
            Some(&parent_token),
            Some(json!({"child_email": "mom@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_role");

    // Missing email
    let (status, body) = server
        .request(
            "POST",
            &endpoints::children_link(""),
            Some(&parent_token),
            Some(json!({"child_email": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_argument");
}

#[tokio::test]
async fn assignment_ladder_and_capacity() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;
    link_alice(&server, &parent_token).await;

    // Catalog only lists published modules
    let modules = server
        .request_expect(
            "GET",
            &endpoints::modules(""),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let ids: Vec<&str> = modules
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.get("id").and_then(|v| v.as_str()).unwrap())
        .collect();
    assert!(ids.contains(&"math-1"));
    assert!(!ids.contains(&"draft-1"));

    let assignments_path = endpoints::child_assignments("", "alice");
    let resp = server
        .request_expect(
            "POST",
            &assignments_path,
            Some(&parent_token),
            Some(json!({"module_id": "math-1"})),
            StatusCode::OK,
        )
        .await;
    let assignment = resp.get("assignment").unwrap();
    assert_eq!(
        assignment.get("module_id").and_then(|v| v.as_str()),
        Some("math-1")
    );
    assert_eq!(
        assignment.get("child_id").and_then(|v| v.as_str()),
        Some("alice")
    );
    assert_eq!(
        assignment.get("assigned_by").and_then(|v| v.as_str()),
        Some("mom")
    );
    let progress = resp.get("progress").unwrap();
    assert_eq!(
        progress.get("status").and_then(|v| v.as_str()),
        Some("NOT_STARTED")
    );
    assert_eq!(
        progress.get("completed_lessons").and_then(|v| v.as_i64()),
        Some(0)
    );

    // Same module twice
    let (status, body) = server
        .request(
            "POST",
            &assignments_path,
            Some(&parent_token),
            Some(json!({"module_id": "math-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "conflict");

    // Unpublished module looks like a missing one
    let (status, body) = server
        .request(
            "POST",
            &assignments_path,
            Some(&parent_token),
            Some(json!({"module_id": "draft-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "not_found");

    // Unlinked child looks like a missing one
    let (status, body) = server
        .request(
            "POST",
            &endpoints::child_assignments("", "bob"),
            Some(&parent_token),
            Some(json!({"module_id": "math-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "not_found");

    // Fill the remaining two slots, then hit the limit
    for module in ["reading-1", "science-1"] {
        server
            .request_expect(
                "POST",
                &assignments_path,
                Some(&parent_token),
                Some(json!({"module_id": module})),
                StatusCode::OK,
            )
            .await;
    }
    let (status, body) = server
        .request(
            "POST",
            &assignments_path,
            Some(&parent_token),
            Some(json!({"module_id": "art-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "capacity_exceeded");

    let listed = server
        .request_expect(
            "GET",
            &assignments_path,
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn child_saves_progress() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;
    link_alice(&server, &parent_token).await;
    server
        .request_expect(
            "POST",
            &endpoints::child_assignments("", "alice"),
            Some(&parent_token),
            Some(json!({"module_id": "math-1"})),
            StatusCode::OK,
        )
        .await;

    let child_token = server.login("alice", "kidpass").await;

    let progress_path = endpoints::child_progress("", "alice", "math-1");
    let progress = server
        .request_expect(
            "PUT",
            &progress_path,
            Some(&child_token),
            Some(json!({"completed_lessons": 3})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        progress.get("status").and_then(|v| v.as_str()),
        Some("IN_PROGRESS")
    );
    assert_eq!(
        progress.get("completed_lessons").and_then(|v| v.as_i64()),
        Some(3)
    );

    // Upsert: a later save replaces the first
    let progress = server
        .request_expect(
            "PUT",
            &progress_path,
            Some(&child_token),
            Some(json!({"completed_lessons": 10, "status": "COMPLETED"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        progress.get("status").and_then(|v| v.as_str()),
        Some("COMPLETED")
    );
    assert_eq!(
        progress.get("completed_lessons").and_then(|v| v.as_i64()),
        Some(10)
    );

    // Progress needs an assignment
    let (status, body) = server
        .request(
            "PUT",
            &endpoints::child_progress("", "alice", "reading-1"),
            Some(&child_token),
            Some(json!({"completed_lessons": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "not_found");

    // More lessons than the module has
    let (status, body) = server
        .request(
            "PUT",
            &progress_path,
            Some(&child_token),
            Some(json!({"completed_lessons": 11})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_argument");

    // The child sees the saved progress in their own assignment list
    let listed = server
        .request_expect(
            "GET",
            &endpoints::child_assignments("", "alice"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let entry = &listed.as_array().unwrap()[0];
    assert_eq!(
        entry
            .get("progress")
            .and_then(|p| p.get("completed_lessons"))
            .and_then(|v| v.as_i64()),
        Some(10)
    );
}

#[tokio::test]
async fn task_completion_awards_xp_once() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;
    link_alice(&server, &parent_token).await;

    let tasks_path = endpoints::child_tasks("", "alice");
    let task = server
        .request_expect(
            "POST",
            &tasks_path,
            Some(&parent_token),
            Some(json!({"title": "Feed the cat"})),
            StatusCode::OK,
        )
        .await;
    let task_id = task.get("id").and_then(|v| v.as_i64()).unwrap() as i32;
    assert_eq!(task.get("status").and_then(|v| v.as_str()), Some("PENDING"));

    // Empty titles and malformed due dates are rejected
    let (status, body) = server
        .request(
            "POST",
            &tasks_path,
            Some(&parent_token),
            Some(json!({"title": "   "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_argument");
    let (status, _) = server
        .request(
            "POST",
            &tasks_path,
            Some(&parent_token),
            Some(json!({"title": "Walk dog", "due_date": "tomorrow"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let child_token = server.login("alice", "kidpass").await;
    let toggle_path = endpoints::child_task("", "alice", task_id);

    let resp = server
        .request_expect(
            "PUT",
            &toggle_path,
            Some(&child_token),
            Some(json!({"completed": true})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        resp.get("task")
            .and_then(|t| t.get("status"))
            .and_then(|v| v.as_str()),
        Some("COMPLETED")
    );
    let xp = resp.get("xp").unwrap();
    assert_eq!(xp.get("new_xp").and_then(|v| v.as_i64()), Some(20));
    assert_eq!(xp.get("new_level").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(xp.get("leveled_up").and_then(|v| v.as_bool()), Some(false));

    // Completing an already completed task does not award again
    let resp = server
        .request_expect(
            "PUT",
            &toggle_path,
            Some(&child_token),
            Some(json!({"completed": true})),
            StatusCode::OK,
        )
        .await;
    assert!(resp.get("xp").unwrap().is_null());

    // Unchecking keeps the earned XP, and rechecking never re-awards
    let resp = server
        .request_expect(
            "PUT",
            &toggle_path,
            Some(&child_token),
            Some(json!({"completed": false})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        resp.get("task")
            .and_then(|t| t.get("status"))
            .and_then(|v| v.as_str()),
        Some("PENDING")
    );
    assert!(resp.get("xp").unwrap().is_null());
    let resp = server
        .request_expect(
            "PUT",
            &toggle_path,
            Some(&child_token),
            Some(json!({"completed": true})),
            StatusCode::OK,
        )
        .await;
    assert!(resp.get("xp").unwrap().is_null());

    let children = server
        .request_expect(
            "GET",
            &endpoints::children(""),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let alice = &children.as_array().unwrap()[0];
    assert_eq!(alice.get("xp").and_then(|v| v.as_i64()), Some(20));
    assert_eq!(alice.get("level").and_then(|v| v.as_i64()), Some(1));

    // A task id that does not belong to the child
    let (status, body) = server
        .request(
            "PUT",
            &endpoints::child_task("", "alice", 9999),
            Some(&child_token),
            Some(json!({"completed": true})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "not_found");
}

#[tokio::test]
async fn parent_awards_xp() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;
    link_alice(&server, &parent_token).await;

    let xp_path = endpoints::child_xp("", "alice");
    let outcome = server
        .request_expect(
            "POST",
            &xp_path,
            Some(&parent_token),
            Some(json!({"amount": 100})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(outcome.get("new_xp").and_then(|v| v.as_i64()), Some(100));
    assert_eq!(outcome.get("new_level").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(
        outcome.get("leveled_up").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        outcome.get("xp_to_next_level").and_then(|v| v.as_i64()),
        Some(100)
    );
    assert_eq!(outcome.get("next_level").and_then(|v| v.as_i64()), Some(3));

    // A second award within the same level
    let outcome = server
        .request_expect(
            "POST",
            &xp_path,
            Some(&parent_token),
            Some(json!({"amount": 50})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(outcome.get("new_xp").and_then(|v| v.as_i64()), Some(150));
    assert_eq!(
        outcome.get("leveled_up").and_then(|v| v.as_bool()),
        Some(false)
    );

    let (status, body) = server
        .request(
            "POST",
            &xp_path,
            Some(&parent_token),
            Some(json!({"amount": 0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_argument");

    // Absurd amounts are rejected before they reach the ledger
    let (status, body) = server
        .request(
            "POST",
            &xp_path,
            Some(&parent_token),
            Some(json!({"amount": i32::MAX})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_argument");
    let outcome = server
        .request_expect(
            "GET",
            &endpoints::children(""),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let alice = outcome
        .as_array()
        .and_then(|a| a.iter().find(|c| c["id"] == "alice"))
        .cloned()
        .unwrap_or_default();
    assert_eq!(alice.get("xp").and_then(|v| v.as_i64()), Some(150));

    // Awarding to an unlinked child is not found
    let (status, body) = server
        .request(
            "POST",
            &endpoints::child_xp("", "bob"),
            Some(&parent_token),
            Some(json!({"amount": 10})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "not_found");
}

#[tokio::test]
async fn role_matrix_is_enforced() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;
    link_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    let forbidden_for_child: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", endpoints::children(""), None),
        (
            "POST",
            endpoints::children_link(""),
            Some(json!({"child_email":"bob@example.com"})),
        ),
        (
            "POST",
            endpoints::child_assignments("", "alice"),
            Some(json!({"module_id":"math-1"})),
        ),
        ("GET", endpoints::child_assignments("", "bob"), None),
        (
            "PUT",
            endpoints::child_progress("", "bob", "math-1"),
            Some(json!({"completed_lessons":1})),
        ),
        ("GET", endpoints::child_tasks("", "bob"), None),
        (
            "PUT",
            endpoints::child_task("", "bob", 1),
            Some(json!({"completed":true})),
        ),
        (
            "POST",
            endpoints::child_xp("", "bob"),
            Some(json!({"amount":10})),
        ),
        (
            "POST",
            endpoints::child_tasks("", "alice"),
            Some(json!({"title":"Self-assigned"})),
        ),
    ];
    for (method, path, body) in forbidden_for_child.iter() {
        let (status, value) = server
            .request(method, path, Some(&child_token), body.clone())
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {path}: {value:?}");
        assert_eq!(kind_of(&value), "forbidden", "{method} {path}");
    }

    let forbidden_for_parent: Vec<(&str, String, Option<Value>)> = vec![
        (
            "PUT",
            endpoints::child_progress("", "alice", "math-1"),
            Some(json!({"completed_lessons":1})),
        ),
        (
            "PUT",
            endpoints::child_task("", "alice", 1),
            Some(json!({"completed":true})),
        ),
    ];
    for (method, path, body) in forbidden_for_parent.iter() {
        let (status, value) = server
            .request(method, path, Some(&parent_token), body.clone())
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {path}: {value:?}");
    }
}

#[tokio::test]
async fn avatar_upload_without_media_host() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("mom", "secret123").await;
    link_alice(&server, &parent_token).await;

    let (status, body) = server
        .upload_bytes(
            &endpoints::child_avatar("", "alice"),
            &parent_token,
            "image/png",
            vec![0x89, b'P', b'N', b'G'],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body:?}");
    assert_eq!(kind_of(&body), "media_service");

    // Unlinked child is reported before the media host is consulted
    let (status, body) = server
        .upload_bytes(
            &endpoints::child_avatar("", "bob"),
            &parent_token,
            "image/png",
            vec![0x89, b'P', b'N', b'G'],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body:?}");
}
