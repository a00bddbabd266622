use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use menteechat_core::rest::{HttpRestClient, RestService};
use menteechat_core::{Config, Message, MessagingError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    uri: String,
    authorization: Option<String>,
    body: String,
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl Canned {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }
}

/// Local backend answering by path with canned responses
struct Backend {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Backend {
    async fn start(routes: Vec<(&str, Canned)>) -> Self {
        let routes: Arc<HashMap<String, Canned>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, canned)| (path.to_string(), canned))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let recorder = requests.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let routes = routes.clone();
                let recorder = recorder.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let routes = routes.clone();
                        let recorder = recorder.clone();
                        async move { Ok::<_, Infallible>(answer(req, &routes, &recorder).await) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    fn client(&self) -> HttpRestClient {
        self.client_with(|_| {})
    }

    fn client_with(&self, tweak: impl FnOnce(&mut Config)) -> HttpRestClient {
        let mut config = Config {
            api_base_url: format!("http://{}", self.addr),
            ..Config::default()
        };
        tweak(&mut config);
        HttpRestClient::new(&config)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn answer(
    req: Request<Incoming>,
    routes: &HashMap<String, Canned>,
    recorder: &Mutex<Vec<Recorded>>,
) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let path = req.uri().path().to_string();
    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = req.into_body().collect().await.unwrap().to_bytes();
    recorder.lock().unwrap().push(Recorded {
        method,
        uri,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let canned = routes.get(&path).cloned().unwrap_or(Canned {
        status: StatusCode::NOT_FOUND,
        body: String::new(),
        delay: Duration::ZERO,
    });
    tokio::time::sleep(canned.delay).await;
    Response::builder()
        .status(canned.status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(canned.body)))
        .unwrap()
}

fn wire_message(id: &str, from: &str, to: &str, body: &str, ts: i64) -> Value {
    json!({
        "_id": { "$oid": id },
        "sender_id": { "$oid": from },
        "recipient_id": { "$oid": to },
        "body": body,
        "created_at": { "$date": ts }
    })
}

#[tokio::test]
async fn test_fetch_latest_conversations() {
    let backend = Backend::start(vec![(
        "/messages/contacts/u1",
        Canned::ok(json!({
            "result": {
                "data": [
                    {
                        "otherId": { "$oid": "u2" },
                        "otherUser": { "name": "Ana", "image": "/img/ana.png" },
                        "latestMessage": wire_message("m2", "u2", "u1", "see you", 1_700_000_000_000),
                        "new": true
                    },
                    {
                        "otherId": "u3",
                        "otherUser": { "name": "Ben" },
                        "latestMessage": wire_message("m1", "u1", "u3", "bye", 1_600_000_000_000)
                    }
                ]
            }
        })),
    )])
    .await;

    let summaries = backend.client().fetch_latest_conversations("u1").await.unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].counterpart_id, "u2");
    assert_eq!(summaries[0].counterpart.name, "Ana");
    assert_eq!(summaries[0].counterpart.image.as_deref(), Some("/img/ana.png"));
    assert_eq!(summaries[0].latest_message.id.as_deref(), Some("m2"));
    assert_eq!(summaries[0].latest_message.created_at, 1_700_000_000_000);
    assert!(summaries[0].unseen);
    assert_eq!(summaries[1].counterpart_id, "u3");
    assert!(!summaries[1].unseen);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].uri, "/messages/contacts/u1");
    assert!(requests[0].authorization.is_none());
}

#[tokio::test]
async fn test_fetch_thread_sorts_oldest_first() {
    let backend = Backend::start(vec![(
        "/messages/direct/",
        Canned::ok(json!({
            "result": {
                "Messages": [
                    wire_message("m2", "u1", "u2", "hey", 2),
                    wire_message("m3", "u2", "u1", "how are you", 3),
                    wire_message("m1", "u2", "u1", "hi", 1)
                ]
            }
        })),
    )])
    .await;

    let messages = backend.client().fetch_thread("u1", "u2").await.unwrap();

    let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["hi", "hey", "how are you"]);
    assert_eq!(
        backend.requests()[0].uri,
        "/messages/direct/?recipient_id=u2&sender_id=u1"
    );
}

#[tokio::test]
async fn test_post_message_sends_extended_json() {
    let backend = Backend::start(vec![("/messages/", Canned::ok(json!({ "result": "ok" })))]).await;
    let message = Message {
        id: None,
        sender_id: "u1".to_string(),
        recipient_id: "u2".to_string(),
        body: "hello".to_string(),
        created_at: 42,
    };

    backend.client().post_message(&message).await.unwrap();

    let request = &backend.requests()[0];
    assert_eq!(request.method, "POST");
    let sent: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(sent["sender_id"]["$oid"], "u1");
    assert_eq!(sent["recipient_id"]["$oid"], "u2");
    assert_eq!(sent["created_at"]["$date"], 42);
    assert_eq!(sent["body"], "hello");
    assert!(sent.get("_id").is_none());
}

#[tokio::test]
async fn test_mark_read_and_authorization_header() {
    let backend = Backend::start(vec![("/notifications/update", Canned::ok(json!({})))]).await;
    let client = backend.client_with(|c| c.auth_token = Some("Bearer abc123".to_string()));

    client.mark_read("u1", "u2").await.unwrap();

    let request = &backend.requests()[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(request.authorization.as_deref(), Some("Bearer abc123"));
    let sent: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(sent, json!({ "recipient": "u1", "sender": "u2" }));
}

#[tokio::test]
async fn test_error_status_is_a_fetch_error() {
    let backend = Backend::start(vec![(
        "/messages/contacts/u1",
        Canned {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "{}".to_string(),
            delay: Duration::ZERO,
        },
    )])
    .await;

    let err = backend.client().fetch_latest_conversations("u1").await.unwrap_err();
    match err {
        MessagingError::Fetch(reason) => assert!(reason.contains("500"), "{}", reason),
        other => panic!("expected fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undecodable_body_is_a_fetch_error() {
    let backend = Backend::start(vec![(
        "/messages/direct/",
        Canned {
            status: StatusCode::OK,
            body: "<html>oops</html>".to_string(),
            delay: Duration::ZERO,
        },
    )])
    .await;

    let err = backend.client().fetch_thread("u1", "u2").await.unwrap_err();
    assert!(matches!(err, MessagingError::Fetch(_)));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = Backend::start(vec![(
        "/messages/contacts/u1",
        Canned {
            status: StatusCode::OK,
            body: json!({ "result": { "data": [] } }).to_string(),
            delay: Duration::from_secs(2),
        },
    )])
    .await;
    let client = backend.client_with(|c| c.request_timeout = Duration::from_millis(100));

    let err = client.fetch_latest_conversations("u1").await.unwrap_err();
    match err {
        MessagingError::Fetch(reason) => assert!(reason.contains("timed out"), "{}", reason),
        other => panic!("expected fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_a_fetch_error() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = unused.local_addr().unwrap();
    drop(unused);

    let client = HttpRestClient::new(&Config {
        api_base_url: format!("http://{}", addr),
        ..Config::default()
    });
    let err = client.fetch_latest_conversations("u1").await.unwrap_err();
    assert!(matches!(err, MessagingError::Fetch(_)));
}
