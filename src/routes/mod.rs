use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub mod auth;
pub mod events;
pub mod health;
pub mod swaps;

/// Every route except the public signup/login pair, which `main` nests under
/// `/api/auth` behind the rate limiter.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api/auth", auth::router())
        .nest("/api/events", events::router())
        .nest("/api", swaps::router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;
    use axum::body::Body;
    use http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        router()
            .nest("/api/auth", auth::public_router())
            .with_state(test_state().await)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn signup(app: &Router, name: &str, email: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({ "name": name, "email": email, "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn swappable_slot(app: &Router, token: &str, title: &str, day: u32) -> String {
        let (status, slot) = send(
            app,
            Method::POST,
            "/api/events",
            Some(token),
            Some(json!({
                "title": title,
                "start_time": format!("2025-01-{:02}T09:00:00", day),
                "end_time": format!("2025-01-{:02}T10:00:00", day),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{slot}");
        assert_eq!(slot["status"], "BUSY");

        let id = slot["id"].as_str().unwrap().to_string();
        let (status, slot) = send(
            app,
            Method::PUT,
            &format!("/api/events/{}/swappable", id),
            Some(token),
            Some(json!({ "swappable": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(slot["status"], "SWAPPABLE");
        id
    }

    #[tokio::test]
    async fn health_is_public_on_both_paths() {
        let app = app().await;
        for path in ["/health", "/api/health"] {
            let (status, body) = send(&app, Method::GET, path, None, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn protected_routes_require_bearer_token() {
        let app = app().await;

        let (status, body) = send(&app, Method::GET, "/api/events", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let req = Request::builder()
            .uri("/api/swap-requests/incoming")
            .header(header::AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::GET, "/api/auth/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_login_and_me() {
        let app = app().await;
        let token = signup(&app, "Alice", "Alice@Example.com").await;

        let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "Alice");
        assert_eq!(me["email"], "alice@example.com");
        assert!(me.get("password_hash").is_none());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({ "name": "Other", "email": "alice@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].as_str().is_some());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn event_crud_and_validation() {
        let app = app().await;
        let token = signup(&app, "Alice", "alice@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/events",
            Some(&token),
            Some(json!({
                "title": "Backwards",
                "start_time": "2025-01-06T10:00:00",
                "end_time": "2025-01-06T09:00:00",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_RANGE");

        let id = swappable_slot(&app, &token, "Standup", 6).await;

        let (status, slot) = send(
            &app,
            Method::PUT,
            &format!("/api/events/{}", id),
            Some(&token),
            Some(json!({ "title": "Daily standup" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(slot["title"], "Daily standup");
        assert_eq!(slot["status"], "SWAPPABLE");

        let (status, list) = send(&app, Method::GET, "/api/events", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let uri = format!("/api/events/{}", id);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn swap_round_trip_over_http() {
        let app = app().await;
        let alice = signup(&app, "Alice", "alice@example.com").await;
        let bob = signup(&app, "Bob", "bob@example.com").await;

        let standup = swappable_slot(&app, &alice, "Standup", 6).await;
        let review = swappable_slot(&app, &bob, "Review", 7).await;

        let (status, market) =
            send(&app, Method::GET, "/api/swappable-slots", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let market = market.as_array().unwrap().clone();
        assert_eq!(market.len(), 1);
        assert_eq!(market[0]["id"], review.as_str());
        assert_eq!(market[0]["owner_name"], "Bob");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/swap-request",
            Some(&alice),
            Some(json!({ "my_slot_id": standup, "their_slot_id": standup })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (status, request) = send(
            &app,
            Method::POST,
            "/api/swap-request",
            Some(&alice),
            Some(json!({ "my_slot_id": standup, "their_slot_id": review })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request["status"], "PENDING");
        let request_id = request["id"].as_str().unwrap().to_string();

        let (_, incoming) =
            send(&app, Method::GET, "/api/swap-requests/incoming", Some(&bob), None).await;
        assert_eq!(incoming.as_array().unwrap().len(), 1);
        let (_, outgoing) =
            send(&app, Method::GET, "/api/swap-requests/outgoing", Some(&alice), None).await;
        assert_eq!(outgoing[0]["target_slot_title"], "Review");

        let respond_uri = format!("/api/swap-response/{}", request_id);
        let (status, body) = send(
            &app,
            Method::POST,
            &respond_uri,
            Some(&alice),
            Some(json!({ "accepted": true })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "NOT_AUTHORIZED");

        let (status, resolved) = send(
            &app,
            Method::POST,
            &respond_uri,
            Some(&bob),
            Some(json!({ "accepted": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], "ACCEPTED");

        let (_, mine) = send(&app, Method::GET, "/api/events", Some(&alice), None).await;
        let mine = mine.as_array().unwrap().clone();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0]["title"], "Review");
        assert_eq!(mine[0]["status"], "BUSY");

        let (status, body) = send(
            &app,
            Method::POST,
            &respond_uri,
            Some(&bob),
            Some(json!({ "accepted": false })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ALREADY_RESOLVED");
    }
}
