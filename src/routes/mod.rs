mod api;
mod proposals;
mod session;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Three images of a few megabytes each fit comfortably.
const MAX_FORM_BYTES: usize = 32 * 1024 * 1024;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session", post(session::login))
        .route(
            "/api/proposals",
            get(proposals::list_proposals).post(proposals::submit_proposal),
        )
        .route("/api/proposals/facets", get(proposals::facet_options))
        .route("/api/proposals/export", get(api::export_proposals))
        .route(
            "/api/professor-proposals",
            post(proposals::submit_professor_proposal),
        )
        .route(
            "/api/proposals/:id",
            get(proposals::get_proposal)
                .put(proposals::resubmit_proposal)
                .delete(proposals::delete_proposal),
        )
        .route("/api/proposals/:id/adopt", post(proposals::adopt_proposal))
        .route("/api/proposals/:id/approve", post(proposals::approve_proposal))
        .route("/api/proposals/:id/reject", post(proposals::reject_proposal))
        .route("/api/proposals/:id/request-edit", post(proposals::request_edit))
        .route(
            "/api/proposals/:id/completion",
            post(proposals::complete_proposal).put(proposals::amend_completion),
        )
        .route("/api/proposals/:id/document", get(api::download_proposal))
        .route(
            "/api/proposals/:id/completion-document",
            get(api::download_completion),
        )
        .route("/api/proposals/:id/images/:slot", get(api::proposal_image))
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use std::io::Read;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::auth::hash_password;
    use crate::config::Config;
    use crate::db::MemoryStore;
    use crate::state::AppState;

    const BOUNDARY: &str = "capstone-test-boundary";
    const PASSWORD: &str = "review-board";

    fn app() -> Router {
        let config = Config::for_memory("router-test-secret", Some(hash_password(PASSWORD).unwrap()));
        let state = AppState::new(Arc::new(config), Arc::new(MemoryStore::new())).unwrap();
        super::router(Arc::new(state))
    }

    fn proposal_fields(project: &str, name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("name", name.to_string()),
            ("project_name", project.to_string()),
            ("mentor", "Dr. Rivera".to_string()),
            ("mentor_email", "rivera@example.edu".to_string()),
            ("objective", "Forecast weekly demand".to_string()),
            ("rationale", "Stores overstock perishables".to_string()),
            ("dataset", "Point of sale data".to_string()),
            ("approach", "Gradient boosting".to_string()),
            ("timeline", "One semester".to_string()),
            ("expected_students", "2".to_string()),
            ("github_link", "https://github.com/example/retail".to_string()),
            ("semester", "Fall".to_string()),
            ("year", "2024".to_string()),
        ]
    }

    fn multipart_body(fields: &[(&str, String)], files: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, filename, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(method: Method, uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn authed(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn submit(app: &Router, project: &str, name: &str) -> String {
        let body = multipart_body(&proposal_fields(project, name), &[]);
        let (status, json) =
            send_json(app, multipart_request(Method::POST, "/api/proposals", body)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["proposal"]["proposal_id"].as_str().unwrap().to_string()
    }

    async fn reviewer_token(app: &Router) -> String {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/session")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"password":"{PASSWORD}"}}"#)))
            .unwrap();
        let (status, json) = send_json(app, request).await;
        assert_eq!(status, StatusCode::OK);
        json["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, json) = send_json(&app(), authed(Method::GET, "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/session")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"password":"guess"}"#))
            .unwrap();
        let (status, json) = send_json(&app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn submission_then_review_through_http() {
        let app = app();
        let id = submit(&app, "Retail Forecasting", "Ada").await;

        let (status, json) =
            send_json(&app, authed(Method::GET, "/api/proposals?view=pending_approval", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(json["proposals"][0]["status"], "Pending Approval");

        let approve = format!("/api/proposals/{id}/approve");
        let (status, _) = send_json(&app, authed(Method::POST, &approve, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send_json(&app, authed(Method::POST, &approve, Some("forged"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = reviewer_token(&app).await;
        let (status, json) = send_json(&app, authed(Method::POST, &approve, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["proposal"]["status"], "Approved.. In Progress");

        let (status, _) = send_json(&app, authed(Method::POST, &approve, Some(&token))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn invalid_submission_reports_fields() {
        let app = app();
        let mut fields = proposal_fields("Retail Forecasting", "Ada");
        fields.retain(|(name, _)| *name != "mentor_email");
        let body = multipart_body(&fields, &[]);
        let (status, json) =
            send_json(&app, multipart_request(Method::POST, "/api/proposals", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["fields"][0]["field"], "mentor_email");
    }

    #[tokio::test]
    async fn facets_narrow_the_listing() {
        let app = app();
        submit(&app, "Retail Forecasting", "Ada").await;
        submit(&app, "Retail Forecasting", "Lin").await;
        submit(&app, "Graph Mining", "Bo").await;

        let (_, json) = send_json(
            &app,
            authed(
                Method::GET,
                "/api/proposals?project_name=Retail%20Forecasting&name=Lin&name=Bo",
                None,
            ),
        )
        .await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["proposals"][0]["name"], "Lin");

        let (_, json) = send_json(&app, authed(Method::GET, "/api/proposals/facets", None)).await;
        assert_eq!(
            json["options"]["project_names"],
            serde_json::json!(["Retail Forecasting", "Graph Mining"])
        );

        let (status, _) =
            send_json(&app, authed(Method::GET, "/api/proposals?view=nonsense", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_form_fields_do_not_filter() {
        let app = app();
        submit(&app, "Retail Forecasting", "Ada").await;
        submit(&app, "Graph Mining", "Bo").await;

        let (status, json) = send_json(
            &app,
            authed(
                Method::GET,
                "/api/proposals?view=&project_name=&year=&semester=&name=&proposal_id=",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"], "all");
        assert_eq!(json["count"], 2);
    }

    #[tokio::test]
    async fn images_and_documents_are_downloadable() {
        let app = app();
        let png = crate::images::sample_png(20, 10);
        let body = multipart_body(
            &proposal_fields("Retail Forecasting", "Ada"),
            &[("objective_image", "chart.png", png.clone()), ("dataset_image", "", Vec::new())],
        );
        let (status, json) =
            send_json(&app, multipart_request(Method::POST, "/api/proposals", body)).await;
        assert_eq!(status, StatusCode::OK);
        let id = json["proposal"]["proposal_id"].as_str().unwrap().to_string();

        let (status, bytes) =
            send(&app, authed(Method::GET, &format!("/api/proposals/{id}/images/objective"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, png);

        let (status, _) =
            send(&app, authed(Method::GET, &format!("/api/proposals/{id}/images/dataset"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(authed(Method::GET, &format!("/api/proposals/{id}/document"), None))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Retail_Forecasting_proposal.md\""
        );
        let doc = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc = String::from_utf8(doc.to_vec()).unwrap();
        assert!(doc.contains("![Uploaded Image](data:image/jpeg;base64,"));

        let (status, _) = send(
            &app,
            authed(Method::GET, &format!("/api/proposals/{id}/completion-document"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn completion_flow_and_export() {
        let app = app();
        let id = submit(&app, "Retail Forecasting", "Ada").await;
        let token = reviewer_token(&app).await;
        send(&app, authed(Method::POST, &format!("/api/proposals/{id}/approve"), Some(&token))).await;

        let completion = multipart_body(
            &[
                ("project_name", "Retail Forecasting".to_string()),
                ("name", "Ada".to_string()),
                ("year", "2024".to_string()),
                ("semester", "Fall".to_string()),
                ("github_link", "https://github.com/example/retail".to_string()),
                ("video_link", "https://video.example.com/retail".to_string()),
            ],
            &[("project_document", "report.docx", b"PK".to_vec())],
        );
        let uri = format!("/api/proposals/{id}/completion");
        let (status, json) =
            send_json(&app, multipart_request(Method::POST, &uri, completion)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["proposal"]["status"], "Completed");
        assert_eq!(json["proposal"]["project_document"], "report.docx");
        assert!(json["archive"].is_null());

        let (status, body) = send(
            &app,
            authed(Method::GET, &format!("/api/proposals/{id}/completion-document"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("Document uploaded name: report.docx"));

        let (status, zip_bytes) =
            send(&app, authed(Method::GET, "/api/proposals/export?view=completed", None)).await;
        assert_eq!(status, StatusCode::OK);
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), format!("{id}/Retail_Forecasting_proposal.md"));
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        assert!(text.contains("## Retail Forecasting"));
    }

    #[tokio::test]
    async fn delete_requires_reviewer_and_removes_row() {
        let app = app();
        let id = submit(&app, "Retail Forecasting", "Ada").await;
        let uri = format!("/api/proposals/{id}");

        let (status, _) = send(&app, authed(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let token = reviewer_token(&app).await;
        let (status, _) = send(&app, authed(Method::DELETE, &uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = send_json(&app, authed(Method::GET, &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }
}
