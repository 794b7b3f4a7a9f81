mod admin;
pub mod auth;
mod departments;
pub mod error;
mod extract;
mod tasks;
mod validation;

use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::auth::Operation;
use crate::AppState;

/// Headroom for multipart framing and text fields on top of the file bytes.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Attach the role check for `operation` to a route.
fn gated(route: MethodRouter<Arc<AppState>>, operation: Operation) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn(move |req: Request, next: Next| {
        auth::require(operation, req, next)
    }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let storage = &state.config.storage;
    let body_limit = storage
        .max_file_bytes
        .saturating_mul(storage.max_files_per_request)
        .saturating_add(FORM_OVERHEAD_BYTES);

    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/send-otp", post(auth::send_otp))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/change-password", post(auth::change_password))
        .route("/setup-status", get(auth::setup_status))
        .route("/setup", post(auth::setup));

    // Protected API routes
    let api_routes = Router::new()
        // Departments
        .route(
            "/departments",
            gated(get(departments::list_departments), Operation::ViewDepartments),
        )
        .route(
            "/admin/departments",
            gated(post(departments::create_department), Operation::ManageDepartments),
        )
        .route(
            "/admin/departments/:id/manager",
            gated(put(departments::assign_manager), Operation::ManageDepartments),
        )
        // Admin profile
        .route(
            "/admin/profile",
            gated(
                get(admin::get_profile).put(admin::update_profile),
                Operation::ManageOwnProfile,
            ),
        )
        .route(
            "/admin/profile/send-otp",
            gated(post(admin::send_email_change_otp), Operation::ManageOwnProfile),
        )
        .route(
            "/admin/profile/verify-otp",
            gated(post(admin::verify_email_change_otp), Operation::ManageOwnProfile),
        )
        // Accounts
        .route(
            "/admin/employees",
            gated(
                get(admin::list_employees).post(admin::create_employee),
                Operation::ManageAccounts,
            ),
        )
        .route(
            "/admin/employees/:id/status",
            gated(put(admin::set_employee_status), Operation::ManageAccounts),
        )
        // Tasks
        .route("/tasks", gated(get(tasks::list_tasks), Operation::ListTasks))
        .route("/tasks", gated(post(tasks::create_task), Operation::AssignTask))
        .route("/tasks/mine", gated(get(tasks::my_tasks), Operation::ViewOwnTasks))
        .route(
            "/tasks/approvals",
            gated(get(tasks::approval_queue), Operation::ViewApprovalQueue),
        )
        .route(
            "/tasks/submit/:id",
            gated(post(tasks::submit_task), Operation::SubmitTask),
        )
        .route(
            "/tasks/approve/:id",
            gated(put(tasks::decide), Operation::DecideApproval),
        )
        .route("/tasks/:id", gated(get(tasks::get_task), Operation::ViewTask))
        .route(
            "/tasks/:id/status",
            gated(put(tasks::update_status), Operation::UpdateTaskStatus),
        )
        .route(
            "/tasks/:id/comment",
            gated(post(tasks::add_comment), Operation::AddComment),
        )
        .route(
            "/tasks/:id/upload",
            gated(post(tasks::upload_files), Operation::UploadFiles),
        )
        .route(
            "/tasks/:id/upload/:upload_id",
            gated(delete(tasks::remove_upload), Operation::RemoveUpload),
        )
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(&storage.uploads_dir))
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.server.request_timeout_secs,
        )))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::db::testing::{insert_identity_with_hash, insert_task, memory_pool, seed_org, Org};
    use crate::db::Role;
    use crate::notifications::RecordingMailer;
    use crate::storage::LocalFileStore;
    use axum::body::Body;
    use axum::http::{header, Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const PASSWORD: &str = "Sup3r-secret";

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        mailer: Arc<RecordingMailer>,
        org: Org,
        task_id: String,
        uploads: TempDir,
    }

    impl TestApp {
        async fn new() -> Self {
            let pool = memory_pool().await;
            let org = seed_org(&pool).await;
            let task_id = insert_task(&pool, &org.employee_id, &org.department_id, &org.manager_id).await;

            let uploads = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.auth.jwt_secret = "router-tests-signing-secret-0123456789".to_string();
            config.storage.uploads_dir = uploads.path().to_path_buf();

            let mailer = Arc::new(RecordingMailer::new());
            let files = Arc::new(LocalFileStore::new(uploads.path(), ""));
            let state = Arc::new(AppState::new(
                config,
                pool,
                mailer.clone(),
                files,
                Arc::new(SystemClock),
            ));

            Self {
                router: create_router(state.clone()),
                state,
                mailer,
                org,
                task_id,
                uploads,
            }
        }

        async fn token_for(&self, identity_id: &str) -> String {
            let identity = self
                .state
                .credentials
                .find_by_id(identity_id)
                .await
                .unwrap()
                .unwrap();
            self.state.tokens.issue(&identity).unwrap()
        }

        async fn request(&self, request: axum::http::Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = axum::http::Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.request(request).await
        }
    }

    fn error_code(body: &Value) -> &str {
        body["error"]["code"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::new().await;
        let request = axum::http::Request::get("/health").body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = TestApp::new().await;
        let (status, body) = app.call(Method::GET, "/api/tasks", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "unauthorized");

        let (status, _) = app
            .call(Method::GET, "/api/tasks", Some("not.a.token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_gate_blocks_wrong_roles() {
        let app = TestApp::new().await;
        let employee = app.token_for(&app.org.employee_id).await;
        let manager = app.token_for(&app.org.manager_id).await;
        let admin = app.token_for(&app.org.admin_id).await;

        let (status, body) = app.call(Method::GET, "/api/tasks", Some(&employee), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "forbidden");

        let (status, _) = app
            .call(Method::GET, "/api/admin/employees", Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let uri = format!("/api/tasks/approve/{}", app.task_id);
        let (status, _) = app
            .call(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "Approved" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call(Method::GET, "/api/departments", Some(&employee), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_approved_task_is_locked() {
        let app = TestApp::new().await;
        let employee = app.token_for(&app.org.employee_id).await;
        let manager = app.token_for(&app.org.manager_id).await;

        let (status, body) = app
            .call(Method::POST, &format!("/api/tasks/submit/{}", app.task_id), Some(&employee), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Completed");
        assert_eq!(body["approval"]["status"], "Pending");

        let (status, body) = app
            .call(Method::GET, "/api/tasks/approvals", Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/tasks/approve/{}", app.task_id),
                Some(&manager),
                Some(json!({ "status": "Approved", "remark": "good work" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approval"]["status"], "Approved");
        assert_eq!(body["approval"]["remark"], "good work");

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/tasks/{}/status", app.task_id),
                Some(&employee),
                Some(json!({ "status": "Pending" })),
            )
            .await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(error_code(&body), "approval_locked");

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/tasks/approve/{}", app.task_id),
                Some(&manager),
                Some(json!({ "status": "Rejected" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "already_processed");
    }

    #[tokio::test]
    async fn test_employee_cannot_touch_other_tasks() {
        let app = TestApp::new().await;
        let bob = app.token_for(&app.org.other_employee_id).await;

        let (status, _) = app
            .call(Method::GET, &format!("/api/tasks/{}", app.task_id), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/comment", app.task_id),
                Some(&bob),
                Some(json!({ "text": "mine now" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call(Method::GET, "/api/tasks/mine", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_stores_file_and_attaches_it() {
        let app = TestApp::new().await;
        let employee = app.token_for(&app.org.employee_id).await;

        let form = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"comment\"\r\n\r\n",
            "first draft\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"files\"; filename=\"report.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "quarterly numbers\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = axum::http::Request::post(format!("/api/tasks/{}/upload", app.task_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", employee))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(form))
            .unwrap();

        let (status, body) = app.request(request).await;
        assert_eq!(status, StatusCode::OK);

        let uploads = body["uploads"].as_array().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0]["name"], "report.txt");
        assert_eq!(uploads[0]["comment"], "first draft");

        let url = uploads[0]["url"].as_str().unwrap();
        let relative = url.strip_prefix("/uploads/").unwrap();
        let stored = std::fs::read_to_string(app.uploads.path().join(relative)).unwrap();
        assert_eq!(stored, "quarterly numbers");

        let upload_id = uploads[0]["id"].as_str().unwrap();
        let (status, body) = app
            .call(
                Method::DELETE,
                &format!("/api/tasks/{}/upload/{}", app.task_id, upload_id),
                Some(&employee),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["uploads"].as_array().unwrap().is_empty());
        assert!(!app.uploads.path().join(relative).exists());
    }

    fn single_file_form(
        uri: &str,
        token: &str,
        file_name: &str,
        content: &str,
    ) -> axum::http::Request<Body> {
        let form = format!(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {}\r\n\
             --XBOUNDARY--\r\n",
            file_name, content
        );
        axum::http::Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(form))
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_with_files_releases_replaced_bytes() {
        let app = TestApp::new().await;
        let employee = app.token_for(&app.org.employee_id).await;

        let (status, body) = app
            .request(single_file_form(
                &format!("/api/tasks/{}/upload", app.task_id),
                &employee,
                "draft.txt",
                "v1",
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let draft = body["uploads"][0]["url"].as_str().unwrap().to_string();
        let draft_path = app.uploads.path().join(draft.strip_prefix("/uploads/").unwrap());
        assert!(draft_path.exists());

        let (status, body) = app
            .request(single_file_form(
                &format!("/api/tasks/submit/{}", app.task_id),
                &employee,
                "final.txt",
                "v2",
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let uploads = body["uploads"].as_array().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0]["name"], "final.txt");
        let final_url = uploads[0]["url"].as_str().unwrap();
        let final_path = app.uploads.path().join(final_url.strip_prefix("/uploads/").unwrap());

        assert!(!draft_path.exists());
        assert_eq!(std::fs::read_to_string(final_path).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_upload_without_files_is_rejected() {
        let app = TestApp::new().await;
        let employee = app.token_for(&app.org.employee_id).await;

        let form = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"comment\"\r\n\r\n",
            "nothing attached\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = axum::http::Request::post(format!("/api/tasks/{}/upload", app.task_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", employee))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(form))
            .unwrap();

        let (status, body) = app.request(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "validation_error");
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let app = TestApp::new().await;
        let hash = hash_password(PASSWORD).unwrap();
        let id = insert_identity_with_hash(
            &app.state.db,
            "kofi@co.com",
            Role::Accountant,
            Some(&app.org.department_id),
            &hash,
        )
        .await;

        // No verified passcode yet
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/change-password",
                None,
                Some(json!({ "email": "kofi@co.com", "password": "N3w-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(Method::POST, "/api/auth/send-otp", None, Some(json!({ "email": "kofi@co.com" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        let code = app.mailer.last_code_for("kofi@co.com").unwrap();

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/verify-otp",
                None,
                Some(json!({ "email": "kofi@co.com", "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        // The passcode is single use
        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/verify-otp",
                None,
                Some(json!({ "email": "kofi@co.com", "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "otp_not_requested");

        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/change-password",
                None,
                Some(json!({ "email": "kofi@co.com", "password": "N3w-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "kofi@co.com", "password": "N3w-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], id.as_str());
        assert!(body["user"].get("password_hash").is_none());

        let token = body["token"].as_str().unwrap();
        let claims = tokio_test::assert_ok!(app.state.tokens.verify(token));
        assert_eq!(claims.sub, id);
    }

    #[tokio::test]
    async fn test_deactivation_withdraws_reset_grant() {
        let app = TestApp::new().await;
        let admin = app.token_for(&app.org.admin_id).await;
        let hash = hash_password(PASSWORD).unwrap();
        let id = insert_identity_with_hash(
            &app.state.db,
            "ama@co.com",
            Role::Accountant,
            Some(&app.org.department_id),
            &hash,
        )
        .await;

        app.call(Method::POST, "/api/auth/send-otp", None, Some(json!({ "email": "ama@co.com" })))
            .await;
        let code = app.mailer.last_code_for("ama@co.com").unwrap();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/verify-otp",
                None,
                Some(json!({ "email": "ama@co.com", "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let status_uri = format!("/api/admin/employees/{}/status", id);
        let (status, _) = app
            .call(Method::PUT, &status_uri, Some(&admin), Some(json!({ "status": "Inactive" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let change = json!({ "email": "ama@co.com", "password": "N3w-password" });
        let (status, _) = app
            .call(Method::POST, "/api/auth/change-password", None, Some(change.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Reactivating does not bring the old grant back.
        let (status, _) = app
            .call(Method::PUT, &status_uri, Some(&admin), Some(json!({ "status": "Active" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call(Method::POST, "/api/auth/change-password", None, Some(change))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ama@co.com", "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let app = TestApp::new().await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "nobody@co.com", "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_setup_only_while_no_admin() {
        let app = TestApp::new().await;
        let (status, body) = app.call(Method::GET, "/api/auth/setup-status", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["needs_setup"], false);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/setup",
                None,
                Some(json!({ "email": "new@co.com", "password": PASSWORD, "name": "New" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_manages_accounts_and_departments() {
        let app = TestApp::new().await;
        let admin = app.token_for(&app.org.admin_id).await;

        let (status, department) = app
            .call(
                Method::POST,
                "/api/admin/departments",
                Some(&admin),
                Some(json!({ "name": "Finance" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let department_id = department["id"].as_str().unwrap().to_string();

        let (status, created) = app
            .call(
                Method::POST,
                "/api/admin/employees",
                Some(&admin),
                Some(json!({
                    "name": "Esi",
                    "email": "esi@co.com",
                    "password": PASSWORD,
                    "role": "Manager",
                    "department_id": department_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let manager_id = created["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::POST,
                "/api/admin/employees",
                Some(&admin),
                Some(json!({
                    "name": "Esi Again",
                    "email": "ESI@co.com",
                    "password": PASSWORD,
                    "role": "Designer",
                    "department_id": department_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", body);

        let uri = format!("/api/admin/departments/{}/manager", department_id);
        let (status, body) = app
            .call(Method::PUT, &uri, Some(&admin), Some(json!({ "manager_id": manager_id })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["manager_id"], manager_id.as_str());

        let (status, _) = app
            .call(
                Method::PUT,
                &uri,
                Some(&admin),
                Some(json!({ "manager_id": app.org.manager_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/admin/employees/{}/status", manager_id);
        let (status, body) = app
            .call(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "Inactive" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Inactive");

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "esi@co.com", "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
    }

    #[tokio::test]
    async fn test_admin_email_change_needs_passcode_for_new_address() {
        let app = TestApp::new().await;
        let admin = app.token_for(&app.org.admin_id).await;

        let (status, body) = app
            .call(
                Method::POST,
                "/api/admin/profile/send-otp",
                Some(&admin),
                Some(json!({ "email": "maria@co.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", body);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/admin/profile/send-otp",
                Some(&admin),
                Some(json!({ "email": "chief@co.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let code = app.mailer.last_code_for("chief@co.com").unwrap();

        let (status, body) = app
            .call(
                Method::POST,
                "/api/admin/profile/verify-otp",
                Some(&admin),
                Some(json!({ "email": "chief@co.com", "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["email"], "chief@co.com");

        let (status, body) = app.call(Method::GET, "/api/admin/profile", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "chief@co.com");
    }
}
