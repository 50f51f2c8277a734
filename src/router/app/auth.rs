use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};

use serde::Deserialize;
use tera::Context;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use std::sync::Arc;

use super::render_page;
use crate::{
    data::{
        model::{CurrentUser, UserRole},
        users::{hash_password, verify_password},
    },
    middleware::SESSION_COOKIE,
    AppState,
};

const MIN_PASSWORD_LENGTH: usize = 6;

fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

fn auth_form(
    state: &AppState,
    template: &str,
    email: &str,
    error: Option<&str>,
    current_user: &Option<CurrentUser>,
) -> Response {
    let mut context = Context::new();
    context.insert("email", email);
    context.insert("error", &error);
    render_page(state, template, &context, current_user)
}

fn internal<E: std::fmt::Display>(e: E) -> StatusCode {
    tracing::error!("auth failure: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Response {
    auth_form(&state, "views/login.html", "", None, &current_user)
}

#[derive(Deserialize, Debug)]
pub struct LogIn {
    email: String,
    password: String,
}

pub async fn login_form(
    cookies: Cookies,
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Form(log_in): Form<LogIn>,
) -> Result<Response, StatusCode> {
    let email = log_in.email.trim().to_lowercase();

    let credentials = state
        .user_repo
        .find_credentials(&email)
        .await
        .map_err(internal)?;

    let user_id = match credentials {
        Some(credentials) if verify_password(&log_in.password, &credentials.password) => {
            credentials.id
        }
        _ => {
            tracing::info!("failed login for {}", email);
            return Ok(auth_form(
                &state,
                "views/login.html",
                &email,
                Some("Invalid email or password"),
                &current_user,
            ));
        }
    };

    let token = state
        .user_repo
        .create_session(user_id)
        .await
        .map_err(internal)?;
    cookies.add(session_cookie(token));

    tracing::info!("user {} logged in", user_id);
    Ok(Redirect::to("/chat").into_response())
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Response {
    auth_form(&state, "views/signup.html", "", None, &current_user)
}

#[derive(Deserialize, Debug)]
pub struct SignUp {
    email: String,
    password: String,
    password_confirmation: String,
}

impl SignUp {
    fn problem(&self, email: &str) -> Option<&'static str> {
        if email.is_empty() {
            Some("Email is required")
        } else if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            Some("Password must be at least 6 characters")
        } else if self.password != self.password_confirmation {
            Some("Passwords do not match")
        } else {
            None
        }
    }
}

pub async fn signup_form(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Form(sign_up): Form<SignUp>,
) -> Result<Response, StatusCode> {
    let email = sign_up.email.trim().to_lowercase();

    if let Some(problem) = sign_up.problem(&email) {
        return Ok(auth_form(
            &state,
            "views/signup.html",
            &email,
            Some(problem),
            &current_user,
        ));
    }

    let role = match &state.config.admin_email {
        Some(admin_email) if admin_email.trim().eq_ignore_ascii_case(&email) => UserRole::Admin,
        _ => UserRole::Child,
    };

    let password_hash = hash_password(&sign_up.password).map_err(internal)?;

    match state.user_repo.create_user(&email, &password_hash, role).await {
        Ok(user_id) => {
            tracing::info!("user {} signed up as {:?}", user_id, role);
            Ok(Redirect::to("/login").into_response())
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(auth_form(
            &state,
            "views/signup.html",
            &email,
            Some("An account with this email already exists"),
            &current_user,
        )),
        Err(e) => Err(internal(e)),
    }
}

pub async fn logout(cookies: Cookies, State(state): State<Arc<AppState>>) -> Redirect {
    if let Some(token) = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        if let Err(e) = state.user_repo.delete_session(&token).await {
            tracing::warn!("failed to delete session: {}", e);
        }
    }

    let mut cookie = session_cookie(String::new());
    cookie.make_removal();
    cookies.add(cookie);

    Redirect::to("/")
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::{
        knowledge::client::tests::dead_service,
        middleware::SESSION_COOKIE,
        test_support::{get, text_body, TestApp},
    };

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn session_from(response: &axum::response::Response) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(SESSION_COOKIE))
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let app = TestApp::new(dead_service()).await;

        let response = app
            .app
            .clone()
            .oneshot(form(
                "/signup",
                "email=Kid%40Test.com&password=secret1&password_confirmation=secret1",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = app
            .app
            .clone()
            .oneshot(form("/login", "email=kid%40test.com&password=secret1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));

        let cookie = session_from(&response).unwrap();
        let token = cookie.trim_start_matches(&format!("{}=", SESSION_COOKIE));
        let user = app.state.user_repo.session_user(token).await.unwrap().unwrap();
        assert_eq!(user.email, "kid@test.com");
        assert!(!user.is_admin());

        let response = app.app.clone().oneshot(get("/chat", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_email_signs_up_as_admin() {
        let app = TestApp::new(dead_service()).await;

        app.app
            .clone()
            .oneshot(form(
                "/signup",
                "email=admin%40test.com&password=secret1&password_confirmation=secret1",
            ))
            .await
            .unwrap();
        let response = app
            .app
            .clone()
            .oneshot(form("/login", "email=admin%40test.com&password=secret1"))
            .await
            .unwrap();
        let cookie = session_from(&response).unwrap();

        let response = app
            .app
            .clone()
            .oneshot(get("/admin/knowledge", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signup_problems_rerender_form() {
        let app = TestApp::new(dead_service()).await;

        let cases = [
            ("email=&password=secret1&password_confirmation=secret1", "Email is required"),
            (
                "email=kid%40test.com&password=short&password_confirmation=short",
                "Password must be at least 6 characters",
            ),
            (
                "email=kid%40test.com&password=secret1&password_confirmation=secret2",
                "Passwords do not match",
            ),
        ];
        for (body, message) in cases {
            let response = app.app.clone().oneshot(form("/signup", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(text_body(response).await.contains(message), "{}", message);
        }

        let body = "email=kid%40test.com&password=secret1&password_confirmation=secret1";
        app.app.clone().oneshot(form("/signup", body)).await.unwrap();
        let response = app.app.clone().oneshot(form("/signup", body)).await.unwrap();
        assert!(text_body(response)
            .await
            .contains("An account with this email already exists"));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let app = TestApp::new(dead_service()).await;
        app.login("kid@test.com", crate::data::model::UserRole::Child)
            .await;

        let response = app
            .app
            .clone()
            .oneshot(form("/login", "email=kid%40test.com&password=wrong"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_from(&response).is_none());
        assert!(text_body(response).await.contains("Invalid email or password"));
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let app = TestApp::new(dead_service()).await;
        let (_, cookie, _) = app
            .login("kid@test.com", crate::data::model::UserRole::Child)
            .await;

        let response = app.app.clone().oneshot(get("/logout", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let token = cookie.trim_start_matches(&format!("{}=", SESSION_COOKIE));
        assert!(app.state.user_repo.session_user(token).await.unwrap().is_none());

        let response = app.app.clone().oneshot(get("/chat", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}
