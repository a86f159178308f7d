use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::Claims;
use crate::authority::Authority;
use crate::config::ServiceInfo;
use crate::error::AuthError;
use crate::models::{
    ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse, HealthResponse,
    LoginRequest, LoginResponse, MessageResponse, NewUser, ResetPasswordRequest, RolesResponse,
    TemporaryPasswordResponse, UserFilter,
};

#[get("/")]
pub async fn index(service: web::Data<ServiceInfo>) -> impl Responder {
    let prefix = &service.api_prefix;
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{name}</title>
    <style>
        body {{
            background-color: #0d0d0d;
            color: #00ffcc;
            font-family: monospace;
            padding: 40px;
        }}
        h1 {{ color: #ff00ff; }}
        li {{ margin-bottom: 10px; }}
        code {{ background: #1a1a1a; padding: 2px 6px; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>{name} v{version}</h1>
    <ul>
        <li><code>GET /health</code> – Service and database status</li>
        <li><code>POST {prefix}/register</code> – Create an account</li>
        <li><code>POST {prefix}/login</code> – Exchange credentials for a bearer token</li>
        <li><code>GET {prefix}/me</code> – Current account (bearer)</li>
        <li><code>PATCH {prefix}/password</code> – Change password (bearer)</li>
        <li><code>POST {prefix}/logout</code> – End the session (bearer)</li>
        <li><code>POST {prefix}/forgot-password</code> – Request a reset code</li>
        <li><code>POST {prefix}/reset-password</code> – Set a new password with a code</li>
        <li><code>GET {prefix}/users/roles</code> – Available roles</li>
        <li><code>GET {prefix}/users</code> – List users (admin)</li>
        <li><code>GET {prefix}/users/{{id}}</code> – One user (admin)</li>
        <li><code>PATCH {prefix}/users/{{id}}/toggle-status</code> – Flip status (admin)</li>
        <li><code>POST {prefix}/users/{{id}}/reset-password</code> – Temp password (admin)</li>
    </ul>
</body>
</html>"#,
        name = service.name,
        version = service.version,
        prefix = prefix,
    );

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

/// Liveness plus a store ping
#[get("/health")]
pub async fn health(
    authority: web::Data<Authority>,
    service: web::Data<ServiceInfo>,
) -> impl Responder {
    let database = authority.database_status().await;
    HttpResponse::Ok().json(HealthResponse {
        status: if database == "connected" { "healthy" } else { "unhealthy" }.to_string(),
        service: service.name.clone(),
        version: service.version.clone(),
        database: database.to_string(),
    })
}

#[post("/login")]
pub async fn login(
    authority: web::Data<Authority>,
    data: web::Json<LoginRequest>,
) -> Result<HttpResponse, AuthError> {
    let outcome = authority
        .login(&data.identity, &data.password, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: outcome.token.token,
        token_type: "bearer".to_string(),
        expires_in: outcome.token.expires_in,
        user: outcome.user,
    }))
}

#[post("/register")]
pub async fn register(
    authority: web::Data<Authority>,
    data: web::Json<NewUser>,
) -> Result<HttpResponse, AuthError> {
    let user = authority.register(data.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Created().json(user))
}

#[post("/forgot-password")]
pub async fn forgot_password(
    authority: web::Data<Authority>,
    data: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AuthError> {
    let reset_code = authority
        .request_reset_code(&data.identity, Utc::now())
        .await?;

    // Same answer whether or not the account exists.
    Ok(HttpResponse::Ok().json(ForgotPasswordResponse {
        message: "If the account exists, a reset code has been issued".to_string(),
        reset_code,
    }))
}

#[post("/reset-password")]
pub async fn reset_password(
    authority: web::Data<Authority>,
    data: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AuthError> {
    authority
        .reset_password(
            &data.identity,
            &data.reset_code,
            &data.new_password,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Password reset".to_string(),
        detail: "Log in with the new password".to_string(),
    }))
}

#[get("/users/roles")]
pub async fn roles() -> impl Responder {
    HttpResponse::Ok().json(RolesResponse::all())
}

// The handlers below sit behind the bearer middleware, which puts the
// validated claims into the request.

pub async fn me(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AuthError> {
    let user = authority.current_user(&claims).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Tokens are stateless; the client is expected to drop its copy. The
/// account behind the token must still exist and be active.
pub async fn logout(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AuthError> {
    let user = authority.current_user(&claims).await?;
    info!(
        event = "auth.logout",
        user_id = %user.id,
        identity = %user.identity,
        "User logged out"
    );
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out".to_string(),
        detail: "Discard the access token on the client".to_string(),
    }))
}

pub async fn change_password(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
    data: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AuthError> {
    let user = authority
        .change_password(
            &claims.sub,
            &data.current_password,
            &data.new_password,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

// Administrator routes. The bearer middleware authenticates; the authority
// checks the role.

pub async fn list_users(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
    filter: web::Query<UserFilter>,
) -> Result<HttpResponse, AuthError> {
    let users = authority.list_users(&claims, &filter).await?;
    Ok(HttpResponse::Ok().json(users))
}

pub async fn get_user(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AuthError> {
    let user = authority.get_user(&claims, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn toggle_status(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AuthError> {
    let user = authority
        .toggle_status(&claims, path.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn reset_user_password(
    authority: web::Data<Authority>,
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AuthError> {
    let (user, temporary_password) = authority
        .issue_temporary_password(&claims, path.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(TemporaryPasswordResponse {
        message: "Temporary password issued".to_string(),
        temporary_password,
        user,
    }))
}
