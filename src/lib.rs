//! Authentication service: password verification, access token issuance and
//! validation, user registration and account administration, served over
//! actix-web.

pub mod auth;
pub mod authority;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod password;
pub mod recovery;
pub mod registration;
pub mod user_handlers;

use actix_web::web;
use actix_web_httpauth::middleware::HttpAuthentication;

/// Mount every route. Expects `web::Data<Authority>` and
/// `web::Data<ServiceInfo>` in the app data.
pub fn configure(cfg: &mut web::ServiceConfig, api_prefix: &str) {
    cfg.service(user_handlers::index)
        .service(user_handlers::health)
        .service(
            web::scope(api_prefix)
                .service(user_handlers::login)
                .service(user_handlers::register)
                .service(user_handlers::health)
                .service(user_handlers::forgot_password)
                .service(user_handlers::reset_password)
                // Public, so it is registered ahead of the guarded scope.
                .service(user_handlers::roles)
                .service(
                    web::resource("/me")
                        .wrap(HttpAuthentication::bearer(auth::validator))
                        .route(web::get().to(user_handlers::me)),
                )
                .service(
                    web::resource("/logout")
                        .wrap(HttpAuthentication::bearer(auth::validator))
                        .route(web::post().to(user_handlers::logout)),
                )
                .service(
                    web::resource("/password")
                        .wrap(HttpAuthentication::bearer(auth::validator))
                        .route(web::patch().to(user_handlers::change_password)),
                )
                .service(
                    web::scope("/users")
                        .wrap(HttpAuthentication::bearer(auth::validator))
                        .route("", web::get().to(user_handlers::list_users))
                        .route("/{id}", web::get().to(user_handlers::get_user))
                        .route(
                            "/{id}/toggle-status",
                            web::patch().to(user_handlers::toggle_status),
                        )
                        .route(
                            "/{id}/reset-password",
                            web::post().to(user_handlers::reset_user_password),
                        ),
                ),
        );
}
