//! OpenAPI Documentation

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Notebase API",
        version = "1.0.0",
        description = "Sessions, users and personal notes"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "users", description = "Login, registration and session refresh"),
        (name = "notes", description = "Personal notes"),
        (name = "monitoring", description = "Health")
    ),
    paths(
        super::users::login,
        super::users::register,
        super::users::logout,
        super::users::me,
        super::notes::list_notes,
        super::notes::create_note,
        super::notes::update_note,
        super::notes::delete_note,
        super::health,
    ),
    components(schemas(
        super::common::ApiError,
        super::common::SuccessResponse,
        super::users::LoginRequest,
        super::users::LoginResponse,
        super::users::LoggedInUser,
        super::users::RegisterRequest,
        super::users::RegisterResponse,
        super::users::MeResponse,
        super::users::SessionUser,
        super::notes::NoteRequest,
        crate::service::NotePage,
        crate::service::NoteView,
        crate::domain::Identity,
    ))
)]
pub struct NotebaseApiDoc;
