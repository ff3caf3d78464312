//! OpenAPI document for the REST surface.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ErrorResponse;
use crate::rest;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Conducky API",
        description = "Code of conduct incident reporting and management"
    ),
    paths(
        rest::health::health_check,
        rest::auth::register,
        rest::auth::login,
        rest::auth::logout,
        rest::auth::session,
        rest::auth::forgot_password,
        rest::auth::validate_reset_token,
        rest::auth::reset_password,
        rest::auth::oauth_login,
        rest::auth::oauth_callback,
        rest::users::get_me,
        rest::users::update_me,
        rest::users::change_password,
        rest::users::my_events,
        rest::users::my_reports,
        rest::users::my_notifications,
        rest::events::create_event,
        rest::events::list_events,
        rest::events::get_event,
        rest::events::update_event,
        rest::events::event_users,
        rest::events::assign_role,
        rest::events::remove_role,
        rest::events::event_audit,
        rest::invites::create_invite,
        rest::invites::list_invites,
        rest::invites::update_invite,
        rest::invites::preview_invite,
        rest::invites::redeem_invite,
        rest::reports::create_report,
        rest::reports::list_reports,
        rest::reports::get_report,
        rest::reports::change_state,
        rest::reports::change_assignment,
        rest::evidence::upload_evidence,
        rest::evidence::list_evidence,
        rest::evidence::download_evidence,
        rest::comments::create_comment,
        rest::comments::list_comments,
        rest::notifications::mark_read,
        rest::notifications::mark_all_read,
        rest::notifications::delete_notification,
        rest::organizations::create_organization,
        rest::organizations::list_organizations,
        rest::organizations::get_organization,
        rest::organizations::add_member,
        rest::organizations::remove_member,
        rest::admin::list_users,
    ),
    components(
        schemas(
            ErrorResponse,
            rest::MessageResponse,
            rest::health::HealthResponse,
            rest::auth::RegisterRequest,
            rest::auth::RegisteredUser,
            rest::auth::LoginRequest,
            rest::auth::LoginResponse,
            rest::auth::SessionResponse,
            rest::auth::ForgotPasswordRequest,
            rest::auth::ResetTokenStatus,
            rest::auth::ResetPasswordRequest,
            rest::auth::OAuthLoginResponse,
            rest::auth::OAuthCallbackRequest,
            rest::users::ChangePasswordRequest,
            rest::users::NotificationList,
            rest::events::EventDetail,
            rest::events::RoleAssignment,
            rest::invites::InviteStatusUpdate,
            rest::invites::RedeemResponse,
            rest::reports::ReportDetail,
            rest::reports::StateChange,
            rest::reports::AssignmentChange,
            rest::comments::CommentView,
            rest::notifications::MarkAllReadResponse,
            rest::organizations::AddMemberRequest,
            conducky_database::User,
            conducky_database::UserWithRoles,
            conducky_database::ProfileUpdate,
            conducky_database::RoleName,
            conducky_database::Event,
            conducky_database::NewEvent,
            conducky_database::EventUpdate,
            conducky_database::EventMember,
            conducky_database::UserEventSummary,
            conducky_database::EventInvite,
            conducky_database::NewInvite,
            conducky_database::InvitePreview,
            conducky_database::Report,
            conducky_database::NewReport,
            conducky_database::ReportType,
            conducky_database::ReportState,
            conducky_database::Comment,
            conducky_database::NewComment,
            conducky_database::CommentVisibility,
            conducky_database::EvidenceFile,
            conducky_database::Notification,
            conducky_database::NotificationPriority,
            conducky_database::Organization,
            conducky_database::NewOrganization,
            conducky_database::OrganizationMember,
            conducky_database::OrganizationDetail,
            conducky_database::OrgRole,
            conducky_database::AuditLog,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and database reachability"),
        (name = "Auth", description = "Local and social authentication"),
        (name = "Users", description = "The calling user's profile and memberships"),
        (name = "Events", description = "Event administration and roles"),
        (name = "Invites", description = "Event invite links"),
        (name = "Reports", description = "Incident reports"),
        (name = "Evidence", description = "Files attached to reports"),
        (name = "Comments", description = "Report discussion"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Organizations", description = "Organizations and their members"),
        (name = "Admin", description = "System administration"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("connect.sid"))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths_and_security_schemes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/register",
            "/api/events/slug/{slug}/reports",
            "/api/reports/{reportId}/evidence/{evidence_id}",
            "/invites/{code}/redeem",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(components.security_schemes.contains_key("session_cookie"));
    }

    #[test]
    fn evidence_upload_is_documented_as_multipart() {
        use utoipa::openapi::PathItemType;

        let doc = ApiDoc::openapi();
        let upload = doc
            .paths
            .paths
            .get("/api/reports/{reportId}/evidence")
            .and_then(|item| item.operations.get(&PathItemType::Post))
            .expect("upload operation");
        let body = upload.request_body.as_ref().expect("request body");
        assert!(body.content.contains_key("multipart/form-data"));
    }
}
