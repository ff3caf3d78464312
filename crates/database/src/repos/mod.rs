//! Database repository implementations

pub mod audit_repository;
pub mod comment_repository;
pub mod event_repository;
pub mod evidence_repository;
pub mod invite_repository;
pub mod notification_repository;
pub mod organization_repository;
pub mod report_repository;
pub mod role_repository;
pub mod user_repository;

pub use audit_repository::{log_audit, AuditRepository};
pub use comment_repository::CommentRepository;
pub use event_repository::{validate_slug, EventRepository};
pub use evidence_repository::EvidenceRepository;
pub use invite_repository::InviteRepository;
pub use notification_repository::NotificationRepository;
pub use organization_repository::OrganizationRepository;
pub use report_repository::ReportRepository;
pub use role_repository::RoleRepository;
pub use user_repository::{CleanupSummary, UserRepository};
