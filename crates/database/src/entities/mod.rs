//! Row types and request payloads shared by the repositories and the HTTP layer.

pub mod audit;
pub mod comment;
pub mod event;
pub mod evidence;
pub mod invite;
pub mod notification;
pub mod organization;
pub mod report;
pub mod role;
pub mod user;

pub use audit::{AuditEntry, AuditLog};
pub use comment::{Comment, CommentVisibility, NewComment};
pub use event::{Event, EventMember, EventUpdate, NewEvent, UserEventSummary};
pub use evidence::{EvidenceContent, EvidenceFile, NewEvidence};
pub use invite::{EventInvite, InvitePreview, NewInvite};
pub use notification::{NewNotification, Notification, NotificationPriority};
pub use organization::{
    NewOrganization, OrgRole, Organization, OrganizationDetail, OrganizationMember,
};
pub use report::{NewReport, Report, ReportFilter, ReportState, ReportType};
pub use role::{RoleName, ADMINS, MEMBERS, RESPONDERS, SUPER_ADMIN_ONLY};
pub use user::{ProfileUpdate, User, UserWithRoles};
