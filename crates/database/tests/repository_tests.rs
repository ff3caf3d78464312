use std::str::FromStr;

use conducky_database::{
    log_audit, AuditEntry, AuditRepository, CommentRepository, CommentVisibility, DatabaseError,
    EventRepository, EventUpdate, EvidenceRepository, InviteRepository, NewComment, NewEvent,
    NewEvidence, NewInvite, NewNotification, NewOrganization, NewReport, NotificationPriority, NotificationRepository,
    OrgRole, OrganizationRepository, ReportFilter, ReportRepository, ReportState, ReportType,
    RoleName, RoleRepository, UserRepository, MIGRATOR,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

struct TestContext {
    pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_url = format!("sqlite://{}", temp_dir.path().join("repos.sqlite").display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            _temp_dir: temp_dir,
        })
    }

    async fn insert_user(&self, email: &str) -> TestResult<String> {
        let id = conducky_database::new_id();
        let now = conducky_database::now();
        sqlx::query("INSERT INTO users (id, email, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(email.split('@').next())
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_event(&self, slug: &str) -> TestResult<String> {
        let event = EventRepository::new(self.pool.clone())
            .create(&NewEvent {
                name: format!("Event {slug}"),
                slug: slug.to_string(),
                description: None,
                organization_id: None,
            })
            .await?;
        Ok(event.id)
    }

    async fn insert_report(&self, event_id: &str, reporter_id: &str) -> TestResult<String> {
        let report = ReportRepository::new(self.pool.clone())
            .create(
                event_id,
                reporter_id,
                &NewReport {
                    report_type: ReportType::Harassment,
                    title: "Hallway incident".into(),
                    description: "Details".into(),
                    incident_at: None,
                    location: Some("Hall B".into()),
                },
            )
            .await?;
        Ok(report.id)
    }
}

#[tokio::test]
async fn log_audit_rejects_missing_or_blank_fields() -> TestResult {
    let ctx = TestContext::new().await?;
    let event_id = ctx.insert_event("audit-event").await?;

    let missing = [
        AuditEntry {
            event_id: None,
            ..AuditEntry::new(&event_id, None, "update", "Event", &event_id)
        },
        AuditEntry {
            action: Some("   ".into()),
            ..AuditEntry::new(&event_id, None, "update", "Event", &event_id)
        },
        AuditEntry {
            target_type: None,
            ..AuditEntry::new(&event_id, None, "update", "Event", &event_id)
        },
        AuditEntry {
            target_id: Some(String::new()),
            ..AuditEntry::new(&event_id, None, "update", "Event", &event_id)
        },
    ];

    for entry in missing {
        let err = log_audit(&ctx.pool, entry).await.expect_err("entry should be rejected");
        assert!(matches!(err, DatabaseError::MissingRequiredFields));
        assert_eq!(err.to_string(), "Missing required fields");
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(count, 0);
    Ok(())
}

#[tokio::test]
async fn log_audit_persists_exactly_the_given_fields() -> TestResult {
    let ctx = TestContext::new().await?;
    let user_id = ctx.insert_user("admin@example.com").await?;
    let event_id = ctx.insert_event("audit-persist").await?;

    let log = log_audit(
        &ctx.pool,
        AuditEntry::new(&event_id, Some(user_id.clone()), "role.assigned", "User", "target-1"),
    )
    .await?;

    let stored = AuditRepository::new(ctx.pool.clone())
        .list_for_event(&event_id, 10, 0)
        .await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, log.id);
    assert_eq!(stored[0].user_id.as_deref(), Some(user_id.as_str()));
    assert_eq!(stored[0].action, "role.assigned");
    assert_eq!(stored[0].target_type, "User");
    assert_eq!(stored[0].target_id, "target-1");
    Ok(())
}

#[tokio::test]
async fn event_slugs_are_unique_and_validated() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.insert_event("pycon-2025").await?;

    let events = EventRepository::new(ctx.pool.clone());
    let duplicate = events
        .create(&NewEvent {
            name: "Other".into(),
            slug: "pycon-2025".into(),
            description: None,
            organization_id: None,
        })
        .await
        .expect_err("duplicate slug must fail");
    assert!(matches!(duplicate, DatabaseError::Conflict(_)));

    let invalid = events
        .create(&NewEvent {
            name: "Bad".into(),
            slug: "Bad Slug".into(),
            description: None,
            organization_id: None,
        })
        .await
        .expect_err("invalid slug must fail");
    assert!(matches!(invalid, DatabaseError::Validation(_)));

    let event = events.find_by_slug("pycon-2025").await?.expect("event exists");
    let updated = events
        .update(
            &event.id,
            &EventUpdate {
                code_of_conduct: Some("Be excellent".into()),
                ..EventUpdate::default()
            },
        )
        .await?;
    assert_eq!(updated.code_of_conduct.as_deref(), Some("Be excellent"));
    assert_eq!(updated.name, event.name);
    Ok(())
}

#[tokio::test]
async fn event_roles_are_unique_and_checked_by_name() -> TestResult {
    let ctx = TestContext::new().await?;
    let user_id = ctx.insert_user("responder@example.com").await?;
    let event_id = ctx.insert_event("roles-event").await?;
    let roles = RoleRepository::new(ctx.pool.clone());

    roles.assign_event_role(&user_id, &event_id, RoleName::Responder).await?;
    let duplicate = roles
        .assign_event_role(&user_id, &event_id, RoleName::Responder)
        .await
        .expect_err("duplicate assignment must fail");
    assert!(matches!(duplicate, DatabaseError::Conflict(_)));

    let super_admin = roles
        .assign_event_role(&user_id, &event_id, RoleName::SuperAdmin)
        .await
        .expect_err("SuperAdmin is global only");
    assert!(matches!(super_admin, DatabaseError::Validation(_)));

    assert!(roles.has_any_event_role(&user_id, &event_id, &[RoleName::Responder, RoleName::Admin]).await?);
    assert!(!roles.has_any_event_role(&user_id, &event_id, &[RoleName::Admin]).await?);
    assert!(!roles.has_any_event_role(&user_id, &event_id, &[]).await?);

    let members = roles.event_members(&event_id).await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].roles, vec![RoleName::Responder]);

    roles.remove_event_role(&user_id, &event_id, RoleName::Responder).await?;
    assert!(roles.event_roles(&user_id, &event_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn report_transitions_follow_the_lifecycle() -> TestResult {
    let ctx = TestContext::new().await?;
    let user_id = ctx.insert_user("reporter@example.com").await?;
    let event_id = ctx.insert_event("report-event").await?;
    let report_id = ctx.insert_report(&event_id, &user_id).await?;
    let reports = ReportRepository::new(ctx.pool.clone());

    let err = reports
        .transition(&report_id, ReportState::Resolved)
        .await
        .expect_err("submitted -> resolved is not allowed");
    assert!(matches!(
        err,
        DatabaseError::InvalidTransition {
            from: ReportState::Submitted,
            to: ReportState::Resolved
        }
    ));

    let (previous, report) = reports.transition(&report_id, ReportState::Acknowledged).await?;
    assert_eq!(previous, ReportState::Submitted);
    assert_eq!(report.state, ReportState::Acknowledged);

    reports.transition(&report_id, ReportState::Closed).await?;
    let (_, reopened) = reports.transition(&report_id, ReportState::Investigating).await?;
    assert_eq!(reopened.state, ReportState::Investigating);

    let filtered = reports
        .list_for_event(
            &event_id,
            &ReportFilter {
                state: Some(ReportState::Submitted),
                limit: 10,
                offset: 0,
            },
        )
        .await?;
    assert!(filtered.is_empty());

    let all = reports
        .list_for_event(&event_id, &ReportFilter { state: None, limit: 10, offset: 0 })
        .await?;
    assert_eq!(all.len(), 1);
    assert_eq!(reports.event_id_for(&report_id).await?, Some(event_id));
    Ok(())
}

#[tokio::test]
async fn internal_comments_are_hidden_unless_requested() -> TestResult {
    let ctx = TestContext::new().await?;
    let user_id = ctx.insert_user("commenter@example.com").await?;
    let event_id = ctx.insert_event("comment-event").await?;
    let report_id = ctx.insert_report(&event_id, &user_id).await?;
    let comments = CommentRepository::new(ctx.pool.clone());

    comments
        .create(&report_id, &user_id, &NewComment { body: "visible".into(), visibility: CommentVisibility::Public })
        .await?;
    comments
        .create(&report_id, &user_id, &NewComment { body: "hidden".into(), visibility: CommentVisibility::Internal })
        .await?;

    let public = comments.list_for_report(&report_id, false).await?;
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].body, "visible");
    assert_eq!(public[0].author_name.as_deref(), Some("commenter"));

    assert_eq!(comments.list_for_report(&report_id, true).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn invite_redemption_grants_role_and_counts_uses() -> TestResult {
    let ctx = TestContext::new().await?;
    let admin = ctx.insert_user("admin@example.com").await?;
    let first = ctx.insert_user("first@example.com").await?;
    let second = ctx.insert_user("second@example.com").await?;
    let event_id = ctx.insert_event("invite-event").await?;
    let invites = InviteRepository::new(ctx.pool.clone());

    let invite = invites
        .create(
            &event_id,
            &admin,
            &NewInvite {
                role_name: RoleName::Reporter,
                max_uses: Some(1),
                expires_at: None,
                note: None,
            },
        )
        .await?;

    let redeemed = invites.redeem(&invite.code, &first).await?;
    assert_eq!(redeemed.use_count, 1);
    assert!(RoleRepository::new(ctx.pool.clone())
        .has_any_event_role(&first, &event_id, &[RoleName::Reporter])
        .await?);

    let again = invites.redeem(&invite.code, &first).await.expect_err("exhausted");
    assert!(matches!(again, DatabaseError::Validation(_)));

    let exhausted = invites.redeem(&invite.code, &second).await.expect_err("exhausted");
    assert!(matches!(exhausted, DatabaseError::Validation(_)));

    let preview = invites.preview(&invite.code).await?;
    assert!(!preview.valid);
    assert_eq!(preview.event_slug, "invite-event");
    Ok(())
}

#[tokio::test]
async fn redeeming_a_held_role_conflicts() -> TestResult {
    let ctx = TestContext::new().await?;
    let admin = ctx.insert_user("admin@example.com").await?;
    let member = ctx.insert_user("member@example.com").await?;
    let event_id = ctx.insert_event("held-role").await?;
    RoleRepository::new(ctx.pool.clone())
        .assign_event_role(&member, &event_id, RoleName::Responder)
        .await?;

    let invites = InviteRepository::new(ctx.pool.clone());
    let invite = invites
        .create(
            &event_id,
            &admin,
            &NewInvite { role_name: RoleName::Responder, max_uses: None, expires_at: None, note: None },
        )
        .await?;

    let err = invites.redeem(&invite.code, &member).await.expect_err("already held");
    assert!(matches!(err, DatabaseError::Conflict(_)));

    let reloaded = invites.find_by_code(&invite.code).await?.expect("invite exists");
    assert_eq!(reloaded.use_count, 0, "failed redemption must not count");
    Ok(())
}

#[tokio::test]
async fn notifications_are_scoped_to_their_owner() -> TestResult {
    let ctx = TestContext::new().await?;
    let owner = ctx.insert_user("owner@example.com").await?;
    let other = ctx.insert_user("other@example.com").await?;
    let notifications = NotificationRepository::new(ctx.pool.clone());

    let make = |title: &str| NewNotification {
        user_id: owner.clone(),
        event_id: None,
        report_id: None,
        kind: "report_submitted",
        priority: NotificationPriority::Normal,
        title: title.to_string(),
        message: "message".into(),
        action_url: None,
    };
    notifications.create_many(&[make("one"), make("two")]).await?;

    let listed = notifications.list_for_user(&owner, false, 20, 0).await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(notifications.unread_count(&owner).await?, 2);

    let err = notifications.mark_read(&other, &listed[0].id).await.expect_err("not owner");
    assert!(matches!(err, DatabaseError::NotFound(_)));

    let read = notifications.mark_read(&owner, &listed[0].id).await?;
    assert!(read.is_read);
    assert!(read.read_at.is_some());
    assert_eq!(notifications.list_for_user(&owner, true, 20, 0).await?.len(), 1);

    assert_eq!(notifications.mark_all_read(&owner).await?, 1);
    assert_eq!(notifications.unread_count(&owner).await?, 0);

    assert!(notifications.delete(&other, &listed[1].id).await.is_err());
    notifications.delete(&owner, &listed[1].id).await?;
    assert_eq!(notifications.list_for_user(&owner, false, 20, 0).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn organization_creator_becomes_admin_and_duplicates_conflict() -> TestResult {
    let ctx = TestContext::new().await?;
    let creator = ctx.insert_user("creator@example.com").await?;
    let viewer = ctx.insert_user("viewer@example.com").await?;
    let organizations = OrganizationRepository::new(ctx.pool.clone());

    let org = organizations
        .create(
            &creator,
            &NewOrganization { name: "Community".into(), slug: "community".into(), description: None },
        )
        .await?;
    assert_eq!(organizations.membership_role(&org.id, &creator).await?, Some(OrgRole::OrgAdmin));

    organizations.add_member(&org.id, &viewer, OrgRole::OrgViewer).await?;
    let duplicate = organizations
        .add_member(&org.id, &viewer, OrgRole::OrgAdmin)
        .await
        .expect_err("duplicate membership");
    assert!(matches!(duplicate, DatabaseError::Conflict(_)));

    let detail = organizations.detail(org.clone()).await?;
    assert_eq!(detail.members.len(), 2);

    organizations.remove_member(&org.id, &viewer).await?;
    assert!(organizations.membership_role(&org.id, &viewer).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn delete_with_dependents_removes_owned_rows_and_keeps_reports() -> TestResult {
    let ctx = TestContext::new().await?;
    let user_id = ctx.insert_user("leaving@example.com").await?;
    let event_id = ctx.insert_event("cleanup-event").await?;
    let report_id = ctx.insert_report(&event_id, &user_id).await?;

    let roles = RoleRepository::new(ctx.pool.clone());
    roles.assign_event_role(&user_id, &event_id, RoleName::Reporter).await?;
    roles.grant_global(&user_id, RoleName::SuperAdmin).await?;
    CommentRepository::new(ctx.pool.clone())
        .create(&report_id, &user_id, &NewComment { body: "note".into(), visibility: CommentVisibility::Public })
        .await?;
    sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES ('tok', ?, '2025-01-01T00:00:00.000Z', '2099-01-01T00:00:00.000Z')")
        .bind(&user_id)
        .execute(&ctx.pool)
        .await?;

    let users = UserRepository::new(ctx.pool.clone());
    let summary = users.delete_with_dependents(&user_id).await?;
    assert_eq!(summary.sessions, 1);
    assert_eq!(summary.event_roles, 1);
    assert_eq!(summary.global_roles, 1);
    assert_eq!(summary.detached_records, 2);

    assert!(users.find_by_id(&user_id).await?.is_none());
    let report = ReportRepository::new(ctx.pool.clone()).get(&report_id).await?;
    assert!(report.reporter_id.is_none());

    let missing = users.delete_with_dependents(&user_id).await.expect_err("already gone");
    assert!(matches!(missing, DatabaseError::NotFound("User")));
    Ok(())
}

#[tokio::test]
async fn evidence_batches_are_stored_all_or_nothing() -> TestResult {
    let ctx = TestContext::new().await?;
    let user_id = ctx.insert_user("uploader@example.com").await?;
    let event_id = ctx.insert_event("evidence-event").await?;
    let report_id = ctx.insert_report(&event_id, &user_id).await?;
    let evidence = EvidenceRepository::new(ctx.pool.clone());

    let file = |name: &str, data: &[u8]| NewEvidence {
        filename: name.to_string(),
        mime_type: "text/plain".to_string(),
        data: data.to_vec(),
    };

    let error = evidence
        .create_many(&report_id, &user_id, vec![file("a.txt", b"first"), file("b.txt", b"")])
        .await
        .expect_err("empty file rejects the batch");
    assert!(matches!(error, DatabaseError::Validation(_)));
    assert!(evidence.list_for_report(&report_id).await?.is_empty());

    let stored = evidence
        .create_many(&report_id, &user_id, vec![file("a.txt", b"first"), file("b.txt", b"second")])
        .await?;
    assert_eq!(stored.len(), 2);
    let listed = evidence.list_for_report(&report_id).await?;
    let names: Vec<_> = listed.iter().map(|item| item.filename.as_str()).collect();
    assert_eq!(names, ["a.txt", "b.txt"]);

    let content = evidence.content(&report_id, &stored[1].id).await?;
    assert_eq!(content.data, b"second");
    Ok(())
}
