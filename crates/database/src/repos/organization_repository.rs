use sqlx::SqlitePool;

use crate::entities::{
    Event, NewOrganization, OrgRole, Organization, OrganizationDetail, OrganizationMember,
};
use crate::repos::event_repository::validate_slug;
use crate::repos::EventRepository;
use crate::types::{new_id, now, DatabaseError, DatabaseResult};

macro_rules! organization_select {
    () => {
        "SELECT id, name, slug, description, created_by, created_at, updated_at FROM organizations"
    };
}

#[derive(Clone)]
pub struct OrganizationRepository {
    pool: SqlitePool,
}

impl OrganizationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an organization; the creator becomes its first `org_admin`.
    pub async fn create(
        &self,
        creator_id: &str,
        request: &NewOrganization,
    ) -> DatabaseResult<Organization> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DatabaseError::Validation("Organization name is required".to_string()));
        }
        validate_slug(&request.slug)?;

        let id = new_id();
        let created_at = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO organizations (id, name, slug, description, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(&request.slug)
        .bind(&request.description)
        .bind(creator_id)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| DatabaseError::conflict_or(err, "Organization slug already exists"))?;

        sqlx::query(
            "INSERT INTO organization_memberships (id, organization_id, user_id, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&id)
        .bind(creator_id)
        .bind(OrgRole::OrgAdmin)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        sqlx::query_as::<_, Organization>(concat!(organization_select!(), " WHERE id = ?"))
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)
    }

    pub async fn list(&self) -> DatabaseResult<Vec<Organization>> {
        let organizations =
            sqlx::query_as::<_, Organization>(concat!(organization_select!(), " ORDER BY name"))
                .fetch_all(&self.pool)
                .await?;
        Ok(organizations)
    }

    pub async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Organization>> {
        let organization =
            sqlx::query_as::<_, Organization>(concat!(organization_select!(), " WHERE slug = ?"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(organization)
    }

    pub async fn membership_role(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> DatabaseResult<Option<OrgRole>> {
        let role = sqlx::query_scalar::<_, OrgRole>(
            "SELECT role FROM organization_memberships WHERE organization_id = ? AND user_id = ?",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    pub async fn members(&self, organization_id: &str) -> DatabaseResult<Vec<OrganizationMember>> {
        let members = sqlx::query_as::<_, OrganizationMember>(
            "SELECT m.user_id, u.email, u.name, m.role, m.created_at FROM organization_memberships m \
             JOIN users u ON u.id = m.user_id WHERE m.organization_id = ? ORDER BY m.created_at",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    pub async fn detail(&self, organization: Organization) -> DatabaseResult<OrganizationDetail> {
        let members = self.members(&organization.id).await?;
        let events: Vec<Event> = EventRepository::new(self.pool.clone())
            .list_for_organization(&organization.id)
            .await?;
        Ok(OrganizationDetail {
            organization,
            members,
            events,
        })
    }

    pub async fn add_member(
        &self,
        organization_id: &str,
        user_id: &str,
        role: OrgRole,
    ) -> DatabaseResult<OrganizationMember> {
        let user: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        if user.is_none() {
            return Err(DatabaseError::NotFound("User"));
        }

        sqlx::query(
            "INSERT INTO organization_memberships (id, organization_id, user_id, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(organization_id)
        .bind(user_id)
        .bind(role)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(|err| DatabaseError::conflict_or(err, "User is already a member of this organization"))?;

        let member = sqlx::query_as::<_, OrganizationMember>(
            "SELECT m.user_id, u.email, u.name, m.role, m.created_at FROM organization_memberships m \
             JOIN users u ON u.id = m.user_id WHERE m.organization_id = ? AND m.user_id = ?",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(member)
    }

    pub async fn remove_member(&self, organization_id: &str, user_id: &str) -> DatabaseResult<()> {
        let result = sqlx::query(
            "DELETE FROM organization_memberships WHERE organization_id = ? AND user_id = ?",
        )
        .bind(organization_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Membership"));
        }
        Ok(())
    }
}
