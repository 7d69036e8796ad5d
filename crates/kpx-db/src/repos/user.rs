//! User repository and actor resolution.

use kpx_core::entities::{AuditEntry, UserProfile};
use kpx_core::enums::{AuditAction, EntityType, Role};
use kpx_core::errors::CoreError;
use kpx_core::identity::Actor;
use kpx_core::ids::PREFIX_USER;

use crate::error::DatabaseError;
use crate::helpers::{
    get_bool, get_opt_string, now_utc, parse_datetime, parse_enum, timestamp,
};
use crate::repos::audit::insert_audit;
use crate::service::{KpxService, finish};

/// Input for [`KpxService::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    /// Required for clients.
    pub company_id: Option<String>,
}

fn row_to_user(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    Ok(UserProfile {
        id: row.get::<String>(0)?,
        email: row.get::<String>(1)?,
        full_name: get_opt_string(row, 2)?,
        role: parse_enum(&row.get::<String>(3)?)?,
        company_id: get_opt_string(row, 4)?,
        is_active: get_bool(row, 5)?,
        created_at: parse_datetime(&row.get::<String>(6)?)?,
    })
}

const SELECT_COLS: &str = "id, email, full_name, role, company_id, is_active, created_at";

async fn insert_user(
    conn: &libsql::Connection,
    user: &UserProfile,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let mut rows = conn
        .query("SELECT 1 FROM users WHERE email = ?1", [user.email.as_str()])
        .await?;
    if rows.next().await?.is_some() {
        return Err(CoreError::Conflict(format!("email {} is already registered", user.email)).into());
    }

    conn.execute(
        "INSERT INTO users (id, email, full_name, role, company_id, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        libsql::params![
            user.id.as_str(),
            user.email.as_str(),
            user.full_name.as_deref(),
            user.role.as_str(),
            user.company_id.as_deref(),
            i64::from(user.is_active),
            timestamp(user.created_at)
        ],
    )
    .await?;
    insert_audit(conn, audit).await
}

async fn write_user_active(
    conn: &libsql::Connection,
    user_id: &str,
    active: bool,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            libsql::params![i64::from(active), user_id],
        )
        .await?;
    if changed == 0 {
        return Err(CoreError::not_found(EntityType::User.as_str(), user_id).into());
    }
    insert_audit(conn, audit).await
}

impl KpxService {
    /// Register a user.
    ///
    /// # Errors
    ///
    /// - `CoreError::Validation` for a malformed email or a client without a company.
    /// - `CoreError::NotFound` if the company does not exist.
    /// - `CoreError::Conflict` if the email is taken.
    pub async fn create_user(&self, new: &NewUser) -> Result<UserProfile, DatabaseError> {
        let email = new.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(CoreError::Validation(format!("invalid email address: {email}")).into());
        }
        if new.role == Role::Client && new.company_id.is_none() {
            return Err(CoreError::Validation("client users must belong to a company".into()).into());
        }
        if let Some(company_id) = new.company_id.as_deref() {
            self.get_company(company_id).await?;
        }

        let now = now_utc();
        let user = UserProfile {
            id: self.db().generate_id(PREFIX_USER).await?,
            email,
            full_name: new
                .full_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
            role: new.role,
            company_id: new.company_id.clone(),
            is_active: true,
            created_at: now,
        };
        let audit = self
            .new_audit(None, EntityType::User, &user.id, AuditAction::Created, None, now)
            .await?;

        let _gate = self.write_gate().await;
        let tx = self.begin().await?;
        let outcome = insert_user(&tx, &user, &audit).await;
        finish(tx, outcome).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the user does not exist.
    pub async fn get_user(&self, id: &str) -> Result<UserProfile, DatabaseError> {
        self.find_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found(EntityType::User.as_str(), id).into())
    }

    /// Look up a user by ID, returning `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLS} FROM users WHERE id = ?1");
        let mut rows = self.db().query_with(&sql, || [id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// Resolve the caller of a request from its user ID.
    ///
    /// Returns `None` for unknown users. Inactive users are returned as-is;
    /// the policy rejects them.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn resolve_actor(&self, user_id: &str) -> Result<Option<Actor>, DatabaseError> {
        Ok(self.find_user(user_id).await?.map(|u| u.to_actor()))
    }

    /// Activate or deactivate a user.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the user does not exist.
    pub async fn set_user_active(
        &self,
        user_id: &str,
        active: bool,
    ) -> Result<UserProfile, DatabaseError> {
        let now = now_utc();
        let detail = serde_json::json!({ "is_active": active });
        let audit = self
            .new_audit(None, EntityType::User, user_id, AuditAction::Updated, Some(detail), now)
            .await?;

        {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = write_user_active(&tx, user_id, active, &audit).await;
            finish(tx, outcome).await?;
        }

        self.get_user(user_id).await
    }

    /// IDs of active admins, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn active_admin_ids(&self) -> Result<Vec<String>, DatabaseError> {
        self.collect_ids(
            "SELECT id FROM users WHERE role = 'admin' AND is_active = 1
             ORDER BY created_at, rowid",
            None,
        )
        .await
    }

    /// IDs of active client users of a company, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn active_client_ids(&self, company_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.collect_ids(
            "SELECT id FROM users WHERE role = 'client' AND is_active = 1 AND company_id = ?1
             ORDER BY created_at, rowid",
            Some(company_id),
        )
        .await
    }

    async fn collect_ids(&self, sql: &str, arg: Option<&str>) -> Result<Vec<String>, DatabaseError> {
        let params: Vec<libsql::Value> = arg
            .map(|a| libsql::Value::Text(a.to_string()))
            .into_iter()
            .collect();
        let mut rows = self
            .db()
            .query_with(sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }
}
