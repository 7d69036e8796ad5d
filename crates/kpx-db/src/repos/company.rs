//! Company repository.

use kpx_core::entities::{AuditEntry, Company};
use kpx_core::enums::{AuditAction, EntityType};
use kpx_core::errors::CoreError;
use kpx_core::ids::PREFIX_COMPANY;

use crate::error::DatabaseError;
use crate::helpers::{get_bool, now_utc, parse_datetime, timestamp};
use crate::repos::audit::insert_audit;
use crate::service::{KpxService, finish};

fn row_to_company(row: &libsql::Row) -> Result<Company, DatabaseError> {
    Ok(Company {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        is_active: get_bool(row, 2)?,
        created_at: parse_datetime(&row.get::<String>(3)?)?,
    })
}

const SELECT_COLS: &str = "id, name, is_active, created_at";

async fn insert_company(
    conn: &libsql::Connection,
    company: &Company,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO companies (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)",
        libsql::params![
            company.id.as_str(),
            company.name.as_str(),
            i64::from(company.is_active),
            timestamp(company.created_at)
        ],
    )
    .await?;
    insert_audit(conn, audit).await
}

impl KpxService {
    /// Register a client company.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for a blank name, or `DatabaseError`
    /// if the INSERT fails.
    pub async fn create_company(&self, name: &str) -> Result<Company, DatabaseError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("company name must not be empty".into()).into());
        }

        let now = now_utc();
        let company = Company {
            id: self.db().generate_id(PREFIX_COMPANY).await?,
            name: name.to_string(),
            is_active: true,
            created_at: now,
        };
        let audit = self
            .new_audit(None, EntityType::Company, &company.id, AuditAction::Created, None, now)
            .await?;

        let _gate = self.write_gate().await;
        let tx = self.begin().await?;
        let outcome = insert_company(&tx, &company, &audit).await;
        finish(tx, outcome).await?;

        tracing::info!(company_id = %company.id, "company created");
        Ok(company)
    }

    /// Get a company by ID.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the company does not exist.
    pub async fn get_company(&self, id: &str) -> Result<Company, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLS} FROM companies WHERE id = ?1");
        let mut rows = self.db().query_with(&sql, || [id]).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| CoreError::not_found(EntityType::Company.as_str(), id))?;
        row_to_company(&row)
    }

    /// List all companies by name.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_companies(&self) -> Result<Vec<Company>, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLS} FROM companies ORDER BY name, rowid");
        let mut rows = self.db().query_with(&sql, || ()).await?;
        let mut companies = Vec::new();
        while let Some(row) = rows.next().await? {
            companies.push(row_to_company(&row)?);
        }
        Ok(companies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::test_service;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn create_and_get_company() {
        let svc = test_service().await;
        let created = svc.create_company("  Acme Coffee ").await.unwrap();
        assert!(kpx_core::ids::has_prefix(&created.id, PREFIX_COMPANY));
        assert_eq!(created.name, "Acme Coffee");

        let fetched = svc.get_company(&created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let svc = test_service().await;
        let err = svc.create_company("   ").await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn missing_company_is_not_found() {
        let svc = test_service().await;
        let err = svc.get_company("cmp-ffffffff").await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_companies_sorted_by_name() {
        let svc = test_service().await;
        svc.create_company("Zeta").await.unwrap();
        svc.create_company("Alpha").await.unwrap();
        let names: Vec<String> = svc
            .list_companies()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn creation_is_audited() {
        let svc = test_service().await;
        let company = svc.create_company("Acme").await.unwrap();
        let entries = svc
            .query_audit(&crate::repos::AuditFilter {
                entity_id: Some(company.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Created);
    }
}
