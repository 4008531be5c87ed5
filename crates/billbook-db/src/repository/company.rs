//! # Company and Branch Repositories
//!
//! Resolution of the issuing entity. Lookups are always scoped by company
//! so a branch id from another company resolves to nothing.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use billbook_core::{Branch, Company};

/// Repository for companies.
#[derive(Debug, Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CompanyRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Company>> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT id, name, tax_id, created_at FROM companies WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(company)
    }

    pub async fn insert(&self, company: &Company) -> DbResult<()> {
        debug!(id = %company.id, "Inserting company");

        sqlx::query("INSERT INTO companies (id, name, tax_id, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&company.id)
            .bind(&company.name)
            .bind(&company.tax_id)
            .bind(company.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Repository for branches.
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: SqlitePool,
}

impl BranchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BranchRepository { pool }
    }

    /// Resolves a branch within a company.
    pub async fn get(&self, id: &str, company_id: &str) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            r#"
            SELECT id, company_id, name, document_prefix, created_at
            FROM branches
            WHERE id = ?1 AND company_id = ?2
            "#,
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(branch)
    }

    pub async fn insert(&self, branch: &Branch) -> DbResult<()> {
        debug!(id = %branch.id, prefix = %branch.document_prefix, "Inserting branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, company_id, name, document_prefix, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.company_id)
        .bind(&branch.name)
        .bind(&branch.document_prefix)
        .bind(branch.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_branch_is_scoped_by_company() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let company = fixtures::company(&db, "co-1", Some("27AAACB1234C1Z5")).await;
        fixtures::branch(&db, &company.id, "br-1", "HQ").await;

        let found = db.branches().get("br-1", "co-1").await.unwrap();
        assert_eq!(found.map(|b| b.document_prefix), Some("HQ".to_string()));
        assert!(db.branches().get("br-1", "co-2").await.unwrap().is_none());

        let company = db.companies().get_by_id("co-1").await.unwrap().unwrap();
        assert_eq!(company.tax_id.as_deref(), Some("27AAACB1234C1Z5"));
    }
}
