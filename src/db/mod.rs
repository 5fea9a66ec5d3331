mod memory;
mod models;

pub use memory::MemoryStore;
pub use models::*;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub type DbPool = Arc<PgPool>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("proposal id {0} already exists")]
    Conflict(ProposalId),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Access to the `proposals` table.
///
/// Conditional updates only touch a row whose current status equals `from`
/// and report the number of affected rows, so callers can tell a missed
/// precondition apart from a successful write.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    async fn insert(&self, proposal: &Proposal) -> Result<(), StoreError>;

    async fn fetch_all(&self) -> Result<Vec<Proposal>, StoreError>;

    async fn fetch_by_status(&self, status: Status) -> Result<Vec<Proposal>, StoreError>;

    async fn fetch_professor_proposals(&self) -> Result<Vec<Proposal>, StoreError>;

    async fn fetch_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, StoreError>;

    async fn fetch_by_id_with_status(
        &self,
        id: &ProposalId,
        status: Status,
    ) -> Result<Option<Proposal>, StoreError>;

    async fn update_status(
        &self,
        id: &ProposalId,
        from: Status,
        to: Status,
    ) -> Result<u64, StoreError>;

    /// Rewrites the descriptive fields. Attachments that are `None` in
    /// `content` keep their stored value.
    async fn update_content(
        &self,
        id: &ProposalId,
        from: Status,
        content: &ProposalContent,
        to: Status,
    ) -> Result<u64, StoreError>;

    async fn update_completion(
        &self,
        id: &ProposalId,
        from: Status,
        completion: &Completion,
        to: Status,
    ) -> Result<u64, StoreError>;

    async fn delete(&self, id: &ProposalId) -> Result<u64, StoreError>;
}

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// PostgreSQL-backed store. Every method is a single parameterized statement.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn rows_to_proposals(rows: Vec<ProposalRow>) -> Result<Vec<Proposal>, StoreError> {
        rows.into_iter()
            .map(|row| Proposal::try_from(row).map_err(StoreError::Corrupt))
            .collect()
    }
}

fn image_bytes(blob: &Option<crate::images::ImageBlob>) -> Option<&[u8]> {
    blob.as_ref().map(|b| b.as_bytes())
}

#[async_trait]
impl ProposalStore for PgStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let c = &proposal.content;
        let result = sqlx::query(
            r#"
            INSERT INTO proposals (
                proposal_id, status, proposed_by_professor, name, project_name, mentor,
                mentor_email, contributors, objective, objective_image, rationale, dataset,
                dataset_image, approach, possible_issues, possible_issues_image, timeline,
                expected_students, github_link, semester, year, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(proposal.proposal_id.as_str())
        .bind(proposal.status.as_str())
        .bind(proposal.proposed_by_professor)
        .bind(&c.name)
        .bind(&c.project_name)
        .bind(&c.mentor)
        .bind(&c.mentor_email)
        .bind(&c.contributors)
        .bind(&c.objective)
        .bind(image_bytes(&c.objective_image))
        .bind(&c.rationale)
        .bind(&c.dataset)
        .bind(image_bytes(&c.dataset_image))
        .bind(&c.approach)
        .bind(&c.possible_issues)
        .bind(image_bytes(&c.possible_issues_image))
        .bind(&c.timeline)
        .bind(c.expected_students)
        .bind(&c.github_link)
        .bind(&c.semester)
        .bind(&c.year)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .execute(self.pool.as_ref())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Conflict(proposal.proposal_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Proposal>, StoreError> {
        let rows = sqlx::query_as::<_, ProposalRow>(
            "SELECT * FROM proposals ORDER BY created_at, proposal_id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;
        Self::rows_to_proposals(rows)
    }

    async fn fetch_by_status(&self, status: Status) -> Result<Vec<Proposal>, StoreError> {
        let rows = sqlx::query_as::<_, ProposalRow>(
            "SELECT * FROM proposals WHERE status = $1 ORDER BY created_at, proposal_id",
        )
        .bind(status.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;
        Self::rows_to_proposals(rows)
    }

    async fn fetch_professor_proposals(&self) -> Result<Vec<Proposal>, StoreError> {
        let rows = sqlx::query_as::<_, ProposalRow>(
            "SELECT * FROM proposals WHERE proposed_by_professor = true ORDER BY created_at, proposal_id",
        )
        .fetch_all(self.pool.as_ref())
        .await?;
        Self::rows_to_proposals(rows)
    }

    async fn fetch_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, StoreError> {
        let row = sqlx::query_as::<_, ProposalRow>("SELECT * FROM proposals WHERE proposal_id = $1")
            .bind(id.as_str())
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map(|r| Proposal::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn fetch_by_id_with_status(
        &self,
        id: &ProposalId,
        status: Status,
    ) -> Result<Option<Proposal>, StoreError> {
        let row = sqlx::query_as::<_, ProposalRow>(
            "SELECT * FROM proposals WHERE proposal_id = $1 AND status = $2",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.map(|r| Proposal::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn update_status(
        &self,
        id: &ProposalId,
        from: Status,
        to: Status,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE proposals
            SET status = $3, updated_at = NOW()
            WHERE proposal_id = $1 AND status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_content(
        &self,
        id: &ProposalId,
        from: Status,
        content: &ProposalContent,
        to: Status,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE proposals SET
                name = $4,
                project_name = $5,
                mentor = $6,
                mentor_email = $7,
                contributors = $8,
                objective = $9,
                objective_image = COALESCE($10, objective_image),
                rationale = $11,
                dataset = $12,
                dataset_image = COALESCE($13, dataset_image),
                approach = $14,
                possible_issues = $15,
                possible_issues_image = COALESCE($16, possible_issues_image),
                timeline = $17,
                expected_students = $18,
                github_link = $19,
                semester = $20,
                year = $21,
                status = $3,
                updated_at = NOW()
            WHERE proposal_id = $1 AND status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(&content.name)
        .bind(&content.project_name)
        .bind(&content.mentor)
        .bind(&content.mentor_email)
        .bind(&content.contributors)
        .bind(&content.objective)
        .bind(image_bytes(&content.objective_image))
        .bind(&content.rationale)
        .bind(&content.dataset)
        .bind(image_bytes(&content.dataset_image))
        .bind(&content.approach)
        .bind(&content.possible_issues)
        .bind(image_bytes(&content.possible_issues_image))
        .bind(&content.timeline)
        .bind(content.expected_students)
        .bind(&content.github_link)
        .bind(&content.semester)
        .bind(&content.year)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_completion(
        &self,
        id: &ProposalId,
        from: Status,
        completion: &Completion,
        to: Status,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE proposals SET
                project_name = $4,
                name = $5,
                year = $6,
                semester = $7,
                github_link = $8,
                video_link = $9,
                project_website = $10,
                project_document = $11,
                status = $3,
                updated_at = NOW()
            WHERE proposal_id = $1 AND status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(&completion.project_name)
        .bind(&completion.name)
        .bind(&completion.year)
        .bind(&completion.semester)
        .bind(&completion.github_link)
        .bind(&completion.video_link)
        .bind(&completion.project_website)
        .bind(&completion.project_document)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &ProposalId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM proposals WHERE proposal_id = $1")
            .bind(id.as_str())
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
