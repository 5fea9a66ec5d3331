use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Completion, Proposal, ProposalContent, ProposalId, ProposalStore, Status, StoreError};

/// In-process store with the same contract as the PostgreSQL one.
/// Rows are kept in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Proposal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select(&self, keep: impl Fn(&Proposal) -> bool) -> Vec<Proposal> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|p| keep(*p))
            .cloned()
            .collect()
    }

    async fn update_where(
        &self,
        id: &ProposalId,
        from: Status,
        apply: impl FnOnce(&mut Proposal),
    ) -> u64 {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|p| &p.proposal_id == id && p.status == from)
        {
            Some(row) => {
                apply(row);
                row.updated_at = Utc::now();
                1
            }
            None => 0,
        }
    }
}

#[async_trait]
impl ProposalStore for MemoryStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|p| p.proposal_id == proposal.proposal_id) {
            return Err(StoreError::Conflict(proposal.proposal_id.clone()));
        }
        rows.push(proposal.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Proposal>, StoreError> {
        Ok(self.select(|_| true).await)
    }

    async fn fetch_by_status(&self, status: Status) -> Result<Vec<Proposal>, StoreError> {
        Ok(self.select(|p| p.status == status).await)
    }

    async fn fetch_professor_proposals(&self) -> Result<Vec<Proposal>, StoreError> {
        Ok(self.select(|p| p.proposed_by_professor).await)
    }

    async fn fetch_by_id(&self, id: &ProposalId) -> Result<Option<Proposal>, StoreError> {
        Ok(self.select(|p| &p.proposal_id == id).await.into_iter().next())
    }

    async fn fetch_by_id_with_status(
        &self,
        id: &ProposalId,
        status: Status,
    ) -> Result<Option<Proposal>, StoreError> {
        Ok(self
            .select(|p| &p.proposal_id == id && p.status == status)
            .await
            .into_iter()
            .next())
    }

    async fn update_status(
        &self,
        id: &ProposalId,
        from: Status,
        to: Status,
    ) -> Result<u64, StoreError> {
        Ok(self.update_where(id, from, |row| row.status = to).await)
    }

    async fn update_content(
        &self,
        id: &ProposalId,
        from: Status,
        content: &ProposalContent,
        to: Status,
    ) -> Result<u64, StoreError> {
        let mut content = content.clone();
        Ok(self
            .update_where(id, from, move |row| {
                content.inherit_images(&row.content);
                row.content = content;
                row.status = to;
            })
            .await)
    }

    async fn update_completion(
        &self,
        id: &ProposalId,
        from: Status,
        completion: &Completion,
        to: Status,
    ) -> Result<u64, StoreError> {
        Ok(self
            .update_where(id, from, |row| {
                row.apply_completion(completion);
                row.status = to;
            })
            .await)
    }

    async fn delete(&self, id: &ProposalId) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|p| &p.proposal_id != id);
        Ok((before - rows.len()) as u64)
    }
}
