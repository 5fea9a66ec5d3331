//! Proposal lifecycle engine.
//!
//! | From                   | Action           | To                     |
//! |------------------------|------------------|------------------------|
//! | -                      | submit (student) | Pending Approval       |
//! | -                      | submit (prof.)   | Professor Proposal     |
//! | Pending Approval       | approve          | Approved.. In Progress |
//! | Pending Approval       | reject           | Rejected               |
//! | Pending Approval       | request edit     | Proposal to be edited  |
//! | Proposal to be edited  | resubmit         | Pending Approval       |
//! | Professor Proposal     | adopt            | new row, Pending Appr. |
//! | Approved.. In Progress | complete         | Completed              |
//! | Completed              | amend completion | Completed              |
//! | any                    | delete           | removed                |
//!
//! Approve, reject, request edit and delete need a reviewer principal. Every
//! mutation is one conditional statement; when it touches no row the engine
//! re-reads the id to report either `NotFound` or `InvalidTransition`.

use std::sync::Arc;
use strum::{Display, IntoStaticStr};
use tracing::info;

use crate::auth::{Principal, Role};
use crate::db::{Proposal, ProposalId, ProposalStore, Status, StoreError};
use crate::filter::View;
use crate::forms::{CompletionForm, FieldError, ProposalDraft};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("storage failure: {0}")]
    Persistence(#[source] StoreError),
    #[error("proposal {0} not found")]
    NotFound(ProposalId),
    #[error("this action requires a reviewer")]
    AuthGuard,
    #[error("cannot {action} proposal {id} while it is {from}")]
    InvalidTransition {
        id: ProposalId,
        from: Status,
        action: Action,
    },
    #[error("proposal id {0} already exists")]
    Conflict(ProposalId),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(id) => LifecycleError::Conflict(id),
            other => LifecycleError::Persistence(other),
        }
    }
}

impl From<Vec<FieldError>> for LifecycleError {
    fn from(errors: Vec<FieldError>) -> Self {
        LifecycleError::Validation(errors)
    }
}

/// Where a new submission comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Student,
    Professor,
}

impl Origin {
    pub fn initial_status(self) -> Status {
        match self {
            Origin::Student => Status::PendingApproval,
            Origin::Professor => Status::ProfessorProposal,
        }
    }
}

/// Actions on an existing proposal that move it between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Approve,
    Reject,
    RequestEdit,
    Resubmit,
    Adopt,
    Complete,
    AmendCompletion,
}

impl Action {
    /// The only status the action may start from.
    pub fn source(self) -> Status {
        match self {
            Action::Approve | Action::Reject | Action::RequestEdit => Status::PendingApproval,
            Action::Resubmit => Status::ToBeEdited,
            Action::Adopt => Status::ProfessorProposal,
            Action::Complete => Status::Approved,
            Action::AmendCompletion => Status::Completed,
        }
    }

    /// Status after the action. For `Adopt` this is the status of the new row.
    pub fn target(self) -> Status {
        match self {
            Action::Approve => Status::Approved,
            Action::Reject => Status::Rejected,
            Action::RequestEdit => Status::ToBeEdited,
            Action::Resubmit | Action::Adopt => Status::PendingApproval,
            Action::Complete | Action::AmendCompletion => Status::Completed,
        }
    }

    pub fn requires_reviewer(self) -> bool {
        matches!(self, Action::Approve | Action::Reject | Action::RequestEdit)
    }
}

/// Review decisions a reviewer can take on a pending proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
    RequestEdit,
}

impl From<ReviewAction> for Action {
    fn from(action: ReviewAction) -> Self {
        match action {
            ReviewAction::Approve => Action::Approve,
            ReviewAction::Reject => Action::Reject,
            ReviewAction::RequestEdit => Action::RequestEdit,
        }
    }
}

#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn ProposalStore>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn ProposalStore>) -> Self {
        Self { store }
    }

    fn require_reviewer(principal: &Principal) -> Result<(), LifecycleError> {
        if principal.has_role(Role::Reviewer) {
            Ok(())
        } else {
            tracing::warn!("Denied guarded action for {}", principal.subject());
            Err(LifecycleError::AuthGuard)
        }
    }

    /// Turns a conditional write that touched no row into the reason why.
    async fn explain_miss(&self, id: &ProposalId, action: Action) -> LifecycleError {
        match self.store.fetch_by_id(id).await {
            Ok(Some(current)) => LifecycleError::InvalidTransition {
                id: id.clone(),
                from: current.status,
                action,
            },
            Ok(None) => LifecycleError::NotFound(id.clone()),
            Err(e) => e.into(),
        }
    }

    async fn reload(&self, id: &ProposalId) -> Result<Proposal, LifecycleError> {
        self.store
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    pub async fn submit(
        &self,
        origin: Origin,
        draft: ProposalDraft,
    ) -> Result<Proposal, LifecycleError> {
        let content = draft.validate()?;
        let proposal = Proposal::new(
            ProposalId::generate(),
            origin.initial_status(),
            origin == Origin::Professor,
            content,
        );
        self.store.insert(&proposal).await?;

        info!(
            proposal_id = %proposal.proposal_id,
            status = %proposal.status,
            "Proposal submitted: {}",
            proposal.content.project_name
        );
        Ok(proposal)
    }

    /// Applies a reviewer decision to a pending proposal.
    pub async fn transition(
        &self,
        principal: &Principal,
        id: &ProposalId,
        action: ReviewAction,
    ) -> Result<Proposal, LifecycleError> {
        let action = Action::from(action);
        if action.requires_reviewer() {
            Self::require_reviewer(principal)?;
        }

        let affected = self
            .store
            .update_status(id, action.source(), action.target())
            .await?;
        if affected == 0 {
            return Err(self.explain_miss(id, action).await);
        }

        info!(
            proposal_id = %id,
            from = %action.source(),
            to = %action.target(),
            reviewer = principal.subject(),
            "Proposal {}",
            action
        );
        self.reload(id).await
    }

    pub async fn approve(&self, principal: &Principal, id: &ProposalId) -> Result<Proposal, LifecycleError> {
        self.transition(principal, id, ReviewAction::Approve).await
    }

    pub async fn reject(&self, principal: &Principal, id: &ProposalId) -> Result<Proposal, LifecycleError> {
        self.transition(principal, id, ReviewAction::Reject).await
    }

    pub async fn request_edit(
        &self,
        principal: &Principal,
        id: &ProposalId,
    ) -> Result<Proposal, LifecycleError> {
        self.transition(principal, id, ReviewAction::RequestEdit).await
    }

    /// Replaces the content of a proposal sent back for edits and puts it
    /// back in the approval queue under the same id.
    pub async fn resubmit(
        &self,
        id: &ProposalId,
        draft: ProposalDraft,
    ) -> Result<Proposal, LifecycleError> {
        let content = draft.validate()?;
        let action = Action::Resubmit;

        let affected = self
            .store
            .update_content(id, action.source(), &content, action.target())
            .await?;
        if affected == 0 {
            return Err(self.explain_miss(id, action).await);
        }

        info!(proposal_id = %id, "Proposal resubmitted for approval");
        self.reload(id).await
    }

    /// Turns a professor proposal into a student submission with a new id.
    /// The professor's row is left as is; attachments not re-uploaded are
    /// carried over.
    pub async fn adopt(
        &self,
        id: &ProposalId,
        draft: ProposalDraft,
    ) -> Result<Proposal, LifecycleError> {
        let action = Action::Adopt;
        let source = match self.store.fetch_by_id_with_status(id, action.source()).await? {
            Some(source) => source,
            None => return Err(self.explain_miss(id, action).await),
        };

        let mut content = draft.validate()?;
        content.inherit_images(&source.content);

        let proposal = Proposal::new(ProposalId::generate(), action.target(), false, content);
        self.store.insert(&proposal).await?;

        info!(
            proposal_id = %proposal.proposal_id,
            adopted_from = %id,
            "Professor proposal adopted"
        );
        Ok(proposal)
    }

    pub async fn complete(
        &self,
        id: &ProposalId,
        form: CompletionForm,
    ) -> Result<Proposal, LifecycleError> {
        self.write_completion(id, form, Action::Complete).await
    }

    pub async fn amend_completion(
        &self,
        id: &ProposalId,
        form: CompletionForm,
    ) -> Result<Proposal, LifecycleError> {
        self.write_completion(id, form, Action::AmendCompletion).await
    }

    async fn write_completion(
        &self,
        id: &ProposalId,
        form: CompletionForm,
        action: Action,
    ) -> Result<Proposal, LifecycleError> {
        let completion = form.validate()?;

        let affected = self
            .store
            .update_completion(id, action.source(), &completion, action.target())
            .await?;
        if affected == 0 {
            return Err(self.explain_miss(id, action).await);
        }

        info!(proposal_id = %id, "Completion recorded ({})", action);
        self.reload(id).await
    }

    /// Permanently removes a proposal, whatever its status.
    pub async fn delete(&self, principal: &Principal, id: &ProposalId) -> Result<(), LifecycleError> {
        Self::require_reviewer(principal)?;

        if self.store.delete(id).await? == 0 {
            return Err(LifecycleError::NotFound(id.clone()));
        }

        info!(proposal_id = %id, reviewer = principal.subject(), "Proposal deleted");
        Ok(())
    }

    pub async fn get(&self, id: &ProposalId) -> Result<Option<Proposal>, LifecycleError> {
        Ok(self.store.fetch_by_id(id).await?)
    }

    pub async fn get_with_status(
        &self,
        id: &ProposalId,
        status: Status,
    ) -> Result<Option<Proposal>, LifecycleError> {
        Ok(self.store.fetch_by_id_with_status(id, status).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Proposal>, LifecycleError> {
        Ok(self.store.fetch_all().await?)
    }

    pub async fn list_by_status(&self, status: Status) -> Result<Vec<Proposal>, LifecycleError> {
        Ok(self.store.fetch_by_status(status).await?)
    }

    pub async fn list_professor_proposals(&self) -> Result<Vec<Proposal>, LifecycleError> {
        Ok(self.store.fetch_professor_proposals().await?)
    }

    /// Reads the proposals a page shows, before facets are applied.
    pub async fn load_view(&self, view: View) -> Result<Vec<Proposal>, LifecycleError> {
        match (view, view.status()) {
            (View::ProfessorProposals, _) => self.list_professor_proposals().await,
            (_, Some(status)) => self.list_by_status(status).await,
            (_, None) => self.list_all().await,
        }
    }
}
