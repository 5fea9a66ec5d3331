use axum::{
    extract::{Multipart, Path, RawQuery, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::Principal;
use crate::db::{Proposal, ProposalId};
use crate::error::ApiError;
use crate::filter::{self, FacetOptions, Facets, ProposalSummary, View};
use crate::forms::{CompletionForm, FieldError, ProposalDraft};
use crate::lifecycle::{LifecycleError, Origin, ReviewAction};
use crate::state::AppState;

/// Decodes `view` and the repeatable facet keys from the raw query string.
pub(crate) fn parse_listing_query(query: Option<String>) -> Result<(View, Facets), ApiError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.as_deref().unwrap_or(""))
        .map_err(|e| ApiError::BadRequest(format!("malformed query: {}", e)))?;
    Facets::from_pairs(&pairs).map_err(ApiError::BadRequest)
}

pub(crate) async fn load_listing(
    state: &AppState,
    query: Option<String>,
) -> Result<(View, Vec<Proposal>), ApiError> {
    let (view, facets) = parse_listing_query(query)?;
    let proposals = state.engine.load_view(view).await?;
    Ok((view, filter::apply(proposals, &facets)))
}

fn proposal_body(proposal: &Proposal) -> Json<Value> {
    Json(json!({ "success": true, "proposal": proposal }))
}

pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let (view, proposals) = load_listing(&state, query).await?;
    let rows: Vec<ProposalSummary> = proposals.iter().map(ProposalSummary::from).collect();

    Ok(Json(json!({
        "success": true,
        "view": view,
        "count": rows.len(),
        "proposals": rows,
    })))
}

/// Values available to each filter picker on a page.
pub async fn facet_options(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let (view, _) = parse_listing_query(query)?;
    let proposals = state.engine.load_view(view).await?;
    Ok(Json(json!({
        "success": true,
        "view": view,
        "options": FacetOptions::collect(&proposals),
    })))
}

pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ProposalId::from(id);
    let proposal = state
        .engine
        .get(&id)
        .await?
        .ok_or(LifecycleError::NotFound(id))?;
    Ok(proposal_body(&proposal))
}

fn draft_text_field<'a>(draft: &'a mut ProposalDraft, name: &str) -> Option<&'a mut String> {
    let field = match name {
        "name" => &mut draft.name,
        "project_name" => &mut draft.project_name,
        "mentor" => &mut draft.mentor,
        "mentor_email" => &mut draft.mentor_email,
        "contributors" => &mut draft.contributors,
        "objective" => &mut draft.objective,
        "rationale" => &mut draft.rationale,
        "dataset" => &mut draft.dataset,
        "approach" => &mut draft.approach,
        "possible_issues" => &mut draft.possible_issues,
        "timeline" => &mut draft.timeline,
        "expected_students" => &mut draft.expected_students,
        "github_link" => &mut draft.github_link,
        "semester" => &mut draft.semester,
        "year" => &mut draft.year,
        _ => return None,
    };
    Some(field)
}

/// Reads a proposal form. Empty file inputs count as "no upload".
pub(crate) async fn read_draft(mut multipart: Multipart) -> Result<ProposalDraft, ApiError> {
    let mut draft = ProposalDraft::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "objective_image" | "dataset_image" | "possible_issues_image" => {
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                let slot = match name.as_str() {
                    "objective_image" => &mut draft.objective_image,
                    "dataset_image" => &mut draft.dataset_image,
                    _ => &mut draft.possible_issues_image,
                };
                *slot = Some(bytes.to_vec());
            }
            _ => {
                let text = field.text().await?;
                if let Some(target) = draft_text_field(&mut draft, &name) {
                    *target = text;
                }
            }
        }
    }
    Ok(draft)
}

/// Reads a completion form. Only the name of the uploaded document is kept.
pub(crate) async fn read_completion(mut multipart: Multipart) -> Result<CompletionForm, ApiError> {
    let mut form = CompletionForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "project_document" {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            let document = file_name.unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            form.project_document = Some(document).filter(|d| !d.trim().is_empty());
            continue;
        }

        let text = field.text().await?;
        match name.as_str() {
            "project_name" => form.project_name = text,
            "name" => form.name = text,
            "year" => form.year = text,
            "semester" => form.semester = text,
            "github_link" => form.github_link = text,
            "video_link" => form.video_link = text,
            "project_website" => form.project_website = text,
            _ => {}
        }
    }
    Ok(form)
}

/// Rejects links to repositories GitHub does not know, when checking is on.
/// Lookup failures other than "not found" let the submission through.
async fn verify_github_link(state: &AppState, link: &str) -> Result<(), ApiError> {
    let Some(github) = &state.github else {
        return Ok(());
    };
    if link.trim().is_empty() {
        return Ok(());
    }
    match github.repo_exists(link).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(LifecycleError::Validation(vec![FieldError {
            field: "github_link",
            message: "repository does not exist or is private".to_string(),
        }])
        .into()),
        Err(e) => {
            tracing::warn!("Skipping GitHub link check: {}", e);
            Ok(())
        }
    }
}

async fn submit(state: &AppState, origin: Origin, multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let draft = read_draft(multipart).await?;
    verify_github_link(state, &draft.github_link).await?;
    let proposal = state.engine.submit(origin, draft).await?;
    Ok(proposal_body(&proposal))
}

pub async fn submit_proposal(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    submit(&state, Origin::Student, multipart).await
}

pub async fn submit_professor_proposal(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    submit(&state, Origin::Professor, multipart).await
}

pub async fn resubmit_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let draft = read_draft(multipart).await?;
    verify_github_link(&state, &draft.github_link).await?;
    let proposal = state.engine.resubmit(&ProposalId::from(id), draft).await?;
    Ok(proposal_body(&proposal))
}

pub async fn adopt_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let draft = read_draft(multipart).await?;
    verify_github_link(&state, &draft.github_link).await?;
    let proposal = state.engine.adopt(&ProposalId::from(id), draft).await?;
    Ok(proposal_body(&proposal))
}

async fn review(
    state: &AppState,
    principal: &Principal,
    id: String,
    action: ReviewAction,
) -> Result<Json<Value>, ApiError> {
    let proposal = state
        .engine
        .transition(principal, &ProposalId::from(id), action)
        .await?;
    Ok(proposal_body(&proposal))
}

pub async fn approve_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    review(&state, &principal, id, ReviewAction::Approve).await
}

pub async fn reject_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    review(&state, &principal, id, ReviewAction::Reject).await
}

pub async fn request_edit(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    review(&state, &principal, id, ReviewAction::RequestEdit).await
}

pub async fn delete_proposal(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ProposalId::from(id);
    state.engine.delete(&principal, &id).await?;
    Ok(Json(json!({ "success": true, "proposal_id": id })))
}

/// Records the completion report, then archives the repository when an
/// archive target is configured. Archival failures do not undo completion.
pub async fn complete_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = read_completion(multipart).await?;
    let proposal = state.engine.complete(&ProposalId::from(id), form).await?;

    let archive = match &state.archiver {
        Some(archiver) => archiver.archive_completed(&proposal).await,
        None => None,
    };

    Ok(Json(json!({
        "success": true,
        "proposal": proposal,
        "archive": archive,
    })))
}

pub async fn amend_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = read_completion(multipart).await?;
    let proposal = state
        .engine
        .amend_completion(&ProposalId::from(id), form)
        .await?;
    Ok(proposal_body(&proposal))
}
