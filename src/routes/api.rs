use axum::{
    extract::{Path, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

use crate::db::{ImageSlot, Proposal, ProposalId, Status};
use crate::error::ApiError;
use crate::lifecycle::LifecycleError;
use crate::routes::proposals::load_listing;
use crate::state::AppState;
use crate::templates::{document_filename, render_completion, render_proposal};

const MARKDOWN: &str = "text/markdown; charset=utf-8";

fn attachment(content_type: &str, filename: &str, body: impl Into<axum::body::Body>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body.into(),
    )
        .into_response()
}

async fn fetch(state: &AppState, id: String) -> Result<Proposal, ApiError> {
    let id = ProposalId::from(id);
    match state.engine.get(&id).await? {
        Some(proposal) => Ok(proposal),
        None => Err(LifecycleError::NotFound(id).into()),
    }
}

pub async fn download_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let proposal = fetch(&state, id).await?;
    let document = render_proposal(&proposal)?;
    let filename = document_filename(&proposal.content.project_name, "proposal");
    Ok(attachment(MARKDOWN, &filename, document))
}

pub async fn download_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let proposal = fetch(&state, id).await?;
    if proposal.status != Status::Completed {
        return Err(ApiError::NotFound(format!(
            "proposal {} has no completion report",
            proposal.proposal_id
        )));
    }
    let document = render_completion(&proposal)?;
    let filename = document_filename(&proposal.content.project_name, "completion");
    Ok(attachment(MARKDOWN, &filename, document))
}

/// Raw bytes of an attachment, served with their sniffed MIME type.
pub async fn proposal_image(
    State(state): State<Arc<AppState>>,
    Path((id, slot)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let slot: ImageSlot = slot
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown image slot {:?}", slot)))?;
    let proposal = fetch(&state, id).await?;
    let blob = proposal
        .content
        .image(slot)
        .ok_or_else(|| ApiError::NotFound(format!("no {} image uploaded", slot)))?;

    Ok((
        [(header::CONTENT_TYPE, blob.mime_type())],
        blob.as_bytes().to_vec(),
    )
        .into_response())
}

/// Zip of the proposal documents in a filtered listing, one folder per id.
pub async fn export_proposals(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let (view, proposals) = load_listing(&state, query).await?;

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);
    for proposal in &proposals {
        let document = render_proposal(proposal)?;
        let path = format!(
            "{}/{}",
            proposal.proposal_id,
            document_filename(&proposal.content.project_name, "proposal")
        );
        zip.start_file(path, options)
            .map_err(|e| ApiError::Internal(format!("zip error: {}", e)))?;
        zip.write_all(document.as_bytes())
            .map_err(|e| ApiError::Internal(format!("zip error: {}", e)))?;
    }
    let zip_data = zip
        .finish()
        .map_err(|e| ApiError::Internal(format!("zip error: {}", e)))?
        .into_inner();

    tracing::info!("Exported {} proposal(s) from view {}", proposals.len(), view);
    Ok(attachment(
        "application/zip",
        &format!("{}_proposals.zip", view),
        zip_data,
    ))
}
