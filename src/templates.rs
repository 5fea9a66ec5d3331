use std::sync::OnceLock;
use tera::{Context, Tera};

use crate::db::{ImageSlot, Proposal};
use crate::images::render_markdown;

const PROPOSAL: &str = "proposal.md";
const COMPLETION: &str = "completion.md";
const NOT_PROVIDED: &str = "Not provided";

static TERA: OnceLock<Result<Tera, String>> = OnceLock::new();

fn get_tera() -> Result<&'static Tera, tera::Error> {
    TERA.get_or_init(|| {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (PROPOSAL, include_str!("../templates/proposal.md")),
            (COMPLETION, include_str!("../templates/completion.md")),
        ])
        .map(|_| tera)
        .map_err(|e| e.to_string())
    })
    .as_ref()
    .map_err(|e| tera::Error::msg(e.clone()))
}

/// Markdown proposal document with attachments inlined as data URIs.
pub fn render_proposal(proposal: &Proposal) -> Result<String, tera::Error> {
    let content = &proposal.content;
    let mut ctx = Context::new();
    ctx.insert("p", content);
    ctx.insert("objective_image", &render_markdown(content.image(ImageSlot::Objective)));
    ctx.insert("dataset_image", &render_markdown(content.image(ImageSlot::Dataset)));
    ctx.insert(
        "possible_issues_image",
        &render_markdown(content.image(ImageSlot::PossibleIssues)),
    );
    get_tera()?.render(PROPOSAL, &ctx)
}

pub fn render_completion(proposal: &Proposal) -> Result<String, tera::Error> {
    let completion = &proposal.completion;
    let mut ctx = Context::new();
    ctx.insert("p", &proposal.content);
    ctx.insert(
        "video_link",
        completion.video_link.as_deref().unwrap_or(NOT_PROVIDED),
    );
    ctx.insert(
        "project_website",
        completion.project_website.as_deref().unwrap_or(NOT_PROVIDED),
    );
    ctx.insert(
        "project_document",
        completion
            .project_document
            .as_deref()
            .unwrap_or(crate::images::NOT_UPLOADED),
    );
    get_tera()?.render(COMPLETION, &ctx)
}

/// Download name for a rendered document, e.g. `Retail_Forecasting_proposal.md`.
pub fn document_filename(project_name: &str, suffix: &str) -> String {
    let stem: String = project_name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | '"' | ':' => '-',
            c => c,
        })
        .collect();
    let stem = if stem.is_empty() { "proposal".to_string() } else { stem };
    format!("{}_{}.md", stem, suffix)
}
