use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::images::ImageBlob;

/// Lifecycle status of a proposal. The string forms are what the table stores.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum Status {
    #[strum(serialize = "Pending Approval")]
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    #[strum(serialize = "Approved.. In Progress")]
    #[serde(rename = "Approved.. In Progress")]
    Approved,
    #[strum(serialize = "Rejected")]
    #[serde(rename = "Rejected")]
    Rejected,
    #[strum(serialize = "Proposal to be edited")]
    #[serde(rename = "Proposal to be edited")]
    ToBeEdited,
    #[strum(serialize = "Pending Completion")]
    #[serde(rename = "Pending Completion")]
    PendingCompletion,
    #[strum(serialize = "Completed")]
    #[serde(rename = "Completed")]
    Completed,
    #[strum(serialize = "Professor Proposal")]
    #[serde(rename = "Professor Proposal")]
    ProfessorProposal,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Opaque proposal identifier, minted client side as a random UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

impl ProposalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProposalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProposalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which attachment a blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageSlot {
    Objective,
    Dataset,
    PossibleIssues,
}

/// Submitter, contact and descriptive fields of a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalContent {
    pub name: String,
    pub project_name: String,
    pub mentor: String,
    pub mentor_email: String,
    pub contributors: String,
    pub objective: String,
    pub rationale: String,
    pub dataset: String,
    pub approach: String,
    pub possible_issues: String,
    pub timeline: String,
    pub expected_students: i32,
    pub github_link: String,
    pub semester: String,
    pub year: String,
    #[serde(skip)]
    pub objective_image: Option<ImageBlob>,
    #[serde(skip)]
    pub dataset_image: Option<ImageBlob>,
    #[serde(skip)]
    pub possible_issues_image: Option<ImageBlob>,
}

impl ProposalContent {
    pub fn image(&self, slot: ImageSlot) -> Option<&ImageBlob> {
        match slot {
            ImageSlot::Objective => self.objective_image.as_ref(),
            ImageSlot::Dataset => self.dataset_image.as_ref(),
            ImageSlot::PossibleIssues => self.possible_issues_image.as_ref(),
        }
    }

    /// Fill attachments missing from `self` with the ones from `previous`.
    pub fn inherit_images(&mut self, previous: &ProposalContent) {
        if self.objective_image.is_none() {
            self.objective_image = previous.objective_image.clone();
        }
        if self.dataset_image.is_none() {
            self.dataset_image = previous.dataset_image.clone();
        }
        if self.possible_issues_image.is_none() {
            self.possible_issues_image = previous.possible_issues_image.clone();
        }
    }
}

/// Fields captured by the completion report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub project_name: String,
    pub name: String,
    pub year: String,
    pub semester: String,
    pub github_link: String,
    pub video_link: String,
    pub project_website: Option<String>,
    pub project_document: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    pub video_link: Option<String>,
    pub project_website: Option<String>,
    pub project_document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub status: Status,
    pub proposed_by_professor: bool,
    #[serde(flatten)]
    pub content: ProposalContent,
    #[serde(flatten)]
    pub completion: CompletionDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(
        proposal_id: ProposalId,
        status: Status,
        proposed_by_professor: bool,
        content: ProposalContent,
    ) -> Self {
        let now = Utc::now();
        Self {
            proposal_id,
            status,
            proposed_by_professor,
            content,
            completion: CompletionDetails::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_completion(&mut self, completion: &Completion) {
        self.content.project_name = completion.project_name.clone();
        self.content.name = completion.name.clone();
        self.content.year = completion.year.clone();
        self.content.semester = completion.semester.clone();
        self.content.github_link = completion.github_link.clone();
        self.completion = CompletionDetails {
            video_link: Some(completion.video_link.clone()),
            project_website: completion.project_website.clone(),
            project_document: completion.project_document.clone(),
        };
    }
}

#[derive(Debug, FromRow)]
pub struct ProposalRow {
    pub proposal_id: String,
    pub status: String,
    pub proposed_by_professor: bool,
    pub name: String,
    pub project_name: String,
    pub mentor: String,
    pub mentor_email: String,
    pub contributors: String,
    pub objective: String,
    pub objective_image: Option<Vec<u8>>,
    pub rationale: String,
    pub dataset: String,
    pub dataset_image: Option<Vec<u8>>,
    pub approach: String,
    pub possible_issues: String,
    pub possible_issues_image: Option<Vec<u8>>,
    pub timeline: String,
    pub expected_students: i32,
    pub github_link: String,
    pub semester: String,
    pub year: String,
    pub video_link: Option<String>,
    pub project_website: Option<String>,
    pub project_document: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = String;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<Status>()
            .map_err(|_| format!("unknown status {:?} on {}", row.status, row.proposal_id))?;

        Ok(Proposal {
            proposal_id: ProposalId::from(row.proposal_id),
            status,
            proposed_by_professor: row.proposed_by_professor,
            content: ProposalContent {
                name: row.name,
                project_name: row.project_name,
                mentor: row.mentor,
                mentor_email: row.mentor_email,
                contributors: row.contributors,
                objective: row.objective,
                rationale: row.rationale,
                dataset: row.dataset,
                approach: row.approach,
                possible_issues: row.possible_issues,
                timeline: row.timeline,
                expected_students: row.expected_students,
                github_link: row.github_link,
                semester: row.semester,
                year: row.year,
                objective_image: row.objective_image.map(ImageBlob::from_stored),
                dataset_image: row.dataset_image.map(ImageBlob::from_stored),
                possible_issues_image: row.possible_issues_image.map(ImageBlob::from_stored),
            },
            completion: CompletionDetails {
                video_link: row.video_link,
                project_website: row.project_website,
                project_document: row.project_document,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn status_strings_match_stored_values() {
        assert_eq!(Status::Approved.as_str(), "Approved.. In Progress");
        assert_eq!(Status::ToBeEdited.as_str(), "Proposal to be edited");
        assert_eq!("Professor Proposal".parse::<Status>().unwrap(), Status::ProfessorProposal);
        assert!("approved".parse::<Status>().is_err());
    }

    #[test]
    fn status_serde_uses_stored_values() {
        for status in Status::iter() {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn generated_ids_are_distinct_uuids() {
        let a = ProposalId::generate();
        let b = ProposalId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn image_slot_parses_path_segment() {
        assert_eq!("possible_issues".parse::<ImageSlot>().unwrap(), ImageSlot::PossibleIssues);
        assert_eq!(ImageSlot::Dataset.to_string(), "dataset");
    }
}
