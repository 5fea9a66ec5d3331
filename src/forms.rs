//! Typed form payloads and their validation.
//!
//! Handlers build a [`ProposalDraft`] or [`CompletionForm`] from the request
//! and the lifecycle engine validates it before anything reaches storage.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::db::{Completion, ProposalContent};
use crate::images::ImageBlob;

pub const SEMESTERS: &[&str] = &["Spring", "Summer", "Fall"];

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

fn github_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https://github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$").unwrap()
    })
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}$").unwrap())
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://\S+$").unwrap())
}

/// Splits `https://github.com/{owner}/{repo}` into its owner and repository.
pub fn parse_github_link(link: &str) -> Option<(String, String)> {
    let caps = github_re().captures(link.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Collects field errors while a form is checked.
#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn required(&mut self, field: &'static str, value: &str) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.errors.push(FieldError::new(field, "is required"));
        }
        trimmed.to_string()
    }

    fn matching(&mut self, field: &'static str, value: &str, re: &Regex, message: &str) -> String {
        let value = self.required(field, value);
        if !value.is_empty() && !re.is_match(&value) {
            self.errors.push(FieldError::new(field, message));
        }
        value
    }

    fn optional_matching(
        &mut self,
        field: &'static str,
        value: &str,
        re: &Regex,
        message: &str,
    ) -> String {
        let value = value.trim().to_string();
        if !value.is_empty() && !re.is_match(&value) {
            self.errors.push(FieldError::new(field, message));
        }
        value
    }

    fn image(&mut self, field: &'static str, upload: Option<Vec<u8>>) -> Option<ImageBlob> {
        match upload.map(ImageBlob::from_upload) {
            None => None,
            Some(Ok(blob)) => Some(blob),
            Some(Err(e)) => {
                self.errors.push(FieldError::new(field, e.to_string()));
                None
            }
        }
    }

    fn finish<T>(self, value: T) -> Result<T, Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors)
        }
    }
}

/// Raw proposal form as submitted. Image fields carry the uploaded bytes, if any.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalDraft {
    pub name: String,
    pub project_name: String,
    pub mentor: String,
    pub mentor_email: String,
    #[serde(default)]
    pub contributors: String,
    pub objective: String,
    pub rationale: String,
    pub dataset: String,
    pub approach: String,
    #[serde(default)]
    pub possible_issues: String,
    pub timeline: String,
    #[serde(default)]
    pub expected_students: String,
    #[serde(default)]
    pub github_link: String,
    pub semester: String,
    pub year: String,
    #[serde(skip)]
    pub objective_image: Option<Vec<u8>>,
    #[serde(skip)]
    pub dataset_image: Option<Vec<u8>>,
    #[serde(skip)]
    pub possible_issues_image: Option<Vec<u8>>,
}

impl ProposalDraft {
    pub fn validate(self) -> Result<ProposalContent, Vec<FieldError>> {
        let mut check = Checker::default();

        let name = check.required("name", &self.name);
        let project_name = check.required("project_name", &self.project_name);
        let mentor = check.required("mentor", &self.mentor);
        let mentor_email = check.matching(
            "mentor_email",
            &self.mentor_email,
            email_re(),
            "must be an email address",
        );
        let objective = check.required("objective", &self.objective);
        let rationale = check.required("rationale", &self.rationale);
        let dataset = check.required("dataset", &self.dataset);
        let approach = check.required("approach", &self.approach);
        let timeline = check.required("timeline", &self.timeline);
        let github_link = check.optional_matching(
            "github_link",
            &self.github_link,
            github_re(),
            "must look like https://github.com/owner/repo",
        );
        let year = check.matching("year", &self.year, year_re(), "must be a four digit year");

        let semester = check.required("semester", &self.semester);
        if !semester.is_empty() && !SEMESTERS.contains(&semester.as_str()) {
            check.errors.push(FieldError::new(
                "semester",
                format!("must be one of {}", SEMESTERS.join(", ")),
            ));
        }

        let expected_students = match self.expected_students.trim() {
            "" => 1,
            raw => match raw.parse::<i32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    check.errors.push(FieldError::new(
                        "expected_students",
                        "must be a positive whole number",
                    ));
                    1
                }
            },
        };

        let objective_image = check.image("objective_image", self.objective_image);
        let dataset_image = check.image("dataset_image", self.dataset_image);
        let possible_issues_image = check.image("possible_issues_image", self.possible_issues_image);

        check.finish(ProposalContent {
            name,
            project_name,
            mentor,
            mentor_email,
            contributors: self.contributors.trim().to_string(),
            objective,
            rationale,
            dataset,
            approach,
            possible_issues: self.possible_issues.trim().to_string(),
            timeline,
            expected_students,
            github_link,
            semester,
            year,
            objective_image,
            dataset_image,
            possible_issues_image,
        })
    }
}

/// Raw completion report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionForm {
    pub project_name: String,
    pub name: String,
    pub year: String,
    pub semester: String,
    pub github_link: String,
    pub video_link: String,
    #[serde(default)]
    pub project_website: String,
    /// File name of the uploaded project document.
    #[serde(default)]
    pub project_document: Option<String>,
}

impl CompletionForm {
    pub fn validate(self) -> Result<Completion, Vec<FieldError>> {
        let mut check = Checker::default();

        let project_name = check.required("project_name", &self.project_name);
        let name = check.required("name", &self.name);
        let year = check.matching("year", &self.year, year_re(), "must be a four digit year");
        let semester = check.required("semester", &self.semester);
        let github_link = check.matching(
            "github_link",
            &self.github_link,
            github_re(),
            "must look like https://github.com/owner/repo",
        );
        let video_link = check.matching("video_link", &self.video_link, url_re(), "must be a URL");
        let project_website = check.optional_matching(
            "project_website",
            &self.project_website,
            url_re(),
            "must be a URL",
        );

        let project_document = self
            .project_document
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(doc) = &project_document {
            if mime_guess::from_path(doc).first_raw() != Some(DOCX_MIME) {
                check.errors.push(FieldError::new(
                    "project_document",
                    "must be a .docx document",
                ));
            }
        }

        check.finish(Completion {
            project_name,
            name,
            year,
            semester,
            github_link,
            video_link,
            project_website: Some(project_website).filter(|w| !w.is_empty()),
            project_document,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_draft(project_name: &str, name: &str) -> ProposalDraft {
    ProposalDraft {
        name: name.to_string(),
        project_name: project_name.to_string(),
        mentor: "Dr. Rivera".to_string(),
        mentor_email: "rivera@example.edu".to_string(),
        contributors: "".to_string(),
        objective: "Forecast weekly demand".to_string(),
        rationale: "Stores overstock perishables".to_string(),
        dataset: "Five years of point of sale data".to_string(),
        approach: "Gradient boosted trees".to_string(),
        possible_issues: "Holiday effects".to_string(),
        timeline: "One semester".to_string(),
        expected_students: "3".to_string(),
        github_link: "https://github.com/example/retail".to_string(),
        semester: "Fall".to_string(),
        year: "2024".to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) fn sample_completion() -> CompletionForm {
    CompletionForm {
        project_name: "Retail Forecasting".to_string(),
        name: "Ada".to_string(),
        year: "2024".to_string(),
        semester: "Fall".to_string(),
        github_link: "https://github.com/example/retail".to_string(),
        video_link: "https://video.example.com/retail".to_string(),
        project_website: "".to_string(),
        project_document: Some("final_report.docx".to_string()),
    }
}
