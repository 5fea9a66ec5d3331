//! Facet filtering and page views over a proposal collection.
//!
//! A [`Facet`] is either unconstrained or a set of admitted values. Values
//! inside one facet are alternatives; facets are combined by conjunction.
//! The proposal id facet is an exact match, expressed as a one-value set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumIter, EnumString};

use crate::db::{Proposal, ProposalId, Status};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facet(Option<BTreeSet<String>>);

impl Facet {
    pub fn any() -> Self {
        Self(None)
    }

    /// A user selection. Selecting nothing means "no constraint".
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Self(None)
        } else {
            Self(Some(set))
        }
    }

    /// Exact match on a single value; an empty string is no constraint.
    pub fn exact(value: &str) -> Self {
        if value.is_empty() {
            Self(None)
        } else {
            Self(Some(BTreeSet::from([value.to_string()])))
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.0.is_none()
    }

    pub fn admits(&self, value: &str) -> bool {
        match &self.0 {
            None => true,
            Some(values) => values.contains(value),
        }
    }

    /// Conjunction of two facets. Two disjoint selections admit nothing.
    pub fn and(&self, other: &Facet) -> Facet {
        match (&self.0, &other.0) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => Facet(Some(a.intersection(b).cloned().collect())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    pub project_name: Facet,
    pub year: Facet,
    pub semester: Facet,
    pub student_name: Facet,
    pub proposal_id: Facet,
}

impl Facets {
    pub fn is_unconstrained(&self) -> bool {
        self.project_name.is_unconstrained()
            && self.year.is_unconstrained()
            && self.semester.is_unconstrained()
            && self.student_name.is_unconstrained()
            && self.proposal_id.is_unconstrained()
    }

    pub fn matches(&self, proposal: &Proposal) -> bool {
        let c = &proposal.content;
        self.project_name.admits(&c.project_name)
            && self.year.admits(&c.year)
            && self.semester.admits(&c.semester)
            && self.student_name.admits(&c.name)
            && self.proposal_id.admits(proposal.proposal_id.as_str())
    }

    pub fn intersect(&self, other: &Facets) -> Facets {
        Facets {
            project_name: self.project_name.and(&other.project_name),
            year: self.year.and(&other.year),
            semester: self.semester.and(&other.semester),
            student_name: self.student_name.and(&other.student_name),
            proposal_id: self.proposal_id.and(&other.proposal_id),
        }
    }

    /// Builds facets from decoded query pairs. Facet keys may repeat; `view`
    /// selects the page. Unknown keys are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<(View, Facets), String> {
        let mut view = View::default();
        let mut project_names = Vec::new();
        let mut years = Vec::new();
        let mut semesters = Vec::new();
        let mut names = Vec::new();
        let mut proposal_id = String::new();

        for (key, value) in pairs {
            // Blank form fields mean "no selection".
            let blank = value.trim().is_empty();
            match key.as_str() {
                _ if blank => {}
                "view" => {
                    view = value
                        .parse()
                        .map_err(|_| format!("unknown view {value:?}"))?;
                }
                "project_name" => project_names.push(value.clone()),
                "year" => years.push(value.clone()),
                "semester" => semesters.push(value.clone()),
                "name" => names.push(value.clone()),
                "proposal_id" => proposal_id = value.trim().to_string(),
                _ => {}
            }
        }

        Ok((
            view,
            Facets {
                project_name: Facet::one_of(project_names),
                year: Facet::one_of(years),
                semester: Facet::one_of(semesters),
                student_name: Facet::one_of(names),
                proposal_id: Facet::exact(&proposal_id),
            },
        ))
    }
}

/// Keeps the proposals admitted by every constrained facet.
pub fn apply(proposals: Vec<Proposal>, facets: &Facets) -> Vec<Proposal> {
    if proposals.is_empty() {
        return proposals;
    }
    proposals.into_iter().filter(|p| facets.matches(p)).collect()
}

/// The page a listing is built for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum View {
    ProfessorProposals,
    PendingApproval,
    ToBeEdited,
    Rejected,
    Approved,
    PendingCompletion,
    Completed,
    #[default]
    All,
}

impl View {
    /// The status a view lists, if it is defined by one.
    pub fn status(self) -> Option<Status> {
        match self {
            View::PendingApproval => Some(Status::PendingApproval),
            View::ToBeEdited => Some(Status::ToBeEdited),
            View::Rejected => Some(Status::Rejected),
            View::Approved => Some(Status::Approved),
            View::PendingCompletion => Some(Status::PendingCompletion),
            View::Completed => Some(Status::Completed),
            View::ProfessorProposals | View::All => None,
        }
    }

    pub fn admits(self, proposal: &Proposal) -> bool {
        match self {
            View::All => true,
            View::ProfessorProposals => proposal.proposed_by_professor,
            other => other.status() == Some(proposal.status),
        }
    }
}

/// Distinct values present in a collection, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetOptions {
    pub project_names: Vec<String>,
    pub years: Vec<String>,
    pub semesters: Vec<String>,
    pub student_names: Vec<String>,
}

impl FacetOptions {
    pub fn collect(proposals: &[Proposal]) -> Self {
        fn push_unique(values: &mut Vec<String>, value: &str) {
            if !values.iter().any(|v| v == value) {
                values.push(value.to_string());
            }
        }

        let mut options = FacetOptions::default();
        for p in proposals {
            push_unique(&mut options.project_names, &p.content.project_name);
            push_unique(&mut options.years, &p.content.year);
            push_unique(&mut options.semesters, &p.content.semester);
            push_unique(&mut options.student_names, &p.content.name);
        }
        options
    }
}

/// Table row shown by list pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalSummary {
    pub proposal_id: ProposalId,
    pub name: String,
    pub project_name: String,
    pub mentor: String,
    pub semester: String,
    pub year: String,
    pub status: Status,
}

impl From<&Proposal> for ProposalSummary {
    fn from(p: &Proposal) -> Self {
        Self {
            proposal_id: p.proposal_id.clone(),
            name: p.content.name.clone(),
            project_name: p.content.project_name.clone(),
            mentor: p.content.mentor.clone(),
            semester: p.content.semester.clone(),
            year: p.content.year.clone(),
            status: p.status,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_proposal(name: &str, project: &str, year: &str, semester: &str) -> Proposal {
    let mut draft = crate::forms::sample_draft(project, name);
    draft.year = year.to_string();
    draft.semester = semester.to_string();
    let content = draft.validate().unwrap();
    Proposal::new(ProposalId::generate(), Status::PendingApproval, false, content)
}
