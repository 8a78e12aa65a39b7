//! Keeps staff-picker question options in line with a contacts extract
//!
//! Every listed question should offer exactly one option per active contact,
//! labelled `"{Last}, {First} - {Division} [{Employee Number}]"`. Missing
//! labels are created; anything else is deleted.

use crate::api::{endpoints, ApiClient, QuestionOption};
use crate::error::{ExtractError, Result};
use crate::paginator::{PagingPolicy, Query};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Contact status that marks a contact as gone
pub const TERMINATED: &str = "TERMINATED";

/// `options.toml`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OptionsConfig {
    #[serde(default)]
    pub surveys: Vec<SurveyQuestions>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SurveyQuestions {
    pub id: String,
    #[serde(default)]
    pub question_ids: Vec<String>,
}

impl OptionsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            ExtractError::config(format!("invalid options file {}: {}", path.display(), e))
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
enum Text {
    Str(String),
    Int(i64),
}

impl Text {
    fn render(&self) -> String {
        match self {
            Text::Str(s) => s.clone(),
            Text::Int(n) => n.to_string(),
        }
    }
}

/// One row of the contacts extract
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Contact {
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Last Name")]
    last_name: String,
    #[serde(rename = "First Name")]
    first_name: String,
    #[serde(rename = "Division")]
    division: String,
    #[serde(rename = "Employee Number")]
    employee_number: Text,
}

impl Contact {
    pub fn is_active(&self) -> bool {
        self.status.as_deref() != Some(TERMINATED)
    }

    /// Option label; apostrophes are dropped
    pub fn label(&self) -> String {
        format!(
            "{}, {} - {} [{}]",
            self.last_name,
            self.first_name,
            self.division,
            self.employee_number.render()
        )
        .replace('\'', "")
    }
}

pub fn load_contacts(path: &Path) -> Result<Vec<Contact>> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        ExtractError::config(format!("invalid contacts file {}: {}", path.display(), e))
    })
}

/// Labels of active contacts, deduplicated, in extract order
pub fn active_labels(contacts: &[Contact]) -> Vec<String> {
    let mut seen = HashSet::new();
    contacts
        .iter()
        .filter(|c| c.is_active())
        .map(Contact::label)
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionPlan {
    /// Labels to create, as both title and value
    pub create: Vec<String>,
    pub delete: Vec<QuestionOption>,
}

impl OptionPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Diff the options a question has against the labels it should have
pub fn plan_option_changes(existing: &[QuestionOption], active: &[String]) -> OptionPlan {
    let present: HashSet<&str> = existing.iter().map(|o| o.value.as_str()).collect();
    let wanted: HashSet<&str> = active.iter().map(String::as_str).collect();

    OptionPlan {
        create: active
            .iter()
            .filter(|label| !present.contains(label.as_str()))
            .cloned()
            .collect(),
        delete: existing
            .iter()
            .filter(|o| !wanted.contains(o.value.as_str()))
            .cloned()
            .collect(),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub questions: usize,
    pub created: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub struct OptionReconciler<'a> {
    client: &'a ApiClient,
    paging: PagingPolicy,
    dry_run: bool,
}

impl<'a> OptionReconciler<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            paging: PagingPolicy::default(),
            dry_run: false,
        }
    }

    /// Only log the planned changes
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_paging(mut self, paging: PagingPolicy) -> Self {
        self.paging = paging;
        self
    }

    /// Reconcile every configured question. Individual failures are logged
    /// and counted; they never stop the remaining changes.
    pub async fn reconcile(&self, config: &OptionsConfig, active: &[String]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for survey in &config.surveys {
            for question_id in &survey.question_ids {
                report.questions += 1;
                self.reconcile_question(&survey.id, question_id, active, &mut report)
                    .await;
            }
        }

        info!(
            questions = report.questions,
            created = report.created,
            deleted = report.deleted,
            failed = report.failed,
            "Option reconciliation finished"
        );
        report
    }

    #[instrument(skip(self, active, report))]
    async fn reconcile_question(
        &self,
        survey_id: &str,
        question_id: &str,
        active: &[String],
        report: &mut ReconcileReport,
    ) {
        let existing = match self.list_options(survey_id, question_id).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(%error, "Failed to list options");
                report.failed += 1;
                return;
            },
        };

        let plan = plan_option_changes(&existing, active);
        info!(
            existing = existing.len(),
            create = plan.create.len(),
            delete = plan.delete.len(),
            "Planned option changes"
        );
        if self.dry_run {
            for label in &plan.create {
                info!(%label, "Would create option");
            }
            for option in &plan.delete {
                info!(option_id = %option.id, value = %option.value, "Would delete option");
            }
            return;
        }

        for label in &plan.create {
            let params = [("title", label.as_str()), ("value", label.as_str())];
            match self
                .client
                .create(&endpoints::question_options(survey_id, question_id), &params)
                .await
            {
                Ok(_) => {
                    info!(%label, "Created option");
                    report.created += 1;
                },
                Err(error) => {
                    warn!(%label, %error, "Failed to create option");
                    report.failed += 1;
                },
            }
        }

        for option in &plan.delete {
            match self
                .client
                .delete(&endpoints::question_option(survey_id, question_id, &option.id))
                .await
            {
                Ok(_) => {
                    info!(option_id = %option.id, value = %option.value, "Deleted option");
                    report.deleted += 1;
                },
                Err(error) => {
                    warn!(option_id = %option.id, %error, "Failed to delete option");
                    report.failed += 1;
                },
            }
        }
    }

    async fn list_options(&self, survey_id: &str, question_id: &str) -> Result<Vec<QuestionOption>> {
        Query::new(self.client, endpoints::question_options(survey_id, question_id))
            .list(self.paging)
            .await?
            .iter()
            .map(QuestionOption::from_value)
            .collect()
    }
}
