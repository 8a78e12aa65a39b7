//! The run driver
//!
//! One [`Extractor::run`] lists every survey and extracts them one at a time:
//! survey snapshot, questions, campaigns, disqualified responses, responses.
//! A survey's bookmark is committed and flushed as soon as all of its exports
//! have landed, so a crash later in the run keeps the progress made so far.

use crate::api::{endpoints, record_id, ListApi, Survey};
use crate::checkpoint::CheckpointStore;
use crate::error::{ExtractError, Result};
use crate::export::{Endpoint, ExportBatch, ExportLocation, ExportSink};
use crate::filter::FilterSet;
use crate::paginator::{PagingPolicy, Query};
use crate::skip::{skip_reason, ResponseCounts, SkipReason, DISQUALIFIED};
use crate::window::{Window, WindowCalculator};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Field the response windows filter on
pub const SUBMITTED_FIELD: &str = "date_submitted";

/// A survey that could not be extracted this run
#[derive(Debug)]
pub struct ResourceFailure {
    pub survey_id: String,
    /// The endpoint being extracted when it failed, if it got that far
    pub endpoint: Option<Endpoint>,
    pub error: ExtractError,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.endpoint {
            Some(endpoint) => write!(f, "survey {} ({}): {}", self.survey_id, endpoint, self.error),
            None => write!(f, "survey {}: {}", self.survey_id, self.error),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub listed: usize,
    pub extracted: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failures: Vec<ResourceFailure>,
    pub exports: Vec<ExportLocation>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} surveys listed, {} extracted, {} skipped, {} failed, {} files exported",
            self.listed,
            self.extracted.len(),
            self.skipped.len(),
            self.failures.len(),
            self.exports.len()
        )
    }
}

struct StepError {
    endpoint: Option<Endpoint>,
    error: ExtractError,
}

fn at(endpoint: Endpoint) -> impl FnOnce(ExtractError) -> StepError {
    move |error| StepError {
        endpoint: Some(endpoint),
        error,
    }
}

pub struct Extractor<'a, A: ListApi + ?Sized> {
    api: &'a A,
    sink: ExportSink<'a>,
    checkpoint: &'a mut CheckpointStore,
    windows: WindowCalculator,
    paging: PagingPolicy,
    academic_year: i32,
    only: Option<BTreeSet<String>>,
}

impl<'a, A: ListApi + ?Sized> Extractor<'a, A> {
    pub fn new(
        api: &'a A,
        sink: ExportSink<'a>,
        checkpoint: &'a mut CheckpointStore,
        windows: WindowCalculator,
        academic_year: i32,
    ) -> Self {
        Self {
            api,
            sink,
            checkpoint,
            windows,
            paging: PagingPolicy::default(),
            academic_year,
            only: None,
        }
    }

    pub fn with_paging(mut self, paging: PagingPolicy) -> Self {
        self.paging = paging;
        self
    }

    /// Restrict the run to these survey ids
    pub fn with_survey_filter(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        let ids: BTreeSet<String> = ids.into_iter().collect();
        self.only = (!ids.is_empty()).then_some(ids);
        self
    }

    /// Extract every listed survey as of `now`.
    ///
    /// Per-survey failures land in the report. Listing failures and fatal
    /// errors (checkpoint writes above all) abort the run.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<RunReport> {
        let mut report = RunReport::default();

        let listing = Query::new(self.api, endpoints::surveys())
            .list(self.paging)
            .await?;
        report.listed = listing.len();
        info!(surveys = listing.len(), "Listed surveys");

        for raw in listing {
            let listed_id = record_id(&raw);
            if let Some(only) = &self.only {
                match &listed_id {
                    Some(id) if only.contains(id) => {},
                    _ => continue,
                }
            }

            let survey = match Survey::from_value(raw, self.windows.timezone()) {
                Ok(survey) => survey,
                Err(error) => {
                    let survey_id = listed_id.unwrap_or_else(|| "<unknown>".to_string());
                    warn!(survey_id = %survey_id, %error, "Skipping unreadable survey record");
                    report.failures.push(ResourceFailure {
                        survey_id,
                        endpoint: Some(Endpoint::Survey),
                        error,
                    });
                    continue;
                },
            };

            let window = self
                .windows
                .compute_window(&survey.id, now, self.checkpoint.bookmarks());

            if let Some(reason) = skip_reason(&survey, &window) {
                info!(survey_id = %survey.id, %reason, "Skipping survey");
                report.skipped.push((survey.id, reason));
                continue;
            }

            match self.extract_survey(&survey, &window).await {
                Ok(exports) => {
                    self.checkpoint.commit(survey.id.clone(), window.end);
                    self.checkpoint.flush()?;
                    info!(
                        survey_id = %survey.id,
                        files = exports.len(),
                        bookmark = %window.end,
                        "Survey extracted"
                    );
                    report.exports.extend(exports);
                    report.extracted.push(survey.id);
                },
                Err(StepError { error, .. }) if error.is_fatal() => return Err(error),
                Err(StepError { endpoint, error }) => {
                    warn!(
                        survey_id = %survey.id,
                        endpoint = endpoint.map(|e| e.name()).unwrap_or("-"),
                        %error,
                        "Survey extraction failed; bookmark left unchanged"
                    );
                    report.failures.push(ResourceFailure {
                        survey_id: survey.id,
                        endpoint,
                        error,
                    });
                },
            }
        }

        info!(%report, "Run finished");
        Ok(report)
    }

    #[instrument(skip_all, fields(survey_id = %listing.id, start = %window.start, end = %window.end))]
    async fn extract_survey(
        &self,
        listing: &Survey,
        window: &Window,
    ) -> std::result::Result<Vec<ExportLocation>, StepError> {
        let id = listing.id.as_str();
        let mut exports = Vec::new();

        let detail = self
            .api
            .get_one(&endpoints::survey(id))
            .await
            .and_then(|raw| Survey::from_value(raw, self.windows.timezone()))
            .map_err(at(Endpoint::Survey))?;
        let counts = ResponseCounts::from_statistics(detail.statistics.as_ref());
        info!(
            title = %detail.title,
            responses = counts.total,
            disqualified = counts.disqualified,
            "Extracting survey"
        );

        exports.push(
            self.sink
                .export(ExportBatch::snapshot(Endpoint::Survey, id, vec![detail.raw]))
                .await
                .map_err(at(Endpoint::Survey))?,
        );

        for (endpoint, path) in [
            (Endpoint::SurveyQuestion, endpoints::survey_questions(id)),
            (Endpoint::SurveyCampaign, endpoints::survey_campaigns(id)),
        ] {
            let records = Query::new(self.api, path)
                .list(self.paging)
                .await
                .map_err(at(endpoint))?;
            info!(endpoint = %endpoint, records = records.len(), "Fetched snapshot");
            exports.push(
                self.sink
                    .export(ExportBatch::snapshot(endpoint, id, records))
                    .await
                    .map_err(at(endpoint))?,
            );
        }

        if counts.wants_disqualified() {
            let endpoint = Endpoint::SurveyResponseDisqualified;
            let ay_window = self
                .windows
                .academic_year_window(self.academic_year, window.end)
                .map_err(at(endpoint))?;
            if ay_window.is_inverted() {
                warn!(
                    academic_year = self.academic_year,
                    "Academic year starts after the window end; no disqualified responses pulled"
                );
            } else {
                let status = FilterSet::new()
                    .filter("status", "=", DISQUALIFIED)
                    .map_err(at(endpoint))?;
                let filters = ay_window
                    .filters(&status, SUBMITTED_FIELD)
                    .map_err(at(endpoint))?;
                if let Some(location) = self
                    .export_partition(endpoint, id, &ay_window, filters)
                    .await
                    .map_err(at(endpoint))?
                {
                    exports.push(location);
                }
            }
        }

        let endpoint = Endpoint::SurveyResponse;
        let filters = window
            .filters(&FilterSet::new(), SUBMITTED_FIELD)
            .map_err(at(endpoint))?;
        // without statistics the count comes from a zero-size probe of the window
        let wants_responses = match detail.statistics {
            Some(_) => counts.wants_responses(),
            None => {
                let total = self
                    .api
                    .probe_total(&endpoints::survey_responses(id), &filters)
                    .await
                    .map_err(at(endpoint))?;
                debug!(total, "Probed response count");
                total > 0
            },
        };

        if wants_responses {
            if let Some(location) = self
                .export_partition(endpoint, id, window, filters)
                .await
                .map_err(at(endpoint))?
            {
                exports.push(location);
            }
        }

        Ok(exports)
    }

    /// Fetch one window of responses and export it; nothing is written for
    /// an empty window
    async fn export_partition(
        &self,
        endpoint: Endpoint,
        survey_id: &str,
        window: &Window,
        filters: FilterSet,
    ) -> Result<Option<ExportLocation>> {
        let records = Query::new(self.api, endpoints::survey_responses(survey_id))
            .with_filters(filters)
            .list(self.paging)
            .await?;
        info!(endpoint = %endpoint, records = records.len(), "Fetched responses");

        if records.is_empty() {
            return Ok(None);
        }
        let batch = ExportBatch::partition(endpoint, survey_id, window.marker(), records);
        self.sink.export(batch).await.map(Some)
    }
}
