//! Resource paths of the remote API
//!
//! Objects nest: `survey/{id}/surveyquestion/{qid}/surveyoption/{oid}`.

use std::fmt;

pub const SURVEY: &str = "survey";
pub const SURVEY_QUESTION: &str = "surveyquestion";
pub const SURVEY_CAMPAIGN: &str = "surveycampaign";
pub const SURVEY_RESPONSE: &str = "surveyresponse";
pub const SURVEY_OPTION: &str = "surveyoption";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    object: String,
    id: Option<String>,
}

/// Path of a (possibly nested) API object, relative to the versioned root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    segments: Vec<Segment>,
}

impl ResourcePath {
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment {
                object: object.into(),
                id: None,
            }],
        }
    }

    /// Address one instance of the innermost object
    pub fn id(mut self, id: impl Into<String>) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.id = Some(id.into());
        }
        self
    }

    /// Descend into a sub-object
    pub fn child(mut self, object: impl Into<String>) -> Self {
        self.segments.push(Segment {
            object: object.into(),
            id: None,
        });
        self
    }

    /// Full URL under `root` (e.g. `https://api.alchemer.com/v5`)
    pub fn url(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&segment.object)?;
            if let Some(id) = &segment.id {
                write!(f, "/{}", id)?;
            }
        }
        Ok(())
    }
}

pub fn surveys() -> ResourcePath {
    ResourcePath::new(SURVEY)
}

pub fn survey(id: &str) -> ResourcePath {
    surveys().id(id)
}

pub fn survey_questions(survey_id: &str) -> ResourcePath {
    survey(survey_id).child(SURVEY_QUESTION)
}

pub fn survey_campaigns(survey_id: &str) -> ResourcePath {
    survey(survey_id).child(SURVEY_CAMPAIGN)
}

pub fn survey_responses(survey_id: &str) -> ResourcePath {
    survey(survey_id).child(SURVEY_RESPONSE)
}

pub fn question_options(survey_id: &str, question_id: &str) -> ResourcePath {
    survey_questions(survey_id)
        .id(question_id)
        .child(SURVEY_OPTION)
}

pub fn question_option(survey_id: &str, question_id: &str, option_id: &str) -> ResourcePath {
    question_options(survey_id, question_id).id(option_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_survey_paths() {
        assert_eq!(surveys().to_string(), "survey");
        assert_eq!(survey("42").to_string(), "survey/42");
        assert_eq!(survey_responses("42").to_string(), "survey/42/surveyresponse");
        assert_eq!(survey_campaigns("42").to_string(), "survey/42/surveycampaign");
    }

    #[test]
    fn test_option_paths() {
        assert_eq!(
            question_option("42", "7", "10091").to_string(),
            "survey/42/surveyquestion/7/surveyoption/10091"
        );
    }

    #[test]
    fn test_url_joins_root() {
        assert_eq!(
            survey_questions("1").url("https://api.alchemer.com/v5/"),
            "https://api.alchemer.com/v5/survey/1/surveyquestion"
        );
    }
}
