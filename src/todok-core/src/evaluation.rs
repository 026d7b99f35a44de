//! Rubric evaluation of a finished debate.
//!
//! The judge model is asked for JSON but answers in free text, so parsing is
//! two-stage: the whole response first, then the span between the first `{`
//! and the last `}`. Whatever comes back is normalized into one canonical
//! shape; anything that cannot be normalized becomes [`EvaluationResult::Failed`].

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DebateError;

/// Maximum score for a single rubric category.
pub const CATEGORY_MAX: u32 = 25;
/// Maximum total score.
pub const TOTAL_MAX: u32 = 100;

const TOTAL_KEY: &str = "총점";
const SCORE_KEYS: [&str; 3] = ["점수", "score", "value"];
const COMMENT_KEY: &str = "코멘트";
const ADVICE_KEY: &str = "개선을 위한 조언";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum RubricCategory {
    #[serde(rename = "주제의 일관성")]
    TopicConsistency,
    #[serde(rename = "논리적 연결성")]
    LogicalCoherence,
    #[serde(rename = "반박의 적절성")]
    RebuttalQuality,
    #[serde(rename = "근거의 타당성")]
    EvidenceValidity,
}

impl RubricCategory {
    pub const ALL: [RubricCategory; 4] = [
        RubricCategory::TopicConsistency,
        RubricCategory::LogicalCoherence,
        RubricCategory::RebuttalQuality,
        RubricCategory::EvidenceValidity,
    ];

    /// Key used in the judge's JSON.
    pub fn label(&self) -> &'static str {
        match self {
            RubricCategory::TopicConsistency => "주제의 일관성",
            RubricCategory::LogicalCoherence => "논리적 연결성",
            RubricCategory::RebuttalQuality => "반박의 적절성",
            RubricCategory::EvidenceValidity => "근거의 타당성",
        }
    }

    pub fn criterion(&self) -> &'static str {
        match self {
            RubricCategory::TopicConsistency => "발언들이 주제에 부합하고 일관성이 있는가?",
            RubricCategory::LogicalCoherence => "발언들의 흐름과 논리적 연결성이 잘 유지되었는가?",
            RubricCategory::RebuttalQuality => "상대방의 주장을 이해하고 적절히 반박하였는가?",
            RubricCategory::EvidenceValidity => "주장에 대한 근거가 충분히 타당하고 논리적인가?",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryScore {
    pub category: RubricCategory,
    pub score: u32,
    pub comment: String,
    pub advice: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EvaluationReport {
    /// One entry per rubric category, in [`RubricCategory::ALL`] order.
    pub categories: Vec<CategoryScore>,
    pub total: u32,
}

impl EvaluationReport {
    /// Normalize the judge's JSON into a report.
    pub fn from_value(value: &Value) -> Result<Self, DebateError> {
        let categories = RubricCategory::ALL
            .iter()
            .map(|&category| {
                let entry = value
                    .get(category.label())
                    .ok_or_else(|| missing(category.label()))?;
                category_score(category, entry)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total = value
            .get(TOTAL_KEY)
            .and_then(extract_score)
            .ok_or_else(|| missing(TOTAL_KEY))?
            .min(TOTAL_MAX);

        Ok(Self { categories, total })
    }

    pub fn score_for(&self, category: RubricCategory) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Outcome of evaluating a debate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EvaluationResult {
    Report(EvaluationReport),
    Failed { error: String, total: u32 },
}

impl EvaluationResult {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        EvaluationResult::Failed {
            error: format!("An error occurred during evaluation: {}", reason),
            total: 0,
        }
    }

    /// Turn raw judge output into a result. Never fails.
    pub fn from_response(text: &str) -> Self {
        match parse_evaluation_json(text).and_then(|value| EvaluationReport::from_value(&value)) {
            Ok(report) => EvaluationResult::Report(report),
            Err(e) => {
                warn!("Evaluation could not be normalized: {}", e);
                debug!(response = %text, "Raw evaluation response");
                EvaluationResult::failed(e)
            }
        }
    }

    pub fn total(&self) -> u32 {
        match self {
            EvaluationResult::Report(report) => report.total,
            EvaluationResult::Failed { total, .. } => *total,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EvaluationResult::Failed { .. })
    }
}

/// Parse judge output as JSON, falling back to the outermost brace span.
pub fn parse_evaluation_json(text: &str) -> Result<Value, DebateError> {
    let direct = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    // Both delimiters are ASCII, so the byte offsets are char boundaries.
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&text[start..=end]).map_err(|e| {
                DebateError::EvaluationParse(format!("{} (direct parse: {})", e, direct))
            })
        }
        _ => Err(DebateError::EvaluationParse(
            "no JSON object found in response".to_string(),
        )),
    }
}

fn category_score(category: RubricCategory, entry: &Value) -> Result<CategoryScore, DebateError> {
    let score_source = match entry {
        Value::Object(map) => SCORE_KEYS
            .iter()
            .find_map(|k| map.get(*k))
            .ok_or_else(|| missing(&format!("{}.점수", category.label())))?,
        other => other,
    };

    let score = extract_score(score_source)
        .ok_or_else(|| missing(&format!("{}.점수", category.label())))?
        .min(CATEGORY_MAX);

    Ok(CategoryScore {
        category,
        score,
        comment: text_field(entry, COMMENT_KEY),
        advice: text_field(entry, ADVICE_KEY),
    })
}

/// Read a score from a number, a numeric string ("20", "20점", "20/25") or an
/// object nesting one of those.
fn extract_score(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().map(round_score),
        Value::String(s) => {
            let re = regex::Regex::new(r"-?\d+(?:\.\d+)?").ok()?;
            re.find(s)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(round_score)
        }
        Value::Object(map) => SCORE_KEYS
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(extract_score),
        _ => None,
    }
}

fn round_score(value: f64) -> u32 {
    if value.is_sign_negative() {
        0
    } else {
        value.round() as u32
    }
}

fn text_field(entry: &Value, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    }
}

fn missing(key: &str) -> DebateError {
    DebateError::MissingEvaluationKey(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WELL_FORMED: &str = r#"{
        "주제의 일관성": {"점수": 20, "코멘트": "주제를 잘 지켰습니다.", "개선을 위한 조언": "예시를 더 드세요."},
        "논리적 연결성": {"점수": 18, "코멘트": "흐름이 자연스럽습니다.", "개선을 위한 조언": "접속어를 활용하세요."},
        "반박의 적절성": {"점수": 15, "코멘트": "반박이 약합니다.", "개선을 위한 조언": "상대 근거를 직접 짚으세요."},
        "근거의 타당성": {"점수": 22, "코멘트": "근거가 탄탄합니다.", "개선을 위한 조언": "출처를 밝히세요."},
        "총점": 75
    }"#;

    #[test]
    fn test_direct_parse() {
        let result = EvaluationResult::from_response(WELL_FORMED);
        let EvaluationResult::Report(report) = result else {
            panic!("expected a report");
        };
        assert_eq!(report.total, 75);
        assert_eq!(report.categories.len(), 4);
        let rebuttal = report.score_for(RubricCategory::RebuttalQuality).unwrap();
        assert_eq!(rebuttal.score, 15);
        assert_eq!(rebuttal.comment, "반박이 약합니다.");
        assert_eq!(rebuttal.advice, "상대 근거를 직접 짚으세요.");
    }

    #[test]
    fn test_brace_extraction_recovers_embedded_object() {
        let text = r#"here is the result: {"주제의 일관성": {"점수": 20}, "논리적 연결성": {"점수": 20}, "반박의 적절성": {"점수": 20}, "근거의 타당성": {"점수": 20}, "총점": 80} thanks"#;
        let value = parse_evaluation_json(text).unwrap();
        assert_eq!(value["총점"], json!(80));

        let result = EvaluationResult::from_response(text);
        assert!(!result.is_failed());
        assert_eq!(result.total(), 80);
    }

    #[test]
    fn test_no_braces_yields_failed_record() {
        let err = parse_evaluation_json("평가를 할 수 없습니다.").unwrap_err();
        assert!(matches!(err, DebateError::EvaluationParse(_)));

        let result = EvaluationResult::from_response("평가를 할 수 없습니다.");
        assert!(result.is_failed());
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_reversed_braces_yield_failed_record() {
        let result = EvaluationResult::from_response("} nothing here {");
        assert!(result.is_failed());
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_unparseable_span_yields_failed_record() {
        let result = EvaluationResult::from_response("결과: {\"총점\": 80,, } 끝");
        match result {
            EvaluationResult::Failed { error, total } => {
                assert_eq!(total, 0);
                assert!(error.starts_with("An error occurred during evaluation:"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_key_yields_failed_record() {
        let value = json!({
            "주제의 일관성": {"점수": 20},
            "논리적 연결성": {"점수": 20},
            "반박의 적절성": {"점수": 20},
            "근거의 타당성": {"점수": 20}
        });
        let err = EvaluationReport::from_value(&value).unwrap_err();
        assert!(matches!(err, DebateError::MissingEvaluationKey(ref k) if k == "총점"));

        let result = EvaluationResult::from_response(&value.to_string());
        match result {
            EvaluationResult::Failed { error, total } => {
                assert_eq!(total, 0);
                assert!(error.contains("Missing key 총점"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_category_score_yields_failed_record() {
        let value = json!({
            "주제의 일관성": {"코멘트": "점수 없음"},
            "논리적 연결성": 20,
            "반박의 적절성": 20,
            "근거의 타당성": 20,
            "총점": 60
        });
        let err = EvaluationReport::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("주제의 일관성"));
    }

    #[test]
    fn test_score_shapes_normalize() {
        let value = json!({
            "주제의 일관성": 21,
            "논리적 연결성": {"점수": "18점", "코멘트": "좋아요"},
            "반박의 적절성": {"점수": {"점수": 12.6}},
            "근거의 타당성": {"score": "20/25"},
            "총점": "72점"
        });
        let report = EvaluationReport::from_value(&value).unwrap();
        let scores: Vec<u32> = report.categories.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![21, 18, 13, 20]);
        assert_eq!(report.total, 72);
        assert_eq!(report.categories[0].comment, "");
        assert_eq!(report.categories[1].comment, "좋아요");
    }

    #[test]
    fn test_scores_are_clamped() {
        let value = json!({
            "주제의 일관성": 40,
            "논리적 연결성": -3,
            "반박의 적절성": 25,
            "근거의 타당성": 0,
            "총점": 130
        });
        let report = EvaluationReport::from_value(&value).unwrap();
        let scores: Vec<u32> = report.categories.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![25, 0, 25, 0]);
        assert_eq!(report.total, 100);
    }

    #[test]
    fn test_failed_record_serializes_flat() {
        let value = serde_json::to_value(EvaluationResult::failed("boom")).unwrap();
        assert_eq!(value["total"], json!(0));
        assert_eq!(
            value["error"],
            json!("An error occurred during evaluation: boom")
        );
    }
}
