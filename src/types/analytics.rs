//! Wire types for the insights and usage-log analytics services
//!
//! Every endpoint answers with the platform envelope
//! `{status, message, data, error?}`. Payload field names are camelCase on
//! the wire and kept as-is via serde renames.

use serde::{Deserialize, Serialize};

/// Platform response envelope shared by all analytics endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub status: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

// ==========================================================================
// Insights payloads
// ==========================================================================

/// One metric tile on the generate-answer overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoCardMetric {
    pub count: i64,
}

/// Denominator source for FAQ frequency derivation. Single page by contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoCards {
    #[serde(rename = "totalQuestions")]
    pub total_questions: InfoCardMetric,
    #[serde(rename = "totalQuestionsAnswered")]
    pub total_questions_answered: InfoCardMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryData {
    pub id: String,
    pub category: String,
    pub distribution: f64,
    pub trend: f64,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDistribution {
    #[serde(default)]
    pub category: Vec<CategoryData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCategoryData {
    pub id: String,
    #[serde(rename = "subCategory")]
    pub sub_category: String,
    pub distribution: f64,
    pub trend: f64,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCategoryDistribution {
    #[serde(rename = "subCategory", default)]
    pub sub_category: Vec<SubCategoryData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopQuestionData {
    pub id: String,
    pub question: String,
    pub frequency: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopQuestions {
    #[serde(rename = "topQuestions", default)]
    pub top_questions: Vec<TopQuestionData>,
}

// ==========================================================================
// Usage-log payloads
// ==========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedBy {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Creation time in epoch milliseconds.
    pub created: i64,
    #[serde(rename = "createdBy")]
    pub created_by: CreatedBy,
}

/// One answer or autofill log line. Both endpoints share the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLog {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(rename = "userInstruction", default)]
    pub user_instruction: String,
    #[serde(default)]
    pub sources: Vec<SourceData>,
    pub status: String,
    #[serde(rename = "initiatedFrom", default)]
    pub initiated_from: String,
    pub meta: RecordMeta,
    #[serde(rename = "txConsumed", default)]
    pub tx_consumed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerStats {
    pub total: i64,
    pub answered: i64,
    #[serde(rename = "noInformation")]
    pub no_information: i64,
    #[serde(rename = "txConsumed", default)]
    pub tx_consumed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutofillStats {
    #[serde(rename = "totalRuns")]
    pub total_runs: i64,
    #[serde(rename = "totalDocuments")]
    pub total_documents: i64,
    #[serde(rename = "totalQuestions")]
    pub total_questions: i64,
    #[serde(rename = "totalQuestionsAnswered")]
    pub total_questions_answered: i64,
    #[serde(rename = "averageResponseTime", default)]
    pub average_response_time: f64,
}

/// One AI-teammate conversation line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeammateLog {
    pub id: String,
    pub title: String,
    #[serde(rename = "averageTime", default)]
    pub average_time: f64,
    #[serde(rename = "threadCount", default)]
    pub thread_count: i64,
    pub meta: RecordMeta,
    #[serde(rename = "txConsumed", default)]
    pub tx_consumed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeammateStats {
    #[serde(rename = "threadCount")]
    pub thread_count: i64,
    #[serde(rename = "averageTime", default)]
    pub average_time: f64,
    #[serde(rename = "txConsumed", default)]
    pub tx_consumed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_data() {
        let raw = serde_json::json!({
            "status": 200,
            "message": "ok",
            "data": {"totalQuestions": {"count": 1200}, "totalQuestionsAnswered": {"count": 1000}}
        });
        let env: ApiEnvelope<InfoCards> = serde_json::from_value(raw).unwrap();
        assert_eq!(env.status, 200);
        assert_eq!(env.data.unwrap().total_questions_answered.count, 1000);
    }

    #[test]
    fn test_envelope_missing_data_is_none() {
        let raw = serde_json::json!({"status": 500, "message": "boom", "error": "internal"});
        let env: ApiEnvelope<TopQuestions> = serde_json::from_value(raw).unwrap();
        assert!(env.data.is_none());
        assert_eq!(env.error.as_deref(), Some("internal"));
    }

    #[test]
    fn test_generation_log_wire_names() {
        let raw = serde_json::json!({
            "id": "log-1",
            "question": "What is the SLA?",
            "answer": "99.9%",
            "userInstruction": "be brief",
            "sources": [{"name": "SLA doc", "url": "https://docs/sla"}],
            "status": "ANSWERED",
            "initiatedFrom": "web",
            "meta": {"created": 1746297000000i64, "createdBy": {"id": "u1", "fullName": "Dana Jones"}},
            "txConsumed": 1.5
        });
        let log: GenerationLog = serde_json::from_value(raw).unwrap();
        assert_eq!(log.user_instruction, "be brief");
        assert_eq!(log.meta.created_by.full_name, "Dana Jones");
        assert_eq!(log.sources[0].url, "https://docs/sla");
    }

    #[test]
    fn test_category_list_defaults_empty() {
        let dist: CategoryDistribution = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(dist.category.is_empty());
    }
}
