use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct ResearchJobRow {
    pub id: Uuid,
    pub company_name: String,
    pub company_domain: Option<String>,
    pub ticker: Option<String>,
    pub geography: Option<String>,
    pub industry: Option<String>,
    pub notes: Option<String>,
    pub sections: Vec<String>,
    pub status: String,
    pub cancel_requested: bool,
    pub total_cost_usd: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub confidence: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ResearchStageRow {
    pub job_id: Uuid,
    pub section: String,
    pub status: String,
    pub attempts: i32,
    pub output: Option<Value>,
    pub sources: Value,
    pub confidence: Option<f64>,
    pub confidence_rationale: Option<String>,
    pub cost_usd: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
