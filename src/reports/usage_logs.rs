//! Usage-log reports (answer, autofill, AI teammate)
//!
//! Routes: `(usageLogs, answer|autofill|AITeammate, *)`. Each report is a
//! Logs sheet fed from the paginated list endpoint plus a Summary sheet fed
//! from the single stats call. Answer and autofill share the log line shape;
//! the teammate report has its own.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::{Stream, TryStreamExt};
use tracing::info;

use crate::clients::usage_logs::UsageLogsClient;
use crate::config::BATCH_SIZE;
use crate::error::ExportError;
use crate::reports::filters::{cell_date, date_range, date_range_label};
use crate::reports::workbook::{Sheet, SheetLayout, StoredWorkbook, WorkbookDoc};
use crate::reports::{ArtifactHandle, ExportOutput, JobContext, ReportBuilder};
use crate::storage::{export_key, ObjectStorage};
use crate::types::{AnswerStats, AutofillStats, ExportJob, GenerationLog, TeammateLog, TeammateStats};

/// Column headers and data rows start below the metadata block.
const HEADER_ROW: u32 = 8;
const DATA_ROW: u32 = 9;
/// Summary sheet: Metric/Value header row and first metric row.
const SUMMARY_HEADER_ROW: u32 = 6;
const SUMMARY_FIRST_ROW: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Answer,
    Autofill,
    Teammate,
}

impl UsageKind {
    /// The wire value of the job's `type` field, also the sheet name prefix.
    fn label(&self) -> &'static str {
        match self {
            UsageKind::Answer => "Answer",
            UsageKind::Autofill => "Autofill",
            UsageKind::Teammate => "AITeammate",
        }
    }

    fn logs_sheet(&self) -> String {
        format!("{} Usage logs - Logs", self.label())
    }

    fn summary_sheet(&self) -> String {
        format!("{} Usage logs - Summary", self.label())
    }

    fn log_headers(&self) -> &'static [&'static str] {
        match self {
            UsageKind::Answer | UsageKind::Autofill => &[
                "Question",
                "Instruction",
                "Answer",
                "Sources",
                "Status",
                "Date",
                "User",
                "Initiated from",
                "Transactions consumed",
            ],
            UsageKind::Teammate => &[
                "Conversations",
                "Date",
                "Owner",
                "No. of Turns",
                "Response time per response",
                "Transactions consumed",
            ],
        }
    }

    fn summary_labels(&self) -> &'static [&'static str] {
        match self {
            UsageKind::Answer => &[
                "Total questions asked",
                "Total questions answered",
                "No information found",
                "Transactions consumed",
            ],
            UsageKind::Autofill => &[
                "Autofill runs",
                "Documents autofilled",
                "Total questions",
                "Questions answered",
                "Average response time",
            ],
            UsageKind::Teammate => &[
                "Total Conversations",
                "Average response time",
                "Transactions consumed",
            ],
        }
    }
}

/// Title-case a report type for the filename (`AITeammate` -> `Aiteammate`).
fn title_case(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn usage_filename(kind: UsageKind, job: &ExportJob) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let prefix = title_case(kind.label());
    match date_range(job.page_filter.as_ref()) {
        Some(range) => format!("{}_Usage_logs_{}_{}.xlsx", prefix, range.file_label(), stamp),
        None => format!("{}_Usage_logs_{}.xlsx", prefix, stamp),
    }
}

pub struct UsageLogsReportBuilder {
    kind: UsageKind,
    client: UsageLogsClient,
    store: Arc<dyn ObjectStorage>,
    expiry_hours: u64,
    max_bytes: usize,
}

impl UsageLogsReportBuilder {
    pub fn new(
        kind: UsageKind,
        client: UsageLogsClient,
        store: Arc<dyn ObjectStorage>,
        expiry_hours: u64,
        max_export_size_mb: u64,
    ) -> Self {
        Self {
            kind,
            client,
            store,
            expiry_hours,
            max_bytes: max_export_size_mb as usize * 1024 * 1024,
        }
    }
}

#[async_trait]
impl ReportBuilder for UsageLogsReportBuilder {
    async fn build(
        &self,
        job: &ExportJob,
        ctx: &JobContext,
    ) -> Result<ExportOutput, ExportError> {
        ctx.ensure_active()?;
        info!(
            "Building {} usage-log report for event {}",
            self.kind.label(),
            job.event_id
        );

        let filename = usage_filename(self.kind, job);
        let key = export_key(job.client_id, &job.event_id, &filename);
        let (doc, layouts) = skeleton(self.kind, job);
        let stored =
            StoredWorkbook::create(self.store.clone(), key, &doc, layouts, self.max_bytes).await?;

        let filter = job.filter.as_ref();
        let page_filter = job.page_filter.as_ref();

        match self.kind {
            UsageKind::Answer => {
                let pages = self.client.answer_log_pages(filter, page_filter, BATCH_SIZE);
                self.append_generation_pages(ctx, &stored, pages).await?;
                if let Some(stats) = self.client.answer_stats(filter, page_filter).await? {
                    let sheet_name = self.kind.summary_sheet();
                    stored
                        .update(move |doc| {
                            write_answer_summary(doc.sheet_mut(&sheet_name)?, &stats);
                            Ok(())
                        })
                        .await?;
                }
            }
            UsageKind::Autofill => {
                let pages = self.client.autofill_log_pages(filter, page_filter, BATCH_SIZE);
                self.append_generation_pages(ctx, &stored, pages).await?;
                if let Some(stats) = self.client.autofill_stats(filter, page_filter).await? {
                    let sheet_name = self.kind.summary_sheet();
                    stored
                        .update(move |doc| {
                            write_autofill_summary(doc.sheet_mut(&sheet_name)?, &stats);
                            Ok(())
                        })
                        .await?;
                }
            }
            UsageKind::Teammate => {
                let pages = self.client.teammate_log_pages(filter, page_filter, BATCH_SIZE);
                self.append_teammate_pages(ctx, &stored, pages).await?;
                if let Some(stats) = self.client.teammate_stats(filter, page_filter).await? {
                    let sheet_name = self.kind.summary_sheet();
                    stored
                        .update(move |doc| {
                            write_teammate_summary(doc.sheet_mut(&sheet_name)?, &stats);
                            Ok(())
                        })
                        .await?;
                }
            }
        }

        let presigned_url = self
            .store
            .presign_get(stored.key(), self.expiry_hours)
            .await?;

        info!(
            "{} usage-log report complete for event {}: {}",
            self.kind.label(),
            job.event_id,
            stored.key()
        );
        Ok(ExportOutput::Artifact(ArtifactHandle {
            bucket: self.store.bucket().to_string(),
            key: stored.key().to_string(),
            presigned_url,
        }))
    }

    fn filename(&self, job: &ExportJob) -> String {
        usage_filename(self.kind, job)
    }
}

impl UsageLogsReportBuilder {
    async fn append_generation_pages<S>(
        &self,
        ctx: &JobContext,
        stored: &StoredWorkbook,
        pages: S,
    ) -> Result<(), ExportError>
    where
        S: Stream<Item = Result<Vec<GenerationLog>, ExportError>>,
    {
        futures::pin_mut!(pages);
        while let Some(batch) = pages.try_next().await? {
            ctx.ensure_active()?;
            let sheet_name = self.kind.logs_sheet();
            stored
                .update(move |doc| {
                    let sheet = doc.sheet_mut(&sheet_name)?;
                    let mut row = sheet.next_row(DATA_ROW);
                    for log in &batch {
                        append_generation_log_row(sheet, row, log);
                        row += 1;
                    }
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }

    async fn append_teammate_pages<S>(
        &self,
        ctx: &JobContext,
        stored: &StoredWorkbook,
        pages: S,
    ) -> Result<(), ExportError>
    where
        S: Stream<Item = Result<Vec<TeammateLog>, ExportError>>,
    {
        futures::pin_mut!(pages);
        while let Some(batch) = pages.try_next().await? {
            ctx.ensure_active()?;
            let sheet_name = self.kind.logs_sheet();
            stored
                .update(move |doc| {
                    let sheet = doc.sheet_mut(&sheet_name)?;
                    let mut row = sheet.next_row(DATA_ROW);
                    for log in &batch {
                        append_teammate_log_row(sheet, row, log);
                        row += 1;
                    }
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }
}

fn append_generation_log_row(sheet: &mut Sheet, row: u32, log: &GenerationLog) {
    sheet.set_text(row, 1, log.question.clone());
    sheet.set_text(row, 2, log.user_instruction.clone());
    sheet.set_text(row, 3, log.answer.clone().unwrap_or_default());
    let sources = log
        .sources
        .iter()
        .map(|s| s.url.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    sheet.set_text(row, 4, sources);
    sheet.set_text(row, 5, log.status.clone());
    sheet.set_text(row, 6, cell_date(log.meta.created));
    sheet.set_text(row, 7, log.meta.created_by.full_name.clone());
    sheet.set_text(row, 8, log.initiated_from.clone());
    sheet.set_number(row, 9, log.tx_consumed);
}

fn append_teammate_log_row(sheet: &mut Sheet, row: u32, log: &TeammateLog) {
    sheet.set_text(row, 1, log.title.clone());
    sheet.set_text(row, 2, cell_date(log.meta.created));
    sheet.set_text(row, 3, log.meta.created_by.full_name.clone());
    sheet.set_number(row, 4, log.thread_count as f64);
    sheet.set_number(row, 5, log.average_time);
    sheet.set_number(row, 6, log.tx_consumed);
}

fn write_answer_summary(sheet: &mut Sheet, stats: &AnswerStats) {
    sheet.set_number(SUMMARY_FIRST_ROW, 2, stats.total as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 1, 2, stats.answered as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 2, 2, stats.no_information as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 3, 2, stats.tx_consumed);
}

fn write_autofill_summary(sheet: &mut Sheet, stats: &AutofillStats) {
    sheet.set_number(SUMMARY_FIRST_ROW, 2, stats.total_runs as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 1, 2, stats.total_documents as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 2, 2, stats.total_questions as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 3, 2, stats.total_questions_answered as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 4, 2, stats.average_response_time);
}

fn write_teammate_summary(sheet: &mut Sheet, stats: &TeammateStats) {
    sheet.set_number(SUMMARY_FIRST_ROW, 2, stats.thread_count as f64);
    sheet.set_number(SUMMARY_FIRST_ROW + 1, 2, stats.average_time);
    sheet.set_number(SUMMARY_FIRST_ROW + 2, 2, stats.tx_consumed);
}

/// Header-only workbook for phase A: a Logs sheet and a Summary sheet.
fn skeleton(kind: UsageKind, job: &ExportJob) -> (WorkbookDoc, Vec<SheetLayout>) {
    let date_line = format!("Date range - {}", date_range_label(job.page_filter.as_ref()));
    let mut doc = WorkbookDoc::new();
    let mut layouts = Vec::new();

    let logs = doc.add_sheet(&kind.logs_sheet());
    logs.set_text(1, 1, format!("{} Usage logs", kind.label()));
    logs.set_text(2, 1, date_line.clone());
    logs.set_text(4, 1, "Filters applied -");
    logs.set_text(5, 1, "Users : (All, single user, or comma separated)");
    logs.set_text(6, 1, "Status: (All, single or comma separated)");
    logs.set_text(7, 1, "Initiated from : (All, single source, or comma separated)");
    for (col, header) in kind.log_headers().iter().enumerate() {
        logs.set_text(HEADER_ROW, col as u16 + 1, *header);
    }
    layouts.push(SheetLayout {
        name: logs.name.clone(),
        header_rows: vec![HEADER_ROW],
        header_fill: 0xD3D3D3,
    });

    let summary = doc.add_sheet(&kind.summary_sheet());
    summary.set_text(1, 1, format!("{} Usage logs - Summary", kind.label()));
    summary.set_text(2, 1, date_line);
    summary.set_text(4, 1, "Filters applied -");
    summary.set_text(5, 1, "Users : (All, single user, or comma separated)");
    summary.set_text(SUMMARY_HEADER_ROW, 1, "Metric");
    summary.set_text(SUMMARY_HEADER_ROW, 2, "Value");
    for (offset, label) in kind.summary_labels().iter().enumerate() {
        summary.set_text(SUMMARY_FIRST_ROW + offset as u32, 1, *label);
    }
    layouts.push(SheetLayout {
        name: summary.name.clone(),
        header_rows: vec![SUMMARY_HEADER_ROW],
        header_fill: 0xFFB6C1,
    });

    (doc, layouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::workbook::CellValue;
    use crate::types::{CreatedBy, ExportMode, ExportModule, RecordMeta, SourceData};

    fn job(kind: UsageKind) -> ExportJob {
        ExportJob {
            event_id: "evt-usage".into(),
            mode: ExportMode::Download,
            module: ExportModule::UsageLogs,
            report_type: kind.label().into(),
            sub_type: "logs".into(),
            user_id: 1,
            client_id: 5,
            product_id: 1,
            filter: None,
            page_filter: None,
        }
    }

    #[test]
    fn test_title_case_matches_legacy_rendering() {
        assert_eq!(title_case("answer"), "Answer");
        assert_eq!(title_case("Autofill"), "Autofill");
        assert_eq!(title_case("AITeammate"), "Aiteammate");
    }

    #[test]
    fn test_filename_prefixes_per_kind() {
        for (kind, prefix) in [
            (UsageKind::Answer, "Answer_Usage_logs_"),
            (UsageKind::Autofill, "Autofill_Usage_logs_"),
            (UsageKind::Teammate, "Aiteammate_Usage_logs_"),
        ] {
            let name = usage_filename(kind, &job(kind));
            assert!(name.starts_with(prefix), "{name}");
            assert!(name.ends_with(".xlsx"));
        }
    }

    #[test]
    fn test_filename_includes_date_range_when_present() {
        use crate::types::{FilterCondition, FilterSet};
        use std::collections::BTreeMap;

        let mut conditions = BTreeMap::new();
        conditions.insert(
            "meta.created".to_string(),
            FilterCondition {
                field: "meta.created".into(),
                data: "1746297000000#@#1748888999999".into(),
                operation: "BETWEEN".into(),
            },
        );
        let mut job = job(UsageKind::Answer);
        job.page_filter = Some(FilterSet {
            conditions,
            regex: String::new(),
        });

        let name = usage_filename(UsageKind::Answer, &job);
        assert!(name.starts_with("Answer_Usage_logs_May_3_2025_to_Jun_2_2025_"), "{name}");
    }

    #[test]
    fn test_skeleton_sheet_names_fit_xlsx_limit() {
        for kind in [UsageKind::Answer, UsageKind::Autofill, UsageKind::Teammate] {
            let (doc, layouts) = skeleton(kind, &job(kind));
            for name in doc.sheet_names() {
                assert!(name.chars().count() <= 31, "{name}");
            }
            assert_eq!(layouts.len(), 2);
        }
    }

    #[test]
    fn test_skeleton_headers_per_kind() {
        let (doc, _) = skeleton(UsageKind::Answer, &job(UsageKind::Answer));
        let logs = doc.sheet("Answer Usage logs - Logs").unwrap();
        assert_eq!(logs.get(8, 1), Some(&CellValue::Text("Question".into())));
        assert_eq!(
            logs.get(8, 9),
            Some(&CellValue::Text("Transactions consumed".into()))
        );

        let (doc, _) = skeleton(UsageKind::Teammate, &job(UsageKind::Teammate));
        let logs = doc.sheet("AITeammate Usage logs - Logs").unwrap();
        assert_eq!(logs.get(8, 1), Some(&CellValue::Text("Conversations".into())));
        assert_eq!(logs.get(8, 6), Some(&CellValue::Text("Transactions consumed".into())));
        assert_eq!(logs.get(8, 7), None);

        let summary = doc.sheet("AITeammate Usage logs - Summary").unwrap();
        assert_eq!(summary.get(6, 1), Some(&CellValue::Text("Metric".into())));
        assert_eq!(summary.get(7, 1), Some(&CellValue::Text("Total Conversations".into())));
    }

    #[test]
    fn test_generation_log_row_mapping() {
        let (mut doc, _) = skeleton(UsageKind::Answer, &job(UsageKind::Answer));
        let sheet = doc.sheet_mut("Answer Usage logs - Logs").unwrap();

        let log = GenerationLog {
            id: "log-1".into(),
            question: "What is the uptime SLA?".into(),
            answer: None,
            user_instruction: "cite sources".into(),
            sources: vec![
                SourceData {
                    name: "SLA".into(),
                    url: "https://docs/sla".into(),
                },
                SourceData {
                    name: "Terms".into(),
                    url: "https://docs/terms".into(),
                },
            ],
            status: "NO_INFORMATION".into(),
            initiated_from: "web".into(),
            meta: RecordMeta {
                created: 1746297000000,
                created_by: CreatedBy {
                    id: "u1".into(),
                    full_name: "Dana Jones".into(),
                },
            },
            tx_consumed: 2.5,
        };
        append_generation_log_row(sheet, 9, &log);

        assert_eq!(sheet.get(9, 3), Some(&CellValue::Text("".into())));
        assert_eq!(
            sheet.get(9, 4),
            Some(&CellValue::Text("https://docs/sla, https://docs/terms".into()))
        );
        assert_eq!(sheet.get(9, 6), Some(&CellValue::Text("May 3, 2025".into())));
        assert_eq!(sheet.get(9, 7), Some(&CellValue::Text("Dana Jones".into())));
        assert_eq!(sheet.get(9, 9), Some(&CellValue::Number(2.5)));
    }

    #[tokio::test]
    async fn test_paginated_logs_then_summary_through_storage() {
        use crate::reports::workbook::{decode, StoredWorkbook};
        use crate::storage::MemoryObjectStore;

        let job = job(UsageKind::Answer);
        let (doc, layouts) = skeleton(UsageKind::Answer, &job);
        let store = Arc::new(MemoryObjectStore::new());
        let key = "exports/5/evt-usage/answer.xlsx".to_string();
        let stored = StoredWorkbook::create(store.clone(), key.clone(), &doc, layouts, 100 << 20)
            .await
            .unwrap();

        let log = |i: usize| GenerationLog {
            id: format!("log-{i}"),
            question: format!("q-{i}"),
            answer: Some("yes".into()),
            user_instruction: String::new(),
            sources: vec![],
            status: "ANSWERED".into(),
            initiated_from: "web".into(),
            meta: RecordMeta {
                created: 1746297000000,
                created_by: CreatedBy {
                    id: "u1".into(),
                    full_name: "Dana Jones".into(),
                },
            },
            tx_consumed: 1.0,
        };

        // Three list pages of 100/100/37, then the single stats call.
        for page in [0..100usize, 100..200, 200..237] {
            let batch: Vec<GenerationLog> = page.map(log).collect();
            stored
                .update(|doc| {
                    let sheet = doc.sheet_mut("Answer Usage logs - Logs")?;
                    let mut row = sheet.next_row(DATA_ROW);
                    for entry in &batch {
                        append_generation_log_row(sheet, row, entry);
                        row += 1;
                    }
                    Ok(())
                })
                .await
                .unwrap();
        }
        stored
            .update(|doc| {
                write_answer_summary(
                    doc.sheet_mut("Answer Usage logs - Summary")?,
                    &AnswerStats {
                        total: 237,
                        answered: 201,
                        no_information: 36,
                        tx_consumed: 88.5,
                    },
                );
                Ok(())
            })
            .await
            .unwrap();

        let final_doc = decode(&store.object(&key).unwrap()).unwrap();
        let logs = final_doc.sheet("Answer Usage logs - Logs").unwrap();
        assert_eq!(logs.get(9, 1), Some(&CellValue::Text("q-0".into())));
        assert_eq!(logs.get(245, 1), Some(&CellValue::Text("q-236".into())));
        assert_eq!(logs.next_row(DATA_ROW), 246);

        let summary = final_doc.sheet("Answer Usage logs - Summary").unwrap();
        assert_eq!(summary.get(7, 2), Some(&CellValue::Number(237.0)));
        assert_eq!(summary.get(9, 2), Some(&CellValue::Number(36.0)));
    }

    #[test]
    fn test_summary_writers_fill_value_column() {
        let (mut doc, _) = skeleton(UsageKind::Autofill, &job(UsageKind::Autofill));
        let sheet = doc.sheet_mut("Autofill Usage logs - Summary").unwrap();
        write_autofill_summary(
            sheet,
            &AutofillStats {
                total_runs: 12,
                total_documents: 4,
                total_questions: 300,
                total_questions_answered: 280,
                average_response_time: 1.25,
            },
        );
        assert_eq!(sheet.get(7, 2), Some(&CellValue::Number(12.0)));
        assert_eq!(sheet.get(11, 2), Some(&CellValue::Number(1.25)));

        let (mut doc, _) = skeleton(UsageKind::Answer, &job(UsageKind::Answer));
        let sheet = doc.sheet_mut("Answer Usage logs - Summary").unwrap();
        write_answer_summary(
            sheet,
            &AnswerStats {
                total: 237,
                answered: 201,
                no_information: 36,
                tx_consumed: 88.5,
            },
        );
        assert_eq!(sheet.get(7, 2), Some(&CellValue::Number(237.0)));
        assert_eq!(sheet.get(10, 2), Some(&CellValue::Number(88.5)));
    }
}
