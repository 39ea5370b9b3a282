//! Frequently-asked-questions report
//!
//! Route: `(insights, responseGeneration, frequentAskedQuestions)`.
//!
//! Three sheets, each titled with the answer-status suffix. Phase A uploads
//! the header-only skeleton; phase B appends category, subcategory and
//! top-question pages one batch at a time, collecting category ids along the
//! way so the breakdown sheet can stream per category.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use tracing::info;

use crate::clients::insights::InsightsClient;
use crate::config::BATCH_SIZE;
use crate::error::ExportError;
use crate::reports::filters::{date_range_label, sheet_suffix};
use crate::reports::workbook::{sheet_title, Sheet, SheetLayout, StoredWorkbook, WorkbookDoc};
use crate::reports::{ArtifactHandle, ExportOutput, JobContext, ReportBuilder};
use crate::storage::{export_key, ObjectStorage};
use crate::types::{CategoryData, ExportJob, InfoCards, SubCategoryData, TopQuestionData};

const CATEGORY_SHEET: &str = "Top question categories";
const BREAKDOWN_SHEET: &str = "Detailed category breakdown";
const QUESTIONS_SHEET: &str = "Top asked questions";

/// First data row of the category and breakdown sheets (headers on row 8).
const CATEGORY_DATA_ROW: u32 = 9;
/// First data row of the questions sheet (headers on row 9).
const QUESTIONS_DATA_ROW: u32 = 10;

const LINK_CELL: &str = "View details ↗";

pub struct FaqReportBuilder {
    insights: InsightsClient,
    store: Arc<dyn ObjectStorage>,
    expiry_hours: u64,
    max_bytes: usize,
}

impl FaqReportBuilder {
    pub fn new(
        insights: InsightsClient,
        store: Arc<dyn ObjectStorage>,
        expiry_hours: u64,
        max_export_size_mb: u64,
    ) -> Self {
        Self {
            insights,
            store,
            expiry_hours,
            max_bytes: max_export_size_mb as usize * 1024 * 1024,
        }
    }
}

#[async_trait]
impl ReportBuilder for FaqReportBuilder {
    async fn build(
        &self,
        job: &ExportJob,
        ctx: &JobContext,
    ) -> Result<ExportOutput, ExportError> {
        ctx.ensure_active()?;
        let suffix = sheet_suffix(job.filter.as_ref());
        info!(
            "Building FAQ report for event {} (suffix {})",
            job.event_id, suffix
        );

        // The info cards supply the frequency denominators for every row.
        let cards = self
            .insights
            .info_cards(job.filter.as_ref(), job.page_filter.as_ref())
            .await?
            .ok_or_else(|| ExportError::Upstream("info cards unavailable".into()))?;
        let base = base_count(&cards, suffix);

        let filename = faq_filename(suffix);
        let key = export_key(job.client_id, &job.event_id, &filename);
        let (doc, layouts) = skeleton(job, suffix);
        let stored =
            StoredWorkbook::create(self.store.clone(), key, &doc, layouts, self.max_bytes).await?;

        let categories = self.append_categories(job, ctx, &stored, suffix, base).await?;
        self.append_subcategories(job, ctx, &stored, suffix, base, &categories)
            .await?;
        self.append_questions(job, ctx, &stored, suffix).await?;

        let presigned_url = self
            .store
            .presign_get(stored.key(), self.expiry_hours)
            .await?;

        info!("FAQ report complete for event {}: {}", job.event_id, stored.key());
        Ok(ExportOutput::Artifact(ArtifactHandle {
            bucket: self.store.bucket().to_string(),
            key: stored.key().to_string(),
            presigned_url,
        }))
    }

    fn filename(&self, job: &ExportJob) -> String {
        faq_filename(sheet_suffix(job.filter.as_ref()))
    }
}

impl FaqReportBuilder {
    /// Stream category pages into sheet 1, returning every (id, name) pair
    /// observed for the breakdown phase.
    async fn append_categories(
        &self,
        job: &ExportJob,
        ctx: &JobContext,
        stored: &StoredWorkbook,
        suffix: &str,
        base: i64,
    ) -> Result<Vec<(String, String)>, ExportError> {
        let mut seen = Vec::new();
        let pages =
            self.insights
                .category_pages(job.filter.as_ref(), job.page_filter.as_ref(), BATCH_SIZE);
        futures::pin_mut!(pages);

        while let Some(batch) = pages.try_next().await? {
            ctx.ensure_active()?;
            for category in &batch {
                seen.push((category.id.clone(), category.category.clone()));
            }
            let title = sheet_title(CATEGORY_SHEET, suffix);
            stored
                .update(move |doc| {
                    let sheet = doc.sheet_mut(&title)?;
                    let mut row = sheet.next_row(CATEGORY_DATA_ROW);
                    for category in &batch {
                        append_category_row(sheet, row, category, base);
                        row += 1;
                    }
                    Ok(())
                })
                .await?;
        }
        Ok(seen)
    }

    async fn append_subcategories(
        &self,
        job: &ExportJob,
        ctx: &JobContext,
        stored: &StoredWorkbook,
        suffix: &str,
        base: i64,
        categories: &[(String, String)],
    ) -> Result<(), ExportError> {
        for (category_id, parent_name) in categories {
            let pages = self.insights.subcategory_pages(
                category_id,
                job.filter.as_ref(),
                job.page_filter.as_ref(),
                BATCH_SIZE,
            );
            futures::pin_mut!(pages);

            while let Some(batch) = pages.try_next().await? {
                ctx.ensure_active()?;
                let title = sheet_title(BREAKDOWN_SHEET, suffix);
                let parent = parent_name.clone();
                stored
                    .update(move |doc| {
                        let sheet = doc.sheet_mut(&title)?;
                        let mut row = sheet.next_row(CATEGORY_DATA_ROW);
                        for sub in &batch {
                            append_subcategory_row(sheet, row, sub, &parent, base);
                            row += 1;
                        }
                        Ok(())
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn append_questions(
        &self,
        job: &ExportJob,
        ctx: &JobContext,
        stored: &StoredWorkbook,
        suffix: &str,
    ) -> Result<(), ExportError> {
        let pages = self.insights.top_question_pages(
            job.filter.as_ref(),
            job.page_filter.as_ref(),
            BATCH_SIZE,
        );
        futures::pin_mut!(pages);

        while let Some(batch) = pages.try_next().await? {
            ctx.ensure_active()?;
            let title = sheet_title(QUESTIONS_SHEET, suffix);
            stored
                .update(move |doc| {
                    let sheet = doc.sheet_mut(&title)?;
                    let mut row = sheet.next_row(QUESTIONS_DATA_ROW);
                    for question in &batch {
                        append_question_row(sheet, row, question);
                        row += 1;
                    }
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }
}

fn faq_filename(suffix: &str) -> String {
    format!(
        "Frequently_Asked_Questions_Report_{}_{}.xlsx",
        suffix,
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

/// Frequency of a row: the suffix denominator scaled by the distribution
/// percentage, rounded down.
fn frequency(base: i64, distribution_pct: f64) -> f64 {
    (base as f64 * distribution_pct / 100.0).floor()
}

/// Pick the denominator the suffix calls for.
fn base_count(cards: &InfoCards, suffix: &str) -> i64 {
    match suffix {
        "Answered" => cards.total_questions_answered.count,
        "Unanswered" => cards.total_questions.count - cards.total_questions_answered.count,
        _ => cards.total_questions.count,
    }
}

fn trend_cell(direction: &str, trend: f64) -> String {
    let symbol = if direction == "INCREASING" { "▲" } else { "▼" };
    format!("{} {:.0}%", symbol, trend.abs())
}

fn append_category_row(
    sheet: &mut Sheet,
    row: u32,
    category: &CategoryData,
    base: i64,
) {
    sheet.set_text(row, 1, category.category.clone());
    sheet.set_number(row, 2, frequency(base, category.distribution));
    sheet.set_text(row, 3, format!("{:.2}%", category.distribution));
    sheet.set_text(row, 4, trend_cell(&category.direction, category.trend));
    sheet.set_text(row, 5, LINK_CELL);
}

fn append_subcategory_row(
    sheet: &mut Sheet,
    row: u32,
    sub: &SubCategoryData,
    parent: &str,
    base: i64,
) {
    sheet.set_text(row, 1, format!("→ {}", sub.sub_category));
    sheet.set_text(row, 2, parent);
    sheet.set_number(row, 3, frequency(base, sub.distribution));
    sheet.set_text(row, 4, format!("{:.2}%", sub.distribution));
    sheet.set_text(row, 5, trend_cell(&sub.direction, sub.trend));
    sheet.set_text(row, 6, LINK_CELL);
}

fn append_question_row(
    sheet: &mut Sheet,
    row: u32,
    question: &TopQuestionData,
) {
    sheet.set_text(row, 1, question.question.clone());
    sheet.set_number(row, 2, question.frequency as f64);
    sheet.set_text(row, 3, LINK_CELL);
}

/// Header-only workbook for phase A.
fn skeleton(job: &ExportJob, suffix: &str) -> (WorkbookDoc, Vec<SheetLayout>) {
    let date_line = format!("Date range - {}", date_range_label(job.page_filter.as_ref()));
    let mut doc = WorkbookDoc::new();
    let mut layouts = Vec::new();

    let categories = doc.add_sheet(&sheet_title(CATEGORY_SHEET, suffix));
    categories.set_text(1, 1, CATEGORY_SHEET);
    categories.set_text(2, 1, date_line.clone());
    categories.set_text(4, 1, "Filters applied -");
    categories.set_text(5, 1, "Users : (All, single user, or comma separated)");
    categories.set_text(6, 1, "Initiated from : (All, single source, or comma separated)");
    for (col, header) in ["Category", "Frequency (Questions asked)", "Distribution", "Trend", "Link"]
        .iter()
        .enumerate()
    {
        categories.set_text(8, col as u16 + 1, *header);
    }
    layouts.push(SheetLayout {
        name: categories.name.clone(),
        header_rows: vec![8],
        header_fill: 0xD3D3D3,
    });

    let breakdown = doc.add_sheet(&sheet_title(BREAKDOWN_SHEET, suffix));
    breakdown.set_text(1, 1, BREAKDOWN_SHEET);
    breakdown.set_text(2, 1, date_line.clone());
    breakdown.set_text(4, 1, "Filters applied -");
    breakdown.set_text(5, 1, "Users : (All, single user, or comma separated)");
    breakdown.set_text(6, 1, "Initiated from : (All, single source, or comma separated)");
    for (col, header) in [
        "Subcategory",
        "Parent category",
        "Frequency (Questions asked)",
        "Distribution",
        "Trend",
        "Link",
    ]
    .iter()
    .enumerate()
    {
        breakdown.set_text(8, col as u16 + 1, *header);
    }
    layouts.push(SheetLayout {
        name: breakdown.name.clone(),
        header_rows: vec![8],
        header_fill: 0xFFB6C1,
    });

    let questions = doc.add_sheet(&sheet_title(QUESTIONS_SHEET, suffix));
    questions.set_text(1, 1, QUESTIONS_SHEET);
    questions.set_text(2, 1, date_line);
    questions.set_text(
        3,
        1,
        "💡 Questions that are similar to each other have been grouped under a single FAQ",
    );
    questions.set_text(5, 1, "Filters applied -");
    questions.set_text(6, 1, "Users : (All, single user, or comma separated)");
    questions.set_text(7, 1, "Initiated from : (All, single source, or comma separated)");
    for (col, header) in ["Question", "Frequency (Questions asked)", "Link"].iter().enumerate() {
        questions.set_text(9, col as u16 + 1, *header);
    }
    layouts.push(SheetLayout {
        name: questions.name.clone(),
        header_rows: vec![9],
        header_fill: 0xE6E6FA,
    });

    (doc, layouts)
}
