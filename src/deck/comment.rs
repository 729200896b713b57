//! Comment flow: interpretive comment paragraphs batched into bordered
//! boxes, variant keywords emphasised in bold, the disclaimer appended after
//! the last batch and a sign-off block on every comment page.

use crate::error::Error;
use crate::model::ReportRecord;
use crate::pptx::Package;
use crate::pptx::shape::{self, TextRun};

use super::cursor::{Cursor, RunningTitle};
use super::style::StyleConfig;
use super::template::{BottomLimits, TemplateAnalysis};

/// Generic words that must never become emphasis keywords even though they
/// show up in variant descriptors.
const STOPWORDS: &[&str] = &[
    "gene", "genes", "fusion", "exon", "none", "deletion", "duplication", "amplification",
    "mutation", "variant", "loss", "gain",
];

/// Collect emphasis keywords from the record: every variant descriptor from
/// the section headlines plus every gene symbol from the data rows, longest
/// first so `EGFR p.L858R` wins over plain `EGFR`.
pub fn keyword_set(record: &ReportRecord) -> Vec<String> {
    let mut set: Vec<String> = Vec::new();
    {
        let mut push = |cand: &str| {
            let cand = cand.trim();
            if cand.chars().count() < 3 {
                return;
            }
            if STOPWORDS.iter().any(|s| cand.eq_ignore_ascii_case(s)) {
                return;
            }
            if !set.iter().any(|k| k.eq_ignore_ascii_case(cand)) {
                set.push(cand.to_owned());
            }
        };
        for block in record.sections.values() {
            for desc in block.highlight_descriptors() {
                push(&desc);
            }
            for row in &block.rows {
                if let Some(gene) = row.first() {
                    push(gene);
                }
            }
        }
    }
    set.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    set
}

/// Split a comment around the first keyword it contains, bolding the match.
/// Without a keyword hit, a leading `Label:` prefix is bolded instead; a
/// text with neither stays a single plain run.
pub fn emphasize(text: &str, keywords: &[String]) -> Vec<(String, bool)> {
    let lower = text.to_ascii_lowercase();
    for kw in keywords {
        let kw_lower = kw.to_ascii_lowercase();
        if let Some(pos) = lower.find(&kw_lower) {
            let end = pos + kw_lower.len();
            let mut parts = Vec::new();
            if pos > 0 {
                parts.push((text[..pos].to_owned(), false));
            }
            parts.push((text[pos..end].to_owned(), true));
            if end < text.len() {
                parts.push((text[end..].to_owned(), false));
            }
            return parts;
        }
    }
    if let Some(pos) = text.find(':')
        && pos > 0
        && pos <= 60
    {
        let mut parts = vec![(text[..=pos].to_owned(), true)];
        if pos + 1 < text.len() {
            parts.push((text[pos + 1..].to_owned(), false));
        }
        return parts;
    }
    vec![(text.to_owned(), false)]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentPage {
    pub start: usize,
    pub end: usize,
    pub disclaimer: bool,
}

/// Pack comments onto pages by estimated line counts. Each page takes at
/// least one comment, so a paragraph longer than a whole page still lands
/// somewhere (its box autofits). The disclaimer joins the last page when
/// its lines fit, otherwise it gets a page of its own.
pub fn plan_pages(
    lines: &[usize],
    disclaimer_lines: usize,
    first_cap: usize,
    full_cap: usize,
) -> Result<Vec<CommentPage>, Error> {
    let mut pages: Vec<CommentPage> = Vec::new();
    let mut start = 0;
    while start < lines.len() {
        let cap = if pages.is_empty() { first_cap } else { full_cap };
        if cap == 0 {
            return Err(Error::Layout("comment page cannot hold a single line".into()));
        }
        let mut end = start;
        let mut used = 0;
        while end < lines.len() && (end == start || used + lines[end] <= cap) {
            used += lines[end];
            end += 1;
        }
        pages.push(CommentPage { start, end, disclaimer: false });
        start = end;
    }

    if disclaimer_lines > 0 {
        let fits_on_last = match pages.last() {
            Some(last) => {
                let cap = if pages.len() == 1 { first_cap } else { full_cap };
                let used: usize = lines[last.start..last.end].iter().sum();
                used + disclaimer_lines <= cap
            }
            None => false,
        };
        if fits_on_last && let Some(last) = pages.last_mut() {
            last.disclaimer = true;
        } else {
            let at = lines.len();
            pages.push(CommentPage { start: at, end: at, disclaimer: true });
        }
    }
    Ok(pages)
}

pub fn render_comments(
    pkg: &mut Package,
    analysis: &mut TemplateAnalysis,
    cursor: &mut Cursor,
    cfg: &StyleConfig,
    record: &ReportRecord,
) -> Result<(), Error> {
    let disclaimer = analysis
        .disclaimer
        .clone()
        .unwrap_or_else(|| cfg.default_disclaimer.clone());
    let keywords = keyword_set(record);
    let splits: Vec<Vec<(String, bool)>> =
        record.comments.iter().map(|c| emphasize(c, &keywords)).collect();
    let lines: Vec<usize> = record.comments.iter().map(|c| cfg.comment_lines(c)).collect();
    let disclaimer_lines = cfg.comment_lines(&disclaimer);

    // the heading, one comment line and the sign-off block share the page
    let need = cfg.section_line_height
        + cfg.section_gap
        + cfg.comment_line_height
        + 2 * cfg.comment_box_inset
        + cfg.footer_gap
        + cfg.footer_height;
    cursor.ensure_space(pkg, &mut analysis.limits, cfg, need)?;

    let limit_here = analysis.limits.get(pkg.slide(cursor.slide).part_name());
    let first_cap = line_capacity(
        limit_here - cfg.footer_height - cfg.footer_gap,
        cursor.top + cfg.section_line_height + cfg.section_gap,
        cfg,
    );
    let (_, page_h) = pkg.slide_size();
    let fresh_limit = page_h - cfg.fresh_bottom_margin;
    let full_cap = line_capacity(
        fresh_limit - cfg.footer_height - cfg.footer_gap,
        cfg.top_margin + cfg.section_line_height + 2 * cfg.section_gap,
        cfg,
    );

    let pages = plan_pages(&lines, disclaimer_lines, first_cap, full_cap)?;
    let total = pages.len();
    log::debug!(
        "comments: {} paragraphs over {} page(s) (first {}, full {} lines)",
        record.comments.len(),
        total,
        first_cap,
        full_cap
    );

    draw_heading(pkg, cursor, cfg, 1, total);
    cursor.set_running(RunningTitle {
        prefix: "\u{25a3} Comment".to_owned(),
        colon: false,
        total,
        next_page: 2,
        sig: None,
    });
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            cursor.new_slide(pkg, &mut analysis.limits, cfg)?;
        }
        if page.end > page.start {
            draw_comment_box(
                pkg,
                cursor,
                cfg,
                &splits[page.start..page.end],
                &lines[page.start..page.end],
            );
        }
        if page.disclaimer {
            draw_disclaimer(pkg, cursor, cfg, &disclaimer, disclaimer_lines);
        }
        draw_footer(pkg, cursor.slide, &analysis.limits, cfg, record);
    }
    cursor.clear_running();
    Ok(())
}

fn line_capacity(bottom: i64, top: i64, cfg: &StyleConfig) -> usize {
    let avail = bottom - top - 2 * cfg.comment_box_inset;
    if avail <= 0 {
        return 0;
    }
    (avail / cfg.comment_line_height) as usize
}

fn draw_heading(pkg: &mut Package, cursor: &mut Cursor, cfg: &StyleConfig, page: usize, total: usize) {
    let text = if total > 1 {
        format!("\u{25a3} Comment ({page}/{total})")
    } else {
        "\u{25a3} Comment".to_owned()
    };
    let run = TextRun {
        text,
        bold: true,
        color: Some(cfg.body_color.clone()),
        size: Some(cfg.title_size),
        font: Some(cfg.font.clone()),
        ..Default::default()
    };
    let (page_w, _) = pkg.slide_size();
    let width = page_w - cfg.left_margin - cfg.right_margin;
    shape::add_text_box(
        pkg.slide_mut(cursor.slide),
        cfg.left_margin,
        cursor.top,
        width,
        cfg.section_line_height,
        &[vec![run]],
        false,
    );
    cursor.advance(cfg.section_line_height + cfg.section_gap);
}

fn draw_comment_box(
    pkg: &mut Package,
    cursor: &mut Cursor,
    cfg: &StyleConfig,
    splits: &[Vec<(String, bool)>],
    lines: &[usize],
) {
    let total_lines: usize = lines.iter().sum();
    let box_h = total_lines as i64 * cfg.comment_line_height + 2 * cfg.comment_box_inset;
    let paras: Vec<Vec<TextRun>> = splits
        .iter()
        .map(|runs| {
            runs.iter()
                .map(|(text, bold)| TextRun {
                    text: text.clone(),
                    bold: *bold,
                    color: Some(cfg.body_color.clone()),
                    size: Some(cfg.comment_size),
                    font: Some(cfg.font.clone()),
                    ..Default::default()
                })
                .collect()
        })
        .collect();
    let (page_w, _) = pkg.slide_size();
    let width = page_w - cfg.left_margin - cfg.right_margin;
    shape::add_text_box(
        pkg.slide_mut(cursor.slide),
        cfg.left_margin,
        cursor.top,
        width,
        box_h,
        &paras,
        true,
    );
    cursor.advance(box_h + cfg.section_gap);
}

fn draw_disclaimer(
    pkg: &mut Package,
    cursor: &mut Cursor,
    cfg: &StyleConfig,
    text: &str,
    lines: usize,
) {
    let height = lines as i64 * cfg.comment_line_height;
    let run = TextRun {
        text: text.to_owned(),
        color: Some(cfg.body_color.clone()),
        size: Some(cfg.comment_size),
        font: Some(cfg.font.clone()),
        ..Default::default()
    };
    let (page_w, _) = pkg.slide_size();
    let width = page_w - cfg.left_margin - cfg.right_margin;
    shape::add_text_box(
        pkg.slide_mut(cursor.slide),
        cfg.left_margin,
        cursor.top,
        width,
        height,
        &[vec![run]],
        false,
    );
    cursor.advance(height + cfg.section_gap);
}

/// Draw the sign-off block anchored to the page bottom. Authored comment
/// pages that already carry one (matched by the first signature label) are
/// left alone.
fn draw_footer(
    pkg: &mut Package,
    slide_idx: usize,
    limits: &BottomLimits,
    cfg: &StyleConfig,
    record: &ReportRecord,
) {
    let Some((first_label, _)) = record.signatures.first() else {
        return;
    };
    let needle = first_label.to_lowercase();
    let already = shape::shapes(pkg.slide(slide_idx))
        .iter()
        .any(|s| s.text.to_lowercase().contains(&needle));
    if already {
        return;
    }
    let limit = limits.get(pkg.slide(slide_idx).part_name());
    let paras: Vec<Vec<TextRun>> = record
        .signatures
        .iter()
        .map(|(label, value)| {
            vec![
                TextRun {
                    text: format!("{label}: "),
                    bold: true,
                    color: Some(cfg.body_color.clone()),
                    size: Some(cfg.comment_size),
                    font: Some(cfg.font.clone()),
                    ..Default::default()
                },
                TextRun {
                    text: value.clone(),
                    color: Some(cfg.body_color.clone()),
                    size: Some(cfg.comment_size),
                    font: Some(cfg.font.clone()),
                    ..Default::default()
                },
            ]
        })
        .collect();
    let (page_w, _) = pkg.slide_size();
    let width = page_w - cfg.left_margin - cfg.right_margin;
    shape::add_text_box(
        pkg.slide_mut(slide_idx),
        cfg.left_margin,
        limit - cfg.footer_height,
        width,
        cfg.footer_height,
        &paras,
        false,
    );
}
