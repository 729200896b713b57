//! Variant table flow: plans how many data rows land on each page, then
//! renders headers and table chunks from that one plan, so the `(n/total)`
//! page counters always agree with the pages actually produced.

use crate::error::Error;
use crate::model::{SectionDef, Significance, TableBlock};
use crate::pptx::Package;
use crate::pptx::shape::{self, CellStyle, TableSpec};
use crate::pptx::xml::Element;

use super::cursor::{Cursor, RunningTitle};
use super::section::{self, Body};
use super::style::StyleConfig;
use super::template::{TableKind, TemplateAnalysis};

/// Split `total` rows into per-page ranges: `first` rows fit under the
/// section header on the current page, `full` on each fresh page after it.
pub fn plan_chunks(total: usize, first: usize, full: usize) -> Result<Vec<(usize, usize)>, Error> {
    if total == 0 {
        return Ok(Vec::new());
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let cap = if chunks.is_empty() { first } else { full };
        if cap == 0 {
            return Err(Error::Layout("page cannot hold a single table row".into()));
        }
        let end = usize::min(start + cap, total);
        chunks.push((start, end));
        start = end;
    }
    Ok(chunks)
}

/// Render one variant section: header line plus its table, flowed across as
/// many pages as the plan calls for. An empty section renders just the
/// header with a `None` body.
pub fn render_section_table(
    pkg: &mut Package,
    analysis: &mut TemplateAnalysis,
    cursor: &mut Cursor,
    cfg: &StyleConfig,
    section: &SectionDef,
    block: &TableBlock,
    sig: Significance,
) -> Result<(), Error> {
    let title = section.title;
    if block.is_empty() {
        return section::render_header(
            pkg,
            cursor,
            &mut analysis.limits,
            cfg,
            title,
            &Body::None,
            sig,
            0,
        );
    }

    let proto: Option<Element> = TableKind::for_section(section.key)
        .and_then(|kind| analysis.prototypes.get(&kind))
        .cloned();
    if proto.is_none() {
        log::warn!("no template prototype for section {}, building a plain table", section.key);
    }

    // Never strand the header: the header line, the table header row and at
    // least one data row must share a page.
    let head_len = title.chars().count() + 4 + block.highlight_text().chars().count();
    let head_h = cfg.section_height(head_len);
    let first_need = head_h + cfg.section_gap + cfg.header_row_height + cfg.row_height;
    cursor.ensure_space(pkg, &mut analysis.limits, cfg, first_need)?;

    let limit = analysis.limits.get(pkg.slide(cursor.slide).part_name());
    let avail_first = limit - cursor.top - head_h - cfg.section_gap;
    let first_rows = cfg.rows_that_fit(avail_first);

    let (_, page_h) = pkg.slide_size();
    let fresh_avail = page_h
        - cfg.fresh_bottom_margin
        - cfg.top_margin
        - cfg.section_line_height
        - 2 * cfg.section_gap;
    let full_rows = cfg.rows_that_fit(fresh_avail);

    let chunks = plan_chunks(block.rows.len(), first_rows, full_rows)?;
    let total = chunks.len();
    log::debug!(
        "section {}: {} rows over {} page(s) (first {}, full {})",
        section.key,
        block.rows.len(),
        total,
        first_rows,
        full_rows
    );

    let title_text = section::title_with_page(title, 1, total);
    section::render_header(
        pkg,
        cursor,
        &mut analysis.limits,
        cfg,
        &title_text,
        &Body::Fragments(&block.highlights),
        sig,
        cfg.header_row_height + cfg.row_height,
    )?;

    cursor.set_running(RunningTitle {
        prefix: format!("- {title}"),
        colon: true,
        total,
        next_page: 2,
        sig: Some(sig),
    });
    for (i, (start, end)) in chunks.iter().copied().enumerate() {
        if i > 0 {
            cursor.new_slide(pkg, &mut analysis.limits, cfg)?;
        }
        draw_chunk(pkg, cursor, cfg, proto.as_ref(), block, &block.rows[start..end]);
    }
    cursor.clear_running();
    Ok(())
}

fn draw_chunk(
    pkg: &mut Package,
    cursor: &mut Cursor,
    cfg: &StyleConfig,
    proto: Option<&Element>,
    block: &TableBlock,
    rows: &[Vec<String>],
) {
    let body_style = CellStyle {
        size: Some(cfg.body_size),
        color: Some(cfg.body_color.clone()),
        font: Some(cfg.font.clone()),
        ..Default::default()
    };
    match proto {
        Some(proto) => {
            let mut frame = proto.clone();
            let x = frame_x(&frame).unwrap_or(cfg.left_margin);
            shape::set_position(&mut frame, x, cursor.top);
            shape::fill_table_body(&mut frame, rows, &body_style);
            shape::add_shape(pkg.slide_mut(cursor.slide), frame);
        }
        None => {
            let (page_w, _) = pkg.slide_size();
            let span = page_w - cfg.left_margin - cfg.right_margin;
            let cols = block.headers.len().max(1) as i64;
            let widths: Vec<i64> = (0..cols).map(|_| span / cols).collect();
            let spec = TableSpec {
                headers: &block.headers,
                col_widths: &widths,
                row_height: cfg.row_height,
                header_fill: &cfg.table_header_fill,
                border_color: &cfg.table_border_color,
                header_style: CellStyle {
                    bold: true,
                    size: Some(cfg.body_size),
                    color: Some(cfg.body_color.clone()),
                    font: Some(cfg.font.clone()),
                },
            };
            let id =
                shape::add_built_table(pkg.slide_mut(cursor.slide), cfg.left_margin, cursor.top, &spec, rows.len());
            if let Some(frame) = shape::shape_by_id_mut(pkg.slide_mut(cursor.slide), id) {
                shape::fill_table_body(frame, rows, &body_style);
            }
        }
    }
    cursor.advance(cfg.table_height(rows.len()) + cfg.section_gap);
}

fn frame_x(frame: &Element) -> Option<i64> {
    frame
        .descendants()
        .find(|e| e.is("xfrm"))?
        .child("off")?
        .attr("x")?
        .parse()
        .ok()
}
