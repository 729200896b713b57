//! Deck generation: template analysis, static field fills, variant table
//! flow, comment flow and the final cleanup passes, in that order.

pub mod comment;
pub mod cursor;
pub mod section;
pub mod style;
pub mod table;
pub mod template;

use std::collections::HashSet;

use crate::error::Error;
use crate::model::{ReportRecord, SECTIONS, Significance, TableBlock, section_key};
use crate::pptx::Package;
use crate::pptx::shape::{self, CellStyle, ShapeKind};

use cursor::Cursor;
use style::StyleConfig;
use template::{SectionGroup, TemplateAnalysis};

/// Render `record` into the blank template deck and return the finished
/// PPTX bytes.
pub fn generate(record: &ReportRecord, template: &[u8], cfg: &StyleConfig) -> Result<Vec<u8>, Error> {
    let mut pkg = Package::from_bytes(template)?;
    let mut analysis = template::analyze(&mut pkg, cfg)?;
    let mut cursor = Cursor::new();

    fill_static_fields(&mut pkg, record, cfg);
    fill_qc(&mut pkg, &analysis, record, cfg);

    let empty = TableBlock::default();
    for (group, sig) in [
        (SectionGroup::Clinical, Significance::Clinical),
        (SectionGroup::Unknown, Significance::Unknown),
    ] {
        let anchor = analysis.anchor(group).cloned().ok_or_else(|| {
            Error::InvalidTemplate(format!("template has no {group:?} section marker"))
        })?;
        cursor.jump(&pkg, &anchor)?;
        analysis.mark_used(group);

        for def in SECTIONS {
            let key = section_key(def.key, sig);
            let block = record.section(&key).unwrap_or(&empty);
            table::render_section_table(&mut pkg, &mut analysis, &mut cursor, cfg, def, block, sig)?;
        }
        if sig == Significance::Unknown {
            let body = if record.failed_genes.trim().is_empty() {
                section::Body::None
            } else {
                section::Body::Text(&record.failed_genes)
            };
            section::render_header(
                &mut pkg,
                &mut cursor,
                &mut analysis.limits,
                cfg,
                "Failed genes",
                &body,
                sig,
                0,
            )?;
        }
    }

    let anchor = analysis.anchor(SectionGroup::Comment).cloned().ok_or_else(|| {
        Error::InvalidTemplate("template has no comment section marker".into())
    })?;
    cursor.jump(&pkg, &anchor)?;
    analysis.mark_used(SectionGroup::Comment);
    comment::render_comments(&mut pkg, &mut analysis, &mut cursor, cfg, record)?;

    template::remove_unused_markers(&mut pkg, &analysis);
    remove_ghost_slides(&mut pkg, &cursor, record);

    log::debug!(
        "deck for {} finished with {} slides ({} allocated)",
        record.specimen,
        pkg.slide_count(),
        cursor.created.len()
    );
    pkg.save()
}

/// Write every label/value pair into the cell right of its label cell,
/// wherever that label appears in a template table. Unmatched labels are
/// logged and skipped; generation never fails over a missing cell.
fn fill_static_fields(pkg: &mut Package, record: &ReportRecord, cfg: &StyleConfig) {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (label, value) in record
        .clinical_info
        .iter()
        .chain(&record.nucleic_acid)
        .chain(&record.diagnostic_info)
        .chain(&record.filter_history)
        .chain(&record.signatures)
    {
        pairs.push((label.clone(), value.clone()));
    }
    pairs.push(("TMB".to_owned(), record.tmb.clone()));
    pairs.push(("MSI".to_owned(), record.msi.clone()));
    pairs.push(("Analysis program".to_owned(), record.analysis_program.clone()));
    pairs.push(("Instrument type".to_owned(), record.instrument.clone()));
    // a label can arrive through more than one record field; the first wins
    let mut seen = HashSet::new();
    pairs.retain(|(label, value)| {
        !value.trim().is_empty() && seen.insert(shape::norm_label(label))
    });

    let style = CellStyle {
        size: Some(cfg.body_size),
        color: Some(cfg.body_color.clone()),
        font: Some(cfg.font.clone()),
        ..Default::default()
    };
    let mut matched = vec![false; pairs.len()];
    for idx in 0..pkg.slide_count() {
        let Some(tree) = pkg.slide_mut(idx).sp_tree_mut() else {
            continue;
        };
        for frame in tree.children_elems_mut().filter(|e| e.is("graphicFrame")) {
            shape::fill_next_to_labels(frame, &pairs, &mut matched, &style);
        }
    }
    for (i, (label, _)) in pairs.iter().enumerate() {
        if !matched[i] {
            log::warn!("no template cell found for label '{label}'");
        }
    }
}

/// The QC table stays where the template authored it; only its body rows
/// are rewritten.
fn fill_qc(pkg: &mut Package, analysis: &TemplateAnalysis, record: &ReportRecord, cfg: &StyleConfig) {
    let Some((part, id)) = &analysis.qc_table else {
        if !record.qc.is_empty() {
            log::warn!("template has no QC table, skipping {} metric rows", record.qc.rows.len());
        }
        return;
    };
    let Some(idx) = pkg.slide_index(part) else {
        return;
    };
    let Some(frame) = shape::shape_by_id_mut(pkg.slide_mut(idx), *id) else {
        log::warn!("QC table disappeared from {part}");
        return;
    };
    let style = CellStyle {
        size: Some(cfg.body_size),
        color: Some(cfg.body_color.clone()),
        font: Some(cfg.font.clone()),
        ..Default::default()
    };
    shape::fill_table_body(frame, &record.qc.rows, &style);
}

/// Drop generation-allocated slides that ended up carrying nothing beyond
/// a redrawn heading and the sign-off block. Authored template slides are
/// never candidates.
fn remove_ghost_slides(pkg: &mut Package, cursor: &Cursor, record: &ReportRecord) {
    for part in &cursor.created {
        let Some(idx) = pkg.slide_index(part) else {
            continue;
        };
        if is_ghost(pkg, idx, record) {
            log::debug!("dropping empty continuation slide {part}");
            pkg.remove_slide(idx);
        }
    }
}

fn is_ghost(pkg: &Package, idx: usize, record: &ReportRecord) -> bool {
    for info in shape::shapes(pkg.slide(idx)) {
        match info.kind {
            ShapeKind::Table => return false,
            ShapeKind::Text => {
                let text = info.text.trim();
                // redrawn running titles end with a colon and carry no body;
                // a section header with content ("- X: None") never does
                let is_heading = (text.starts_with("- ") && text.ends_with(':'))
                    || text.starts_with('\u{25a3}');
                if text.is_empty() || is_heading {
                    continue;
                }
                let lower = text.to_lowercase();
                let is_footer = record
                    .signatures
                    .iter()
                    .any(|(label, _)| lower.contains(&label.to_lowercase()));
                if !is_footer {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}
