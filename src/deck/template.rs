//! Template analysis: one pass over the blank deck that finds the section
//! anchors, captures the prototype tables, records per-slide bottom limits
//! and lifts the disclaimer text, leaving the deck ready for content flow.

use std::collections::HashMap;

use crate::error::Error;
use crate::pptx::shape::{self, ShapeInfo, ShapeKind};
use crate::pptx::xml::Element;
use crate::pptx::Package;

use super::style::StyleConfig;

/// What a template table is for, decided from its header row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    Snv,
    Fusion,
    Cnv,
    LrBrca,
    Splice,
    Qc,
}

impl TableKind {
    pub fn for_section(key: &str) -> Option<TableKind> {
        match key {
            "snv" => Some(TableKind::Snv),
            "fusion" => Some(TableKind::Fusion),
            "cnv" => Some(TableKind::Cnv),
            "lr_brca" => Some(TableKind::LrBrca),
            "splice" => Some(TableKind::Splice),
            _ => None,
        }
    }
}

/// The three content groups a template page can anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionGroup {
    Clinical,
    Unknown,
    Comment,
}

/// Where a content group starts: the slide part holding the marker and the
/// vertical position just below it. Slides are tracked by part name, not
/// index, so later slide insertions cannot invalidate an anchor.
#[derive(Clone, Debug)]
pub struct Anchor {
    pub part: String,
    pub top: i64,
    pub marker_id: u64,
    pub used: bool,
}

/// Per-slide usable bottom edge, keyed by part name.
#[derive(Clone, Debug)]
pub struct BottomLimits {
    map: HashMap<String, i64>,
    default: i64,
}

impl BottomLimits {
    pub fn new(default: i64) -> Self {
        BottomLimits { map: HashMap::new(), default }
    }

    pub fn get(&self, part: &str) -> i64 {
        self.map.get(part).copied().unwrap_or(self.default)
    }

    /// Record a limit. Repeated calls for one slide keep the tightest value.
    pub fn tighten(&mut self, part: &str, limit: i64) {
        self.map
            .entry(part.to_owned())
            .and_modify(|v| *v = (*v).min(limit))
            .or_insert(limit);
    }
}

pub struct TemplateAnalysis {
    pub anchors: HashMap<SectionGroup, Anchor>,
    /// Captured flowing-table prototypes, detached from their slides.
    pub prototypes: HashMap<TableKind, Element>,
    /// The QC table stays in place and is filled where it stands.
    pub qc_table: Option<(String, u64)>,
    pub limits: BottomLimits,
    pub disclaimer: Option<String>,
}

impl TemplateAnalysis {
    pub fn anchor(&self, group: SectionGroup) -> Option<&Anchor> {
        self.anchors.get(&group)
    }

    pub fn mark_used(&mut self, group: SectionGroup) {
        if let Some(anchor) = self.anchors.get_mut(&group) {
            anchor.used = true;
        }
    }
}

struct Rule {
    kind: TableKind,
    /// Every entry must appear in the joined header text.
    all: &'static [&'static str],
    /// At least one entry of every group must appear.
    any: &'static [&'static [&'static str]],
    /// None of these may appear.
    none: &'static [&'static str],
}

impl Rule {
    fn matches(&self, joined: &str) -> bool {
        self.all.iter().all(|kw| joined.contains(kw))
            && self.any.iter().all(|group| group.iter().any(|kw| joined.contains(kw)))
            && self.none.iter().all(|kw| !joined.contains(kw))
    }
}

/// Ordered classification rules. Exclusions keep sibling layouts apart:
/// LR-BRCA shares its exon column with splice tables and its fold-change
/// column with CNV tables, so those two rules exclude each other's
/// distinguishing column.
const RULES: &[Rule] = &[
    Rule {
        kind: TableKind::Snv,
        all: &["gene", "vaf"],
        any: &[&["consequence", "aa change"]],
        none: &[],
    },
    Rule {
        kind: TableKind::Splice,
        all: &["affected exon", "breakpoint"],
        any: &[],
        none: &[],
    },
    Rule {
        kind: TableKind::LrBrca,
        all: &["affected exon", "fold"],
        any: &[],
        none: &["breakpoint"],
    },
    Rule {
        kind: TableKind::Fusion,
        all: &["fusion", "breakpoint"],
        any: &[],
        none: &["affected exon"],
    },
    Rule {
        kind: TableKind::Cnv,
        all: &["fold change", "copy number"],
        any: &[],
        none: &["exon"],
    },
    Rule {
        kind: TableKind::Qc,
        all: &["metric"],
        any: &[&["lsl", "guideline"]],
        none: &[],
    },
];

/// Classify a table from its header texts. `None` means the table is not
/// one of ours and must be left untouched.
pub fn classify_table(headers: &[String]) -> Option<TableKind> {
    let joined = headers.join(" ").to_lowercase();
    RULES.iter().find(|r| r.matches(&joined)).map(|r| r.kind)
}

/// Scan every slide of the template. Prototype tables and the disclaimer
/// block are removed from their slides here so generated content cannot
/// collide with them; section markers stay (they double as the authored
/// group headings) and are only deleted later if their group goes unused.
pub fn analyze(pkg: &mut Package, cfg: &StyleConfig) -> Result<TemplateAnalysis, Error> {
    let (_, page_h) = pkg.slide_size();
    let mut analysis = TemplateAnalysis {
        anchors: HashMap::new(),
        prototypes: HashMap::new(),
        qc_table: None,
        limits: BottomLimits::new(page_h - cfg.bottom_margin),
        disclaimer: None,
    };

    for idx in 0..pkg.slide_count() {
        let part = pkg.slide(idx).part_name().to_owned();
        let infos = shape::shapes(pkg.slide(idx));
        let mut capture: Vec<(TableKind, u64)> = Vec::new();
        let mut remove: Vec<u64> = Vec::new();

        for info in &infos {
            match info.kind {
                ShapeKind::Text => scan_text_shape(&mut analysis, cfg, &part, info, &mut remove),
                ShapeKind::Table => {
                    let Some(frame) = shape::shape_by_id(pkg.slide(idx), info.id) else {
                        continue;
                    };
                    let headers = shape::table_headers(frame);
                    match classify_table(&headers) {
                        Some(TableKind::Qc) => {
                            if analysis.qc_table.is_none() {
                                analysis.qc_table = Some((part.clone(), info.id));
                            }
                        }
                        Some(kind) => capture.push((kind, info.id)),
                        None => {
                            log::debug!("leaving unrecognised table on {part}: {headers:?}");
                        }
                    }
                }
                _ => {}
            }
        }

        for (kind, id) in capture {
            if analysis.prototypes.contains_key(&kind) {
                log::warn!("duplicate {kind:?} prototype on {part}, leaving it in place");
                continue;
            }
            if let Some(el) = shape::take_shape(pkg.slide_mut(idx), id) {
                analysis.prototypes.insert(kind, el);
            }
        }
        for id in remove {
            shape::remove_shape(pkg.slide_mut(idx), id);
        }
    }

    log::debug!(
        "template analysis: {} anchors, {} prototypes, qc table {}, disclaimer {}",
        analysis.anchors.len(),
        analysis.prototypes.len(),
        if analysis.qc_table.is_some() { "found" } else { "missing" },
        if analysis.disclaimer.is_some() { "captured" } else { "missing" },
    );
    Ok(analysis)
}

fn scan_text_shape(
    analysis: &mut TemplateAnalysis,
    cfg: &StyleConfig,
    part: &str,
    info: &ShapeInfo,
    remove: &mut Vec<u64>,
) {
    let lower = info.text.to_lowercase();
    if lower.trim().is_empty() {
        return;
    }

    for (marker, group) in [
        (&cfg.clinical_marker, SectionGroup::Clinical),
        (&cfg.unknown_marker, SectionGroup::Unknown),
        (&cfg.comment_marker, SectionGroup::Comment),
    ] {
        if lower.contains(marker.as_str()) && !analysis.anchors.contains_key(&group) {
            analysis.anchors.insert(
                group,
                Anchor {
                    part: part.to_owned(),
                    top: info.bottom() + cfg.anchor_gap,
                    marker_id: info.id,
                    used: false,
                },
            );
            return;
        }
    }

    if lower.contains(cfg.trailing_marker.as_str()) || lower.contains(cfg.footer_marker.as_str()) {
        analysis.limits.tighten(part, info.y - cfg.footer_gap);
        return;
    }

    if lower.contains(cfg.disclaimer_marker.as_str()) && analysis.disclaimer.is_none() {
        analysis.disclaimer = Some(info.text.clone());
        remove.push(info.id);
    }
}

/// Delete marker shapes of groups that never received content.
pub fn remove_unused_markers(pkg: &mut Package, analysis: &TemplateAnalysis) {
    for anchor in analysis.anchors.values().filter(|a| !a.used) {
        let Some(idx) = pkg.slide_index(&anchor.part) else {
            continue;
        };
        if shape::remove_shape(pkg.slide_mut(idx), anchor.marker_id) {
            log::debug!("removed unused section marker on {}", anchor.part);
        }
    }
}
