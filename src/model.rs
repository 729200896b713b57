use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Assay panel a specimen was run on. Decides which deck template is used
/// and which worksheets the workbook is expected to carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Panel {
    #[default]
    #[serde(rename = "GE")]
    Ge,
    #[serde(rename = "SA")]
    Sa,
}

impl Panel {
    pub fn code(&self) -> &'static str {
        match self {
            Panel::Ge => "GE",
            Panel::Sa => "SA",
        }
    }

    /// File name of the blank deck template for this panel.
    pub fn template_name(&self) -> &'static str {
        match self {
            Panel::Ge => "blank_GE_report.pptx",
            Panel::Sa => "blank_SA_report.pptx",
        }
    }
}

/// Significance tier of a variant section. Drives which template page the
/// content lands on and how it is styled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Significance {
    Clinical,
    Unknown,
}

impl Significance {
    pub fn key_suffix(&self) -> &'static str {
        match self {
            Significance::Clinical => "clinical",
            Significance::Unknown => "unknown",
        }
    }
}

/// One styled run of a section headline. Gene symbols are italicised,
/// everything else is upright.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub italic: bool,
}

impl Fragment {
    pub fn plain(text: impl Into<String>) -> Self {
        Fragment { text: text.into(), italic: false }
    }

    pub fn gene(text: impl Into<String>) -> Self {
        Fragment { text: text.into(), italic: true }
    }
}

/// Tabular payload of one report section: the headline fragments shown next
/// to the section title, the column headers and the data rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBlock {
    pub highlights: Vec<Fragment>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableBlock {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Headline text with the styling flattened out, e.g. for HTML output
    /// or for building the comment keyword set.
    pub fn highlight_text(&self) -> String {
        self.highlights.iter().map(|f| f.text.as_str()).collect()
    }

    /// Individual variant descriptors from the headline, e.g.
    /// `["EGFR p.L858R", "KRAS p.G12C"]`.
    pub fn highlight_descriptors(&self) -> Vec<String> {
        self.highlight_text()
            .split(", ")
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
            .map(str::to_owned)
            .collect()
    }
}

/// Variant section families in report order. `key` is the stem of the two
/// record section keys, `{key}_clinical` and `{key}_unknown`.
#[derive(Clone, Copy, Debug)]
pub struct SectionDef {
    pub key: &'static str,
    pub title: &'static str,
}

pub const SECTIONS: &[SectionDef] = &[
    SectionDef { key: "snv", title: "SNVs & Indels" },
    SectionDef { key: "fusion", title: "Fusion genes" },
    SectionDef { key: "cnv", title: "Copy number variations" },
    SectionDef { key: "lr_brca", title: "Large rearrangements in BRCA1/2" },
    SectionDef { key: "splice", title: "Splice variants" },
];

pub fn section_key(base: &str, sig: Significance) -> String {
    format!("{base}_{}", sig.key_suffix())
}

/// Everything extracted from one specimen's result workbook, in the shape
/// the deck and HTML renderers consume. Serialises to the JSON record store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Laboratory specimen identifier, e.g. `SS2430925`.
    pub specimen: String,
    pub panel: Panel,
    /// Human readable specimen type, e.g. `FFPE tissue`.
    pub specimen_type: String,
    /// Ordered label/value pairs from the clinical information sheet.
    pub clinical_info: Vec<(String, String)>,
    /// Sequencing QC metrics: metric, guideline and value per row.
    pub qc: TableBlock,
    pub instrument: String,
    /// Variant sections keyed by `{family}_{significance}`, e.g. `snv_clinical`.
    pub sections: BTreeMap<String, TableBlock>,
    /// Interpretive comment paragraphs, one per commented variant.
    pub comments: Vec<String>,
    pub tmb: String,
    pub msi: String,
    pub failed_genes: String,
    pub diagnostic_info: Vec<(String, String)>,
    pub filter_history: Vec<(String, String)>,
    pub nucleic_acid: Vec<(String, String)>,
    pub analysis_program: String,
    /// Sign-off label/value pairs rendered into the comment page footer.
    pub signatures: Vec<(String, String)>,
}

impl ReportRecord {
    pub fn section(&self, key: &str) -> Option<&TableBlock> {
        self.sections.get(key)
    }

    /// Output file name for a generated deck, `date` formatted as yymmdd.
    pub fn deck_filename(&self, date: &str) -> String {
        format!("{}_{}_report_{date}_auto.pptx", self.specimen, self.panel.code())
    }

    pub fn clinical_value(&self, label: &str) -> Option<&str> {
        self.clinical_info
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_descriptors_split_on_separator() {
        let block = TableBlock {
            highlights: vec![
                Fragment::gene("EGFR"),
                Fragment::plain(" p.L858R, "),
                Fragment::gene("KRAS"),
                Fragment::plain(" p.G12C"),
            ],
            ..Default::default()
        };
        assert_eq!(block.highlight_descriptors(), vec!["EGFR p.L858R", "KRAS p.G12C"]);
    }

    #[test]
    fn highlight_descriptors_ignore_none() {
        let block = TableBlock {
            highlights: vec![Fragment::plain("None")],
            ..Default::default()
        };
        assert!(block.highlight_descriptors().is_empty());
    }

    #[test]
    fn deck_filename_embeds_panel_and_date() {
        let record = ReportRecord {
            specimen: "SS2430925".into(),
            panel: Panel::Sa,
            ..Default::default()
        };
        assert_eq!(record.deck_filename("251203"), "SS2430925_SA_report_251203_auto.pptx");
    }
}
