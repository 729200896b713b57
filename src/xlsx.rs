//! Results-workbook ingestion.
//!
//! The laboratory workbook layout is a fixed contract: sheet names, header
//! rows and column titles are stable across exports, so extraction is
//! column projection rather than schema discovery. Variant rows are split
//! into the two significance tiers by the `Clinical_significance` flag
//! column (`VCS` = clinical, `VUS` = unknown).

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use roxmltree::{Document, Node};

use crate::error::Error;
use crate::model::{Fragment, Panel, ReportRecord, TableBlock};

/// Columns projected into each section table, in display order.
struct FamilySpec {
    sheet: &'static str,
    key: &'static str,
    /// Zero-based row the column titles live on.
    header_row: usize,
    gene_col: &'static str,
    columns: &'static [&'static str],
}

const FAMILIES: &[FamilySpec] = &[
    FamilySpec {
        sheet: "SNV",
        key: "snv",
        header_row: 0,
        gene_col: "Gene",
        columns: &["Gene", "Consequence", "AA Change", "VAF", "HGVSc", "HGVSp"],
    },
    FamilySpec {
        sheet: "Fusion",
        key: "fusion",
        header_row: 1,
        gene_col: "Gene fusion",
        columns: &["Gene fusion", "Breakpoint 1", "Breakpoint 2", "Fusion supporting reads"],
    },
    FamilySpec {
        sheet: "CNV",
        key: "cnv",
        header_row: 0,
        gene_col: "Gene",
        columns: &["Gene", "Location", "Fold Change", "Estimated copy number"],
    },
    FamilySpec {
        sheet: "LR_BRCA",
        key: "lr_brca",
        header_row: 0,
        gene_col: "Gene",
        columns: &["Gene", "Location", "Affected exon", "Fold Change", "Estimated copy number"],
    },
    FamilySpec {
        sheet: "Splice",
        key: "splice",
        header_row: 0,
        gene_col: "Gene",
        columns: &["Gene", "Affected exon", "Breakpoint 1", "Breakpoint 2", "Splice supporting reads"],
    },
];

/// Comment cells are collected across all rows in this sheet order,
/// regardless of significance tier.
const COMMENT_ORDER: &[&str] = &["SNV", "CNV", "LR_BRCA", "Fusion", "Splice"];

const SIGNIFICANCE_COL: &str = "Clinical_significance";
const QC_LSL: &str = "80";

pub fn open_workbook(path: &Path) -> Result<ReportRecord, Error> {
    let bytes = fs::read(path).map_err(|e| {
        std::io::Error::new(e.kind(), format!("failed to open {}: {e}", path.display()))
    })?;
    read_workbook(&bytes)
}

/// Parse a results workbook into a [`ReportRecord`].
pub fn read_workbook(bytes: &[u8]) -> Result<ReportRecord, Error> {
    let workbook = Workbook::parse(bytes)?;

    let clinical = workbook
        .sheet("clinical_information")
        .ok_or_else(|| Error::InvalidWorkbook("missing clinical_information sheet".into()))?;
    let pairs = label_value_pairs(clinical);
    let value = |label: &str| {
        pairs
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    let raw_specimen_type = value("Specimen type");
    let panel = if raw_specimen_type.contains(".SA.") { Panel::Sa } else { Panel::Ge };
    let specimen_type = raw_specimen_type.split('.').next().unwrap_or_default().trim().to_owned();
    let specimen = value("Pathology no.");
    if specimen.is_empty() {
        return Err(Error::InvalidWorkbook("clinical_information has no pathology number".into()));
    }

    let mut record = ReportRecord {
        specimen,
        panel,
        specimen_type: specimen_type.clone(),
        ..Default::default()
    };

    record.clinical_info = vec![
        ("Pathology no.".to_owned(), record.specimen.clone()),
        ("Gender".to_owned(), value("Gender")),
        ("Age".to_owned(), value("Age")),
        ("Unit no.".to_owned(), value("Unit no.")),
        ("Patient name".to_owned(), value("Patient name")),
        ("Collection site".to_owned(), value("Collection site")),
        ("Primary site".to_owned(), value("Primary site")),
        ("Diagnosis".to_owned(), value("Diagnosis")),
        ("Requesting physician".to_owned(), value("Requesting physician")),
        ("Department".to_owned(), value("Department")),
        ("Specimen type".to_owned(), specimen_type),
        ("Specimen adequacy".to_owned(), value("Specimen adequacy")),
        ("Received date".to_owned(), value("Received date")),
        ("Report date".to_owned(), value("Report date")),
    ];
    record.nucleic_acid = vec![
        ("DNA".to_owned(), value("DNA conc.(ng/ul)")),
        ("RNA".to_owned(), value("RNA conc.(ng/ul)")),
    ];
    record.signatures = vec![
        ("Tested by".to_owned(), format!("{}, {}", value("Tester1"), value("Tester2"))),
        ("Signed by".to_owned(), format!("{}, {}", value("Signed2"), value("Signed1"))),
        ("Analyzed by".to_owned(), value("Analyzed by")),
        ("Accession no.".to_owned(), value("Accession no.")),
    ];
    record.filter_history = vec![
        (
            "Include".to_owned(),
            "Exonic, Illumina Q.C Filter PASS, Fold change <0.5 or >1.5".to_owned(),
        ),
        (
            "Exclude".to_owned(),
            "Synonymous, VAF <3%, total depth <100, refer depth=0".to_owned(),
        ),
    ];
    record.analysis_program = "DRAGEN TSO500 ( Workflow Version : 2.5.2 )".to_owned();
    record.failed_genes = "None".to_owned();

    extract_qc(&workbook, &mut record);
    extract_biomarkers(&workbook, &mut record);
    extract_sections(&workbook, &mut record);
    extract_comments(&workbook, &mut record);

    record.diagnostic_info = diagnostic_info(record.panel, &record.instrument);

    log::info!(
        "ingested workbook for {} ({} panel, {} sections with rows)",
        record.specimen,
        record.panel.code(),
        record.sections.values().filter(|b| !b.is_empty()).count()
    );
    Ok(record)
}

fn extract_qc(workbook: &Workbook, record: &mut ReportRecord) {
    let Some(qc) = workbook.sheet("NGS_QC") else {
        log::warn!("worksheet NGS_QC missing, QC metrics left empty");
        return;
    };
    // Positional grid: metric names in column B, values in column D, the
    // three coverage rows at grid rows 8..10; instrument model at E2.
    record.instrument = match qc.cell(1, 4) {
        "" => String::new(),
        model => format!("{model} Dx [Illumina]"),
    };
    record.qc = TableBlock {
        highlights: Vec::new(),
        headers: vec!["Metric (UOM)".to_owned(), "LSL Guideline".to_owned(), "Value".to_owned()],
        rows: (7..=9)
            .map(|r| vec![qc.cell(r, 1).to_owned(), QC_LSL.to_owned(), qc.cell(r, 3).to_owned()])
            .collect(),
    };
}

fn extract_biomarkers(workbook: &Workbook, record: &mut ReportRecord) {
    let Some(io) = workbook.sheet("IO") else {
        log::warn!("worksheet IO missing, TMB/MSI left empty");
        return;
    };
    let table = io.table(1);
    let Some(value_col) = table.col("Value") else {
        log::warn!("IO sheet has no Value column, TMB/MSI left empty");
        return;
    };
    record.tmb = match table.cell(0, value_col) {
        "" => String::new(),
        v => format!("{v} /Megabase"),
    };
    record.msi = match table.cell(7, value_col) {
        "" => String::new(),
        v => format!("{v} %"),
    };
}

fn extract_sections(workbook: &Workbook, record: &mut ReportRecord) {
    for family in FAMILIES {
        let Some(sheet) = workbook.sheet(family.sheet) else {
            log::warn!("worksheet {} missing, treating as empty", family.sheet);
            for tier in ["clinical", "unknown"] {
                record.sections.insert(format!("{}_{tier}", family.key), empty_block(family));
            }
            continue;
        };
        let table = sheet.table(family.header_row);
        for (tier, flag) in [("clinical", "VCS"), ("unknown", "VUS")] {
            let block = extract_family(&table, family, flag);
            record.sections.insert(format!("{}_{tier}", family.key), block);
        }
    }
}

fn extract_family(table: &SheetTable, family: &FamilySpec, flag: &str) -> TableBlock {
    let Some(sig_col) = table.col(SIGNIFICANCE_COL) else {
        log::warn!("worksheet {} has no {SIGNIFICANCE_COL} column", family.sheet);
        return empty_block(family);
    };
    let selected: Vec<usize> = (0..table.row_count())
        .filter(|&r| table.cell(r, sig_col) == flag)
        .collect();

    let cols: Vec<Option<usize>> = family.columns.iter().map(|c| table.col(c)).collect();
    for (name, col) in family.columns.iter().zip(&cols) {
        if col.is_none() {
            log::warn!("worksheet {} has no column '{name}'", family.sheet);
        }
    }
    let rows: Vec<Vec<String>> = selected
        .iter()
        .map(|&r| {
            family
                .columns
                .iter()
                .zip(&cols)
                .map(|(name, col)| {
                    let raw = col.map(|c| table.cell(r, c)).unwrap_or_default();
                    if *name == "VAF" { format_vaf(raw) } else { raw.to_owned() }
                })
                .collect()
        })
        .collect();

    let highlight_cells: Vec<&str> = match table.col("highlight") {
        Some(col) => selected
            .iter()
            .map(|&r| table.cell(r, col))
            .filter(|v| !v.is_empty())
            .collect(),
        None => Vec::new(),
    };
    let genes: Vec<&str> = table
        .col(family.gene_col)
        .map(|col| selected.iter().map(|&r| table.cell(r, col)).collect())
        .unwrap_or_default();
    let highlights = highlight_fragments(&highlight_cells.join(", "), &genes);

    TableBlock {
        highlights,
        headers: family.columns.iter().map(|c| (*c).to_owned()).collect(),
        rows,
    }
}

fn empty_block(family: &FamilySpec) -> TableBlock {
    TableBlock {
        highlights: Vec::new(),
        headers: family.columns.iter().map(|c| (*c).to_owned()).collect(),
        rows: Vec::new(),
    }
}

fn extract_comments(workbook: &Workbook, record: &mut ReportRecord) {
    for name in COMMENT_ORDER {
        let Some(sheet) = workbook.sheet(name) else {
            continue;
        };
        let header_row = FAMILIES.iter().find(|f| f.sheet == *name).map_or(0, |f| f.header_row);
        let table = sheet.table(header_row);
        let Some(col) = table.col("Comment").or_else(|| table.col("comment")) else {
            continue;
        };
        for r in 0..table.row_count() {
            let text = table.cell(r, col);
            if !text.is_empty() {
                record.comments.push(text.to_owned());
            }
        }
    }
}

fn diagnostic_info(panel: Panel, instrument: &str) -> Vec<(String, String)> {
    let reagents = match panel {
        Panel::Ge => {
            "AllPrep DNA/RNA FFPE Kit (50) [Qiagen], TruSight\u{2122} Oncology 500 kit [Illumina]"
        }
        Panel::Sa => {
            "AllPrep DNA/RNA FFPE Kit (50) [Qiagen], TruSight\u{2122} Oncology 500 kit [Illumina], \
             TruSight\u{2122} RNA Fusion Panel [Illumina]"
        }
    };
    vec![
        ("Reagents".to_owned(), reagents.to_owned()),
        (
            "Method".to_owned(),
            "NGS targeted DNA/RNA sequencing (Library : Hybrid capture)".to_owned(),
        ),
        ("Instrument type".to_owned(), instrument.to_owned()),
        ("Reference genome".to_owned(), "Homo_sapiens/ UCSC/ hg19".to_owned()),
    ]
}

/// First two columns of a headerless sheet as ordered label/value pairs.
fn label_value_pairs(sheet: &Sheet) -> Vec<(String, String)> {
    sheet
        .rows
        .iter()
        .filter(|row| !row.first().is_none_or(|l| l.trim().is_empty()))
        .map(|row| {
            (
                row.first().map(|s| s.trim().to_owned()).unwrap_or_default(),
                row.get(1).map(|s| s.trim().to_owned()).unwrap_or_default(),
            )
        })
        .collect()
}

fn format_vaf(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) => format!("{v:.2}"),
        Err(_) => raw.to_owned(),
    }
}

/// Split one comma-joined highlight string into styled fragments: gene
/// symbols italic, everything else upright. Gene symbols come from the
/// sheet's own gene column (fusion pairs split on `-`), matched leftmost
/// and longest first; `::`-joined chains stay one italic block. An item
/// with no gene match falls back to italicising its first token.
fn highlight_fragments(joined: &str, gene_cells: &[&str]) -> Vec<Fragment> {
    if joined.is_empty() {
        return Vec::new();
    }
    let mut genes: Vec<&str> = gene_cells
        .iter()
        .flat_map(|g| g.split('-'))
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .collect();
    genes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    genes.dedup();

    let items: Vec<&str> = joined.split(", ").collect();
    let mut frags = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        frags.extend(item_fragments(item, &genes));
        if idx + 1 < items.len() {
            frags.push(Fragment::plain(", "));
        }
    }
    frags
}

fn item_fragments(text: &str, genes: &[&str]) -> Vec<Fragment> {
    let mut frags = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let mut best: Option<(usize, usize)> = None;
        for gene in genes {
            if let Some(found) = text[pos..].find(gene) {
                let start = pos + found;
                let end = start + gene.len();
                if best.is_none_or(|(bs, be)| start < bs || (start == bs && end > be)) {
                    best = Some((start, end));
                }
            }
        }
        let Some((start, mut end)) = best else {
            break;
        };
        // A::B fusion notation reads as one gene block.
        while let Some(rest) = text[end..].strip_prefix("::") {
            match genes.iter().find(|g| rest.starts_with(**g)) {
                Some(g) => end += 2 + g.len(),
                None => break,
            }
        }
        if start > pos {
            frags.push(Fragment::plain(&text[pos..start]));
        }
        frags.push(Fragment::gene(&text[start..end]));
        pos = end;
    }
    if frags.is_empty() {
        return match text.split_once(' ') {
            Some((head, tail)) => vec![Fragment::gene(head), Fragment::plain(format!(" {tail}"))],
            None => vec![Fragment::gene(text)],
        };
    }
    if pos < text.len() {
        frags.push(Fragment::plain(&text[pos..]));
    }
    frags
}

struct Workbook {
    sheets: HashMap<String, Sheet>,
}

impl Workbook {
    fn parse(bytes: &[u8]) -> Result<Workbook, Error> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?.ok_or_else(|| {
            Error::InvalidWorkbook("missing xl/workbook.xml (is this an xlsx file?)".into())
        })?;
        let rels_xml = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?
            .ok_or_else(|| Error::InvalidWorkbook("missing workbook relationships".into()))?;
        let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let rels = parse_workbook_rels(&rels_xml)?;
        let doc = Document::parse(&workbook_xml)?;
        let mut sheets = HashMap::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("sheet")) {
            let Some(name) = node.attribute("name") else {
                continue;
            };
            let Some(target) = node
                .attributes()
                .find(|a| a.name() == "id")
                .and_then(|a| rels.get(a.value()))
            else {
                log::warn!("worksheet {name} has no resolvable part, skipping");
                continue;
            };
            let part = if let Some(abs) = target.strip_prefix('/') {
                abs.to_owned()
            } else {
                format!("xl/{target}")
            };
            let Some(xml) = read_part(&mut archive, &part)? else {
                log::warn!("worksheet part {part} missing from archive");
                continue;
            };
            sheets.insert(name.to_owned(), parse_sheet(&xml, &shared)?);
        }
        log::debug!("workbook parsed with {} sheets", sheets.len());
        Ok(Workbook { sheets })
    }

    fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }
}

fn read_part(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, Error> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_workbook_rels(xml: &str) -> Result<HashMap<String, String>, Error> {
    let doc = Document::parse(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("Relationship"))
        .filter_map(|n| {
            let id = n.attribute("Id")?;
            let target = n.attribute("Target")?;
            Some((id.to_owned(), target.to_owned()))
        })
        .collect())
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, Error> {
    let doc = Document::parse(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("si"))
        .map(|si| {
            si.descendants()
                .filter(|n| n.has_tag_name("t"))
                .filter(|n| !n.ancestors().any(|a| a.has_tag_name("rPh")))
                .filter_map(|n| n.text())
                .collect::<String>()
        })
        .collect())
}

/// One worksheet as a dense grid. Row and column gaps in the source XML
/// are filled with empty strings so positional access is stable.
struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows.get(row).and_then(|r| r.get(col)).map_or("", String::as_str)
    }

    fn table(&self, header_row: usize) -> SheetTable<'_> {
        let headers: Vec<&str> = self
            .rows
            .get(header_row)
            .map(|r| r.iter().map(String::as_str).collect())
            .unwrap_or_default();
        SheetTable { headers, rows: self.rows.get(header_row + 1..).unwrap_or_default() }
    }
}

/// Header-indexed view over a sheet's data rows.
struct SheetTable<'a> {
    headers: Vec<&'a str>,
    rows: &'a [Vec<String>],
}

impl SheetTable<'_> {
    fn col(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows.get(row).and_then(|r| r.get(col)).map_or("", String::as_str)
    }
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Sheet, Error> {
    let doc = Document::parse(xml)?;
    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in doc.descendants().filter(|n| n.has_tag_name("row")) {
        let idx = row
            .attribute("r")
            .and_then(|v| v.parse::<usize>().ok())
            .map(|v| v.saturating_sub(1))
            .unwrap_or(rows.len());
        let mut cells: Vec<String> = Vec::new();
        for c in row.children().filter(|n| n.has_tag_name("c")) {
            let col = c.attribute("r").map(col_index).unwrap_or(cells.len());
            let value = cell_value(c, shared);
            if col < cells.len() {
                cells[col] = value;
            } else {
                cells.resize(col, String::new());
                cells.push(value);
            }
        }
        if idx < rows.len() {
            rows[idx] = cells;
        } else {
            rows.resize(idx, Vec::new());
            rows.push(cells);
        }
    }
    Ok(Sheet { rows })
}

fn cell_value(c: Node, shared: &[String]) -> String {
    let v = || {
        c.children()
            .find(|n| n.has_tag_name("v"))
            .and_then(|n| n.text())
            .unwrap_or("")
            .to_owned()
    };
    match c.attribute("t") {
        Some("s") => {
            let text = v();
            match text.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                Some(s) => s.clone(),
                None => {
                    log::warn!("cell references shared string {text} out of range");
                    String::new()
                }
            }
        }
        Some("inlineStr") => c
            .children()
            .find(|n| n.has_tag_name("is"))
            .map(|is| {
                is.descendants()
                    .filter(|n| n.has_tag_name("t"))
                    .filter_map(|n| n.text())
                    .collect::<String>()
            })
            .unwrap_or_default(),
        _ => v(),
    }
}

/// Column index from an A1 cell reference: `B7` is column 1.
fn col_index(reference: &str) -> usize {
    let mut col = 0usize;
    for b in reference.bytes().take_while(u8::is_ascii_uppercase) {
        col = col * 26 + (b - b'A' + 1) as usize;
    }
    col.saturating_sub(1)
}
