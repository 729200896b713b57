#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use oncodeck::model::{Fragment, Panel, ReportRecord, TableBlock};
use oncodeck::pptx::Package;
use oncodeck::pptx::shape;
use oncodeck::pptx::xml::Element;

const DML: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PML: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub const SNV_HEADERS: [&str; 6] = ["Gene", "Consequence", "AA Change", "VAF", "HGVSc", "HGVSp"];
pub const FUSION_HEADERS: [&str; 4] =
    ["Gene fusion", "Breakpoint 1", "Breakpoint 2", "Fusion supporting reads"];
pub const QC_HEADERS: [&str; 3] = ["Metric (UOM)", "LSL Guideline", "Value"];

pub const TEMPLATE_DISCLAIMER: &str = "This test was developed and its performance \
    characteristics determined by Example Laboratories. It has not been cleared or \
    approved by the FDA.";

fn esc(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

// ---- blank deck template ---------------------------------------------------

/// Knobs for the synthetic three-slide report template: cover page with the
/// labelled patient and QC tables, sections page with markers and prototype
/// tables, comment page with marker, disclaimer and footer.
pub struct TemplateOpts {
    pub snv_prototype: bool,
    pub clinical_marker: bool,
    /// Top edge of the "Variants of unknown significance" marker.
    pub unknown_marker_y: i64,
}

impl Default for TemplateOpts {
    fn default() -> Self {
        TemplateOpts { snv_prototype: true, clinical_marker: true, unknown_marker_y: 3_600_000 }
    }
}

pub fn default_template() -> Vec<u8> {
    template(&TemplateOpts::default())
}

pub fn template(opts: &TemplateOpts) -> Vec<u8> {
    let cover = [
        table_shape(2, 360_000, 800_000, &label_rows(&["Pathology no.", "Patient name", "Gender", "Diagnosis"])),
        table_shape(3, 360_000, 2_400_000, &label_rows(&["Instrument type", "Analysis program"])),
        table_shape(4, 360_000, 3_600_000, &headed_rows(&QC_HEADERS, 3)),
        text_shape(5, 360_000, 6_000_000, 6_000_000, 216_000, "Department of Pathology, Yeouido Example Hospital"),
    ]
    .concat();

    let mut sections = String::new();
    sections += &text_shape(2, 0, 0, 12_192_000, 120_000, "");
    if opts.clinical_marker {
        sections += &text_shape(3, 360_000, 600_000, 6_000_000, 216_000, "Variants of clinical significance");
    }
    if opts.snv_prototype {
        sections += &table_shape(4, 360_000, 1_000_000, &headed_rows(&SNV_HEADERS, 1));
    }
    sections += &table_shape(5, 360_000, 1_900_000, &headed_rows(&FUSION_HEADERS, 1));
    sections += &text_shape(6, 360_000, opts.unknown_marker_y, 6_000_000, 216_000, "Variants of unknown significance");
    sections += &text_shape(7, 360_000, 6_100_000, 3_000_000, 216_000, "Other biomarkers");
    sections += &table_shape(8, 360_000, 6_280_000, &label_rows(&["TMB", "MSI"]));

    let comment = [
        text_shape(2, 360_000, 600_000, 3_000_000, 216_000, "\u{25a3} Comment"),
        text_shape(3, 360_000, 5_000_000, 11_472_000, 400_000, TEMPLATE_DISCLAIMER),
        text_shape(4, 360_000, 6_200_000, 6_000_000, 216_000, "Department of Pathology, Yeouido Example Hospital"),
    ]
    .concat();

    let slides = [cover, sections, comment];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut put = |name: &str, content: &str| {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    };

    let mut content_types = String::from(
        "<?xml version=\"1.0\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/ppt/presentation.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml\"/>\
         <Override PartName=\"/ppt/slideLayouts/slideLayout1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml\"/>",
    );
    for n in 1..=slides.len() {
        content_types += &format!(
            "<Override PartName=\"/ppt/slides/slide{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slide+xml\"/>"
        );
    }
    content_types += "</Types>";
    put("[Content_Types].xml", &content_types);

    put(
        "_rels/.rels",
        &format!(
            "<?xml version=\"1.0\"?><Relationships xmlns=\"{PKG_REL}\">\
             <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"ppt/presentation.xml\"/>\
             </Relationships>"
        ),
    );

    let mut sld_ids = String::new();
    let mut pres_rels = String::new();
    for n in 1..=slides.len() {
        sld_ids += &format!("<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 255 + n, n + 1);
        pres_rels += &format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide\" Target=\"slides/slide{n}.xml\"/>",
            n + 1
        );
    }
    put(
        "ppt/presentation.xml",
        &format!(
            "<?xml version=\"1.0\"?><p:presentation xmlns:a=\"{DML}\" xmlns:r=\"{REL}\" xmlns:p=\"{PML}\">\
             <p:sldIdLst>{sld_ids}</p:sldIdLst><p:sldSz cx=\"12192000\" cy=\"6858000\"/></p:presentation>"
        ),
    );
    put(
        "ppt/_rels/presentation.xml.rels",
        &format!("<?xml version=\"1.0\"?><Relationships xmlns=\"{PKG_REL}\">{pres_rels}</Relationships>"),
    );

    for (i, shapes) in slides.iter().enumerate() {
        let n = i + 1;
        put(&format!("ppt/slides/slide{n}.xml"), &slide_xml(shapes));
        put(
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            &format!(
                "<?xml version=\"1.0\"?><Relationships xmlns=\"{PKG_REL}\">\
                 <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout\" Target=\"../slideLayouts/slideLayout1.xml\"/>\
                 </Relationships>"
            ),
        );
    }

    put(
        "ppt/slideLayouts/slideLayout1.xml",
        &format!(
            "<?xml version=\"1.0\"?><p:sldLayout xmlns:a=\"{DML}\" xmlns:p=\"{PML}\">\
             <p:cSld name=\"Blank\"><p:spTree/></p:cSld></p:sldLayout>"
        ),
    );

    zip.finish().unwrap().into_inner()
}

fn slide_xml(shapes: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><p:sld xmlns:a=\"{DML}\" xmlns:r=\"{REL}\" xmlns:p=\"{PML}\">\
         <p:cSld><p:spTree>\
         <p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
         <p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"
    )
}

fn text_shape(id: u64, x: i64, y: i64, cx: i64, cy: i64, text: &str) -> String {
    let para = if text.is_empty() {
        "<a:p/>".to_owned()
    } else {
        format!("<a:p><a:r><a:rPr lang=\"en-US\"/><a:t>{}</a:t></a:r></a:p>", esc(text))
    };
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"TextBox {id}\"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>\
         <p:spPr><a:xfrm><a:off x=\"{x}\" y=\"{y}\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm></p:spPr>\
         <p:txBody><a:bodyPr/><a:lstStyle/>{para}</p:txBody></p:sp>"
    )
}

fn table_shape(id: u64, x: i64, y: i64, rows: &[Vec<&str>]) -> String {
    let cols = rows.first().map_or(1, Vec::len);
    let grid: String = "<a:gridCol w=\"1500000\"/>".repeat(cols);
    let trs: String = rows
        .iter()
        .map(|row| {
            let tcs: String = row.iter().map(|c| table_cell(c)).collect();
            format!("<a:tr h=\"288000\">{tcs}</a:tr>")
        })
        .collect();
    let cx = 1_500_000 * cols as i64;
    let cy = 288_000 * rows.len() as i64;
    format!(
        "<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id=\"{id}\" name=\"Table {id}\"/>\
         <p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr>\
         <p:xfrm><a:off x=\"{x}\" y=\"{y}\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></p:xfrm>\
         <a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/table\">\
         <a:tbl><a:tblPr firstRow=\"1\"/><a:tblGrid>{grid}</a:tblGrid>{trs}</a:tbl>\
         </a:graphicData></a:graphic></p:graphicFrame>"
    )
}

fn table_cell(text: &str) -> String {
    let para = if text.is_empty() {
        "<a:p/>".to_owned()
    } else {
        format!("<a:p><a:r><a:rPr lang=\"en-US\"/><a:t>{}</a:t></a:r></a:p>", esc(text))
    };
    format!("<a:tc><a:txBody><a:bodyPr/><a:lstStyle/>{para}</a:txBody><a:tcPr/></a:tc>")
}

fn label_rows<'a>(labels: &[&'a str]) -> Vec<Vec<&'a str>> {
    labels.iter().map(|l| vec![*l, ""]).collect()
}

fn headed_rows<'a>(headers: &[&'a str], body: usize) -> Vec<Vec<&'a str>> {
    let mut rows = vec![headers.to_vec()];
    for _ in 0..body {
        rows.push(vec![""; headers.len()]);
    }
    rows
}

// ---- results workbook ------------------------------------------------------

pub fn cells(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

pub fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter().map(|r| cells(r)).collect()
}

/// Sheets of a plausible GE-panel results workbook: one VCS and one VUS SNV
/// plus a benign row that must be dropped, a VCS fusion, a VCS CNV without a
/// comment, an empty LR_BRCA sheet and a VUS splice variant with the
/// lowercase comment column that sheet carries.
pub fn base_sheets() -> Vec<(&'static str, Vec<Vec<String>>)> {
    let clinical = grid(&[
        &["Pathology no.", "S24-12345"],
        &["Gender", "M"],
        &["Age", "61"],
        &["Unit no.", "U-778"],
        &["Patient name", "Hong Gildong"],
        &["Collection site", "Lung"],
        &["Primary site", "Lung, RUL"],
        &["Diagnosis", "Adenocarcinoma"],
        &["Requesting physician", "Dr. Kim"],
        &["Department", "Oncology"],
        &["Specimen type", "FFPE.GE.v2"],
        &["Specimen adequacy", "Adequate"],
        &["Received date", "2024-03-02"],
        &["Report date", "2024-03-09"],
        &["DNA conc.(ng/ul)", "25.4"],
        &["RNA conc.(ng/ul)", "18.1"],
        &["Tester1", "A. Tester"],
        &["Tester2", "B. Tester"],
        &["Signed1", "C. Chief"],
        &["Signed2", "D. Director"],
        &["Analyzed by", "E. Analyst"],
        &["Accession no.", "ACC-9912"],
    ]);

    let mut qc = vec![Vec::new(); 10];
    qc[1] = cells(&["", "", "", "", "NextSeq 550"]);
    qc[7] = cells(&["", "Total region coverage (%)", "", "97.1"]);
    qc[8] = cells(&["", "Target coverage at 100x (%)", "", "95.0"]);
    qc[9] = cells(&["", "Uniformity (%)", "", "92.3"]);

    let mut io = vec![Vec::new(); 10];
    io[0] = cells(&["Immuno-Oncology biomarkers"]);
    io[1] = cells(&["Biomarker", "Value", "Unit"]);
    io[2] = cells(&["TMB", "12.3", "Mutations/Mb"]);
    io[9] = cells(&["MSI", "1.2", "%"]);

    let snv = grid(&[
        &["Gene", "Consequence", "AA Change", "VAF", "HGVSc", "HGVSp", "Clinical_significance", "highlight", "Comment"],
        &["EGFR", "missense_variant", "p.L858R", "12.3456", "c.2573T>G", "p.Leu858Arg", "VCS", "EGFR p.L858R",
          "EGFR p.L858R: activating mutation, sensitive to EGFR-TKI."],
        &["KRAS", "missense_variant", "p.G12C", "8.1", "c.34G>T", "p.Gly12Cys", "VUS", "", ""],
        &["TP53", "stop_gained", "p.R342*", "41", "c.1024C>T", "p.Arg342Ter", "Benign", "", ""],
    ]);

    let fusion = grid(&[
        &["Fusion analysis"],
        &["Gene fusion", "Breakpoint 1", "Breakpoint 2", "Fusion supporting reads", "Clinical_significance", "highlight", "Comment"],
        &["EML4-ALK", "chr2:42522656", "chr2:29446394", "152", "VCS", "EML4::ALK fusion",
          "EML4-ALK fusion: responsive to ALK inhibitors."],
    ]);

    let cnv = grid(&[
        &["Gene", "Location", "Fold Change", "Estimated copy number", "Clinical_significance", "highlight", "Comment"],
        &["ERBB2", "chr17:37844393-37884915", "5.6", "11", "VCS", "ERBB2 amplification", ""],
    ]);

    let lr_brca = grid(&[
        &["Gene", "Location", "Affected exon", "Fold Change", "Estimated copy number", "Clinical_significance", "highlight", "Comment"],
    ]);

    let splice = grid(&[
        &["Gene", "Affected exon", "Breakpoint 1", "Breakpoint 2", "Splice supporting reads", "Clinical_significance", "highlight", "comment"],
        &["MET", "14", "chr7:116411708", "chr7:116414935", "88", "VUS", "MET exon 14 skipping",
          "MET exon 14 skipping detected."],
    ]);

    vec![
        ("clinical_information", clinical),
        ("NGS_QC", qc),
        ("IO", io),
        ("SNV", snv),
        ("Fusion", fusion),
        ("CNV", cnv),
        ("LR_BRCA", lr_brca),
        ("Splice", splice),
    ]
}

pub fn set_clinical_value(sheets: &mut [(&str, Vec<Vec<String>>)], label: &str, value: &str) {
    let Some((_, rows)) = sheets.iter_mut().find(|(n, _)| *n == "clinical_information") else {
        panic!("fixture has no clinical_information sheet");
    };
    let row = rows
        .iter_mut()
        .find(|r| r.first().is_some_and(|l| l == label))
        .unwrap_or_else(|| panic!("no clinical row labelled {label}"));
    row[1] = value.to_owned();
}

/// Zip the sheets into xlsx bytes. Cells are written as inline strings with
/// explicit A1 references; empty cells and rows are skipped, so sparse grids
/// exercise the reader's gap filling.
pub fn workbook(sheets: &[(&str, Vec<Vec<String>>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut workbook_xml = format!(
        "<?xml version=\"1.0\"?>\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" xmlns:r=\"{REL}\"><sheets>"
    );
    let mut rels = format!("<?xml version=\"1.0\"?><Relationships xmlns=\"{PKG_REL}\">");
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook_xml += &format!("<sheet name=\"{}\" sheetId=\"{n}\" r:id=\"rId{n}\"/>", esc(name));
        rels += &format!(
            "<Relationship Id=\"rId{n}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{n}.xml\"/>"
        );
    }
    workbook_xml += "</sheets></workbook>";
    rels += "</Relationships>";

    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(workbook_xml.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();

    for (i, (_, rows)) in sheets.iter().enumerate() {
        let mut sheet = String::from(
            "<?xml version=\"1.0\"?>\
             <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
        );
        for (r, row) in rows.iter().enumerate() {
            if row.iter().all(|c| c.is_empty()) {
                continue;
            }
            sheet += &format!("<row r=\"{}\">", r + 1);
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                sheet += &format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    cell_ref(r, c),
                    esc(value)
                );
            }
            sheet += "</row>";
        }
        sheet += "</sheetData></worksheet>";
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

fn cell_ref(row: usize, col: usize) -> String {
    let mut letters = String::new();
    let mut c = col + 1;
    while c > 0 {
        letters.insert(0, (b'A' + ((c - 1) % 26) as u8) as char);
        c = (c - 1) / 26;
    }
    format!("{letters}{}", row + 1)
}

// ---- records ---------------------------------------------------------------

pub fn base_record() -> ReportRecord {
    ReportRecord {
        specimen: "S24-0001".to_owned(),
        panel: Panel::Ge,
        specimen_type: "FFPE".to_owned(),
        clinical_info: vec![
            ("Pathology no.".to_owned(), "S24-0001".to_owned()),
            ("Patient name".to_owned(), "Hong Gildong".to_owned()),
            ("Gender".to_owned(), "M".to_owned()),
            ("Diagnosis".to_owned(), "Adenocarcinoma".to_owned()),
        ],
        qc: TableBlock {
            highlights: Vec::new(),
            headers: QC_HEADERS.iter().map(|h| (*h).to_owned()).collect(),
            rows: grid(&[
                &["Total region coverage (%)", "80", "97.1"],
                &["Target coverage at 100x (%)", "80", "95.0"],
                &["Uniformity (%)", "80", "92.3"],
            ]),
        },
        instrument: "NextSeq 550 Dx [Illumina]".to_owned(),
        comments: vec!["EGFR p.L858R: activating mutation.".to_owned()],
        tmb: "12.3 /Megabase".to_owned(),
        msi: "1.2 %".to_owned(),
        failed_genes: "None".to_owned(),
        diagnostic_info: vec![
            ("Reagents".to_owned(), "AllPrep DNA/RNA FFPE Kit (50) [Qiagen]".to_owned()),
            ("Instrument type".to_owned(), "NextSeq 550 Dx [Illumina]".to_owned()),
        ],
        filter_history: vec![
            ("Include".to_owned(), "Exonic".to_owned()),
            ("Exclude".to_owned(), "Synonymous".to_owned()),
        ],
        nucleic_acid: vec![
            ("DNA".to_owned(), "25.4".to_owned()),
            ("RNA".to_owned(), "18.1".to_owned()),
        ],
        analysis_program: "DRAGEN TSO500 ( Workflow Version : 2.5.2 )".to_owned(),
        signatures: vec![
            ("Tested by".to_owned(), "A. Tester, B. Tester".to_owned()),
            ("Signed by".to_owned(), "D. Director, C. Chief".to_owned()),
            ("Analyzed by".to_owned(), "E. Analyst".to_owned()),
            ("Accession no.".to_owned(), "ACC-9912".to_owned()),
        ],
        ..Default::default()
    }
}

pub fn snv_block(rows: usize) -> TableBlock {
    TableBlock {
        highlights: vec![Fragment::gene("EGFR"), Fragment::plain(" p.L858R")],
        headers: SNV_HEADERS.iter().map(|h| (*h).to_owned()).collect(),
        rows: (0..rows)
            .map(|i| {
                vec![
                    "EGFR".to_owned(),
                    "missense_variant".to_owned(),
                    format!("p.A{i}V"),
                    "12.35".to_owned(),
                    "c.2573T>G".to_owned(),
                    "p.Leu858Arg".to_owned(),
                ]
            })
            .collect(),
    }
}

pub fn fusion_block() -> TableBlock {
    TableBlock {
        highlights: vec![Fragment::gene("EML4::ALK"), Fragment::plain(" fusion")],
        headers: FUSION_HEADERS.iter().map(|h| (*h).to_owned()).collect(),
        rows: vec![cells(&["EML4-ALK", "chr2:42522656", "chr2:29446394", "152"])],
    }
}

// ---- deck read-back --------------------------------------------------------

pub fn open_deck(bytes: &[u8]) -> Package {
    Package::from_bytes(bytes).expect("generated deck reopens")
}

pub fn slide_texts(pkg: &Package, idx: usize) -> Vec<String> {
    shape::shapes(pkg.slide(idx)).into_iter().map(|s| s.text).collect()
}

pub fn deck_text(pkg: &Package) -> String {
    (0..pkg.slide_count())
        .flat_map(|i| slide_texts(pkg, i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// (slide index, body row count) of every table whose first header matches,
/// in deck order.
pub fn section_tables(pkg: &Package, first_header: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for idx in 0..pkg.slide_count() {
        let Some(tree) = pkg.slide(idx).sp_tree() else {
            continue;
        };
        for el in tree.children_elems().filter(|e| shape::is_table(e)) {
            if shape::table_headers(el).first().is_some_and(|h| h == first_header) {
                out.push((idx, shape::table_body_rows(el)));
            }
        }
    }
    out
}

pub fn find_frame<'a>(pkg: &'a Package, idx: usize, first_header: &str) -> Option<&'a Element> {
    pkg.slide(idx)
        .sp_tree()?
        .children_elems()
        .filter(|e| shape::is_table(e))
        .find(|e| shape::table_headers(e).first().is_some_and(|h| h == first_header))
}

/// Texts of every bold run on a slide, table cells included.
pub fn bold_texts(pkg: &Package, idx: usize) -> Vec<String> {
    let mut out = Vec::new();
    for r in pkg.slide(idx).root.descendants().filter(|e| e.is("r")) {
        let bold = r.child("rPr").and_then(|p| p.attr("b")) == Some("1");
        if bold && let Some(t) = r.child("t") {
            out.push(t.text());
        }
    }
    out
}
