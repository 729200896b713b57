//! Shape-level edits on slide trees: reading shape inventory, adding text
//! boxes, resizing and filling tables, and building bordered tables from
//! scratch when no prototype is available.
//!
//! All geometry is EMU (914400 per inch, 360000 per cm).

use super::Slide;
use super::xml::{Element, Node};

const TABLE_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/table";

/// Border line width used on generated table cells, in EMU (1 pt).
const CELL_BORDER_W: &str = "12700";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Text,
    Table,
    Picture,
    Connector,
    Group,
    Other,
}

/// Snapshot of one top-level shape, enough for classification and layout
/// decisions without holding a borrow into the tree.
#[derive(Clone, Debug)]
pub struct ShapeInfo {
    pub id: u64,
    pub kind: ShapeKind,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub text: String,
}

impl ShapeInfo {
    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }
}

/// One styled run of text destined for a paragraph.
#[derive(Clone, Debug, Default)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    /// RRGGBB, defaults to the theme colour when absent.
    pub color: Option<String>,
    /// Hundredths of a point, e.g. 1000 for 10 pt.
    pub size: Option<i32>,
    pub font: Option<String>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        TextRun { text: text.into(), ..Default::default() }
    }
}

/// Character formatting applied when writing a table cell.
#[derive(Clone, Debug, Default)]
pub struct CellStyle {
    pub bold: bool,
    pub color: Option<String>,
    pub size: Option<i32>,
    pub font: Option<String>,
}

pub fn shapes(slide: &Slide) -> Vec<ShapeInfo> {
    let Some(tree) = slide.sp_tree() else {
        return Vec::new();
    };
    tree.children_elems().filter_map(shape_info).collect()
}

fn shape_info(el: &Element) -> Option<ShapeInfo> {
    let kind = match el.local_name() {
        "sp" => ShapeKind::Text,
        "graphicFrame" => {
            if table_of(el).is_some() {
                ShapeKind::Table
            } else {
                ShapeKind::Other
            }
        }
        "pic" => ShapeKind::Picture,
        "cxnSp" => ShapeKind::Connector,
        "grpSp" => ShapeKind::Group,
        _ => return None,
    };
    let id = shape_id(el)?;
    let name = el
        .descendants()
        .find(|e| e.is("cNvPr"))
        .and_then(|e| e.attr("name"))
        .unwrap_or("")
        .to_owned();
    let xfrm = el.descendants().find(|e| e.is("xfrm"));
    let (x, y) = match xfrm.and_then(|f| f.child("off")) {
        Some(off) => (attr_i64(off, "x"), attr_i64(off, "y")),
        None => (0, 0),
    };
    let (width, height) = match xfrm.and_then(|f| f.child("ext")) {
        Some(ext) => (attr_i64(ext, "cx"), attr_i64(ext, "cy")),
        None => (0, 0),
    };
    Some(ShapeInfo { id, kind, name, x, y, width, height, text: shape_text(el) })
}

fn attr_i64(el: &Element, name: &str) -> i64 {
    el.attr(name).and_then(|v| v.parse().ok()).unwrap_or(0)
}

pub fn shape_id(el: &Element) -> Option<u64> {
    el.descendants()
        .find(|e| e.is("cNvPr"))
        .and_then(|e| e.attr("id"))
        .and_then(|v| v.parse().ok())
}

/// All text in a shape, paragraphs joined with newlines.
pub fn shape_text(el: &Element) -> String {
    let mut out = String::new();
    let mut first = true;
    for p in el.descendants().filter(|e| e.is("p") && e.name.starts_with("a:")) {
        if !first {
            out.push('\n');
        }
        first = false;
        for t in p.descendants().filter(|e| e.is("t")) {
            out.push_str(&t.text());
        }
    }
    out
}

/// Shapes worth cloning onto a continuation slide: pictures, connectors and
/// text-free boxes (rule lines, colour bars). Tables and shapes carrying
/// text stay behind.
pub fn is_decorative(el: &Element) -> bool {
    match el.local_name() {
        "pic" | "cxnSp" => true,
        "sp" => shape_text(el).trim().is_empty(),
        "grpSp" => {
            shape_text(el).trim().is_empty() && !el.descendants().any(|e| e.is("tbl"))
        }
        _ => false,
    }
}

pub fn next_shape_id(slide: &Slide) -> u64 {
    let mut max = 1;
    if let Some(tree) = slide.sp_tree() {
        for e in tree.descendants().filter(|e| e.is("cNvPr")) {
            if let Some(id) = e.attr("id").and_then(|v| v.parse().ok()) {
                max = std::cmp::max(max, id);
            }
        }
    }
    max + 1
}

pub fn shape_by_id(slide: &Slide, id: u64) -> Option<&Element> {
    slide.sp_tree()?.children_elems().find(|e| shape_id(e) == Some(id))
}

pub fn shape_by_id_mut(slide: &mut Slide, id: u64) -> Option<&mut Element> {
    slide
        .sp_tree_mut()?
        .children_elems_mut()
        .find(|e| shape_id(e) == Some(id))
}

pub fn remove_shape(slide: &mut Slide, id: u64) -> bool {
    let Some(tree) = slide.sp_tree_mut() else {
        return false;
    };
    let before = tree.children.len();
    tree.retain_children(|e| shape_id(e) != Some(id));
    tree.children.len() != before
}

/// Detach a top-level shape from the slide, returning the subtree.
pub fn take_shape(slide: &mut Slide, id: u64) -> Option<Element> {
    let tree = slide.sp_tree_mut()?;
    let pos = tree.children.iter().position(|n| match n {
        Node::Element(e) => shape_id(e) == Some(id),
        Node::Text(_) => false,
    })?;
    match tree.children.remove(pos) {
        Node::Element(e) => Some(e),
        Node::Text(_) => None,
    }
}

/// Insert a previously captured shape subtree, reassigning its id so it
/// cannot clash with shapes already on the slide.
pub fn add_shape(slide: &mut Slide, mut el: Element) -> u64 {
    let id = next_shape_id(slide);
    set_shape_id(&mut el, id);
    if let Some(tree) = slide.sp_tree_mut() {
        tree.push(el);
    } else {
        log::warn!("slide {} has no shape tree, dropping shape", slide.part_name());
    }
    id
}

fn set_shape_id(el: &mut Element, id: u64) {
    let path: &[&str] = match el.local_name() {
        "sp" => &["nvSpPr", "cNvPr"],
        "graphicFrame" => &["nvGraphicFramePr", "cNvPr"],
        "pic" => &["nvPicPr", "cNvPr"],
        "cxnSp" => &["nvCxnSpPr", "cNvPr"],
        "grpSp" => &["nvGrpSpPr", "cNvPr"],
        _ => return,
    };
    if let Some(cnv) = el.find_mut(path) {
        cnv.set_attr("id", id.to_string());
    }
}

pub fn set_position(el: &mut Element, x: i64, y: i64) {
    if let Some(off) = el.find_mut(&["xfrm", "off"]) {
        off.set_attr("x", x.to_string());
        off.set_attr("y", y.to_string());
        return;
    }
    if let Some(off) = el.find_mut(&["spPr", "xfrm", "off"]) {
        off.set_attr("x", x.to_string());
        off.set_attr("y", y.to_string());
    }
}

/// Add a text box shape; returns its shape id. `paras` is one run list per
/// paragraph. The body autofits so a slightly underestimated box still
/// shows all of its text.
pub fn add_text_box(
    slide: &mut Slide,
    x: i64,
    y: i64,
    cx: i64,
    cy: i64,
    paras: &[Vec<TextRun>],
    bordered: bool,
) -> u64 {
    let id = next_shape_id(slide);

    let mut sp_pr = Element::new("p:spPr")
        .with_child(xfrm("a:xfrm", x, y, cx, cy))
        .with_child(
            Element::new("a:prstGeom")
                .with_attr("prst", "rect")
                .with_child(Element::new("a:avLst")),
        )
        .with_child(Element::new("a:noFill"));
    if bordered {
        sp_pr.push(
            Element::new("a:ln")
                .with_attr("w", CELL_BORDER_W)
                .with_child(solid_fill("000000")),
        );
    }

    let mut body = Element::new("p:txBody")
        .with_child(
            Element::new("a:bodyPr")
                .with_attr("wrap", "square")
                .with_child(Element::new("a:normAutofit")),
        )
        .with_child(Element::new("a:lstStyle"));
    for para in paras {
        body.push(paragraph(para));
    }

    let sp = Element::new("p:sp")
        .with_child(
            Element::new("p:nvSpPr")
                .with_child(
                    Element::new("p:cNvPr")
                        .with_attr("id", id.to_string())
                        .with_attr("name", format!("TextBox {id}")),
                )
                .with_child(Element::new("p:cNvSpPr").with_attr("txBox", "1"))
                .with_child(Element::new("p:nvPr")),
        )
        .with_child(sp_pr)
        .with_child(body);

    if let Some(tree) = slide.sp_tree_mut() {
        tree.push(sp);
    } else {
        log::warn!("slide {} has no shape tree, dropping text box", slide.part_name());
    }
    id
}

fn paragraph(runs: &[TextRun]) -> Element {
    let mut p = Element::new("a:p");
    for run in runs {
        let mut rpr = Element::new("a:rPr").with_attr("lang", "en-US").with_attr("dirty", "0");
        if let Some(size) = run.size {
            rpr.set_attr("sz", size.to_string());
        }
        if run.bold {
            rpr.set_attr("b", "1");
        }
        if run.italic {
            rpr.set_attr("i", "1");
        }
        if let Some(color) = &run.color {
            rpr.push(solid_fill(color));
        }
        if let Some(font) = &run.font {
            rpr.push(Element::new("a:latin").with_attr("typeface", font));
        }
        let mut t = Element::new("a:t").with_text(&run.text);
        if run.text.trim() != run.text {
            t.set_attr("xml:space", "preserve");
        }
        p.push(Element::new("a:r").with_child(rpr).with_child(t));
    }
    p
}

fn xfrm(tag: &str, x: i64, y: i64, cx: i64, cy: i64) -> Element {
    Element::new(tag)
        .with_child(
            Element::new("a:off")
                .with_attr("x", x.to_string())
                .with_attr("y", y.to_string()),
        )
        .with_child(
            Element::new("a:ext")
                .with_attr("cx", cx.to_string())
                .with_attr("cy", cy.to_string()),
        )
}

fn solid_fill(rgb: &str) -> Element {
    Element::new("a:solidFill").with_child(Element::new("a:srgbClr").with_attr("val", rgb))
}

// ---- tables ----------------------------------------------------------------

pub fn table_of(frame: &Element) -> Option<&Element> {
    frame.find(&["graphic", "graphicData", "tbl"])
}

fn table_of_mut(frame: &mut Element) -> Option<&mut Element> {
    frame.find_mut(&["graphic", "graphicData", "tbl"])
}

pub fn is_table(el: &Element) -> bool {
    el.is("graphicFrame") && table_of(el).is_some()
}

pub fn cell_text(tc: &Element) -> String {
    shape_text(tc)
}

/// Texts of the first (header) row.
pub fn table_headers(frame: &Element) -> Vec<String> {
    let Some(tbl) = table_of(frame) else {
        return Vec::new();
    };
    let Some(first) = tbl.named("tr").next() else {
        return Vec::new();
    };
    first.named("tc").map(cell_text).collect()
}

pub fn table_col_count(frame: &Element) -> usize {
    table_of(frame)
        .and_then(|t| t.child("tblGrid"))
        .map(|g| g.named("gridCol").count())
        .unwrap_or(0)
}

/// Number of rows below the header row.
pub fn table_body_rows(frame: &Element) -> usize {
    table_of(frame).map(|t| t.named("tr").count().saturating_sub(1)).unwrap_or(0)
}

/// Grow or shrink the body to exactly `rows` rows. Grown rows are cloned
/// from the last existing row with their text cleared, so cell borders and
/// fills carry the authored styling.
pub fn set_table_body_rows(frame: &mut Element, rows: usize) {
    let Some(tbl) = table_of_mut(frame) else {
        return;
    };
    let positions: Vec<usize> = tbl
        .children
        .iter()
        .enumerate()
        .filter_map(|(i, n)| match n {
            Node::Element(e) if e.is("tr") => Some(i),
            _ => None,
        })
        .collect();
    let current = positions.len().saturating_sub(1);
    if current == rows {
        return;
    }
    if current > rows {
        for &idx in positions[rows + 1..].iter().rev() {
            tbl.children.remove(idx);
        }
        return;
    }
    let Some(&proto_idx) = positions.last() else {
        return;
    };
    let Node::Element(proto) = &tbl.children[proto_idx] else {
        return;
    };
    if positions.len() == 1 {
        log::warn!("table has no body row to clone, new rows copy header styling");
    }
    let mut blank = proto.clone();
    clear_row(&mut blank);
    for _ in current..rows {
        tbl.children.push(Node::Element(blank.clone()));
    }
}

fn clear_row(tr: &mut Element) {
    for tc in tr.named_mut("tc") {
        clear_cell(tc);
    }
}

pub fn clear_cell(tc: &mut Element) {
    if let Some(body) = tc.child_mut("txBody") {
        body.retain_children(|e| !e.is("p"));
        body.push(Element::new("a:p"));
    }
}

pub fn set_cell_text(tc: &mut Element, text: &str, style: &CellStyle) {
    let run = TextRun {
        text: text.to_owned(),
        bold: style.bold,
        color: style.color.clone(),
        size: style.size,
        font: style.font.clone(),
        ..Default::default()
    };
    let para = paragraph(&[run]);
    match tc.child_mut("txBody") {
        Some(body) => {
            body.retain_children(|e| !e.is("p"));
            body.push(para);
        }
        None => {
            let body = Element::new("a:txBody")
                .with_child(Element::new("a:bodyPr"))
                .with_child(Element::new("a:lstStyle"))
                .with_child(para);
            tc.children.insert(0, Node::Element(body));
        }
    }
}

/// Resize the body to fit `rows` and write every cell. Cells beyond a row's
/// data are cleared.
pub fn fill_table_body(frame: &mut Element, rows: &[Vec<String>], style: &CellStyle) {
    set_table_body_rows(frame, rows.len());
    let Some(tbl) = table_of_mut(frame) else {
        return;
    };
    for (r, tr) in tbl.named_mut("tr").skip(1).enumerate() {
        for (c, tc) in tr.named_mut("tc").enumerate() {
            match rows.get(r).and_then(|row| row.get(c)) {
                Some(text) => set_cell_text(tc, text, style),
                None => clear_cell(tc),
            }
        }
    }
}

/// Label form used for matching: trimmed, lowercased, trailing colon dropped.
pub(crate) fn norm_label(s: &str) -> String {
    s.trim().trim_end_matches(':').trim().to_lowercase()
}

/// Scan a table for cells whose text matches one of the pair labels and
/// write the paired value into the cell to its right. Labels match after
/// trimming, case folding and dropping a trailing colon. Marks each hit in
/// `matched` so the caller can report labels that never found a home.
pub fn fill_next_to_labels(
    frame: &mut Element,
    pairs: &[(String, String)],
    matched: &mut [bool],
    style: &CellStyle,
) {
    let Some(tbl) = table_of_mut(frame) else {
        return;
    };
    for tr in tbl.named_mut("tr") {
        let texts: Vec<String> = tr.named("tc").map(cell_text).collect();
        for c in 0..texts.len().saturating_sub(1) {
            let label = norm_label(&texts[c]);
            if label.is_empty() {
                continue;
            }
            let Some(i) = pairs.iter().position(|(l, _)| norm_label(l) == label) else {
                continue;
            };
            let value = pairs[i].1.clone();
            if let Some(tc) = tr.named_mut("tc").nth(c + 1) {
                set_cell_text(tc, &value, style);
                matched[i] = true;
            }
        }
    }
}

/// Layout of a table built from scratch, used when no template prototype
/// matched a section.
pub struct TableSpec<'a> {
    pub headers: &'a [String],
    pub col_widths: &'a [i64],
    pub row_height: i64,
    /// RRGGBB fill behind the header row.
    pub header_fill: &'a str,
    pub border_color: &'a str,
    pub header_style: CellStyle,
}

/// Build a plain bordered table and add it to the slide; returns its id.
pub fn add_built_table(slide: &mut Slide, x: i64, y: i64, spec: &TableSpec, body_rows: usize) -> u64 {
    let id = next_shape_id(slide);
    let frame = build_table(id, x, y, spec, body_rows);
    if let Some(tree) = slide.sp_tree_mut() {
        tree.push(frame);
    } else {
        log::warn!("slide {} has no shape tree, dropping table", slide.part_name());
    }
    id
}

fn build_table(id: u64, x: i64, y: i64, spec: &TableSpec, body_rows: usize) -> Element {
    let cols = spec.headers.len().max(1);
    let mut grid = Element::new("a:tblGrid");
    for c in 0..cols {
        let w = spec.col_widths.get(c).copied().unwrap_or(914400);
        grid.push(Element::new("a:gridCol").with_attr("w", w.to_string()));
    }
    let total_w: i64 = (0..cols)
        .map(|c| spec.col_widths.get(c).copied().unwrap_or(914400))
        .sum();

    let mut tbl = Element::new("a:tbl")
        .with_attr("xmlns:a", super::DML_NS)
        .with_child(Element::new("a:tblPr").with_attr("firstRow", "1"))
        .with_child(grid);

    let mut header = Element::new("a:tr").with_attr("h", spec.row_height.to_string());
    for text in spec.headers {
        let mut tc = bordered_cell(spec.border_color, Some(spec.header_fill));
        set_cell_text(&mut tc, text, &spec.header_style);
        header.push(tc);
    }
    tbl.push(header);

    for _ in 0..body_rows {
        let mut tr = Element::new("a:tr").with_attr("h", spec.row_height.to_string());
        for _ in 0..cols {
            tr.push(bordered_cell(spec.border_color, None));
        }
        tbl.push(tr);
    }

    let total_h = spec.row_height * (body_rows as i64 + 1);
    Element::new("p:graphicFrame")
        .with_child(
            Element::new("p:nvGraphicFramePr")
                .with_child(
                    Element::new("p:cNvPr")
                        .with_attr("id", id.to_string())
                        .with_attr("name", format!("Table {id}")),
                )
                .with_child(
                    Element::new("p:cNvGraphicFramePr")
                        .with_child(Element::new("a:graphicFrameLocks").with_attr("noGrp", "1")),
                )
                .with_child(Element::new("p:nvPr")),
        )
        .with_child(xfrm("p:xfrm", x, y, total_w, total_h))
        .with_child(
            Element::new("a:graphic").with_child(
                Element::new("a:graphicData")
                    .with_attr("uri", TABLE_URI)
                    .with_child(tbl),
            ),
        )
}

fn bordered_cell(border_color: &str, fill: Option<&str>) -> Element {
    let body = Element::new("a:txBody")
        .with_child(Element::new("a:bodyPr"))
        .with_child(Element::new("a:lstStyle"))
        .with_child(Element::new("a:p"));
    let mut tc_pr = Element::new("a:tcPr");
    for side in ["a:lnL", "a:lnR", "a:lnT", "a:lnB"] {
        tc_pr.push(
            Element::new(side)
                .with_attr("w", CELL_BORDER_W)
                .with_attr("cap", "flat")
                .with_attr("cmpd", "sng")
                .with_attr("algn", "ctr")
                .with_child(solid_fill(border_color))
                .with_child(Element::new("a:prstDash").with_attr("val", "solid")),
        );
    }
    if let Some(rgb) = fill {
        tc_pr.push(solid_fill(rgb));
    }
    Element::new("a:tc").with_child(body).with_child(tc_pr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pptx::xml;

    fn sample_frame() -> Element {
        let spec = TableSpec {
            headers: &["Gene".into(), "VAF".into()],
            col_widths: &[1000, 2000],
            row_height: 288000,
            header_fill: "C8C8C8",
            border_color: "000000",
            header_style: CellStyle { bold: true, ..Default::default() },
        };
        build_table(5, 100, 200, &spec, 2)
    }

    #[test]
    fn built_table_reports_shape_and_grid() {
        let frame = sample_frame();
        assert!(is_table(&frame));
        assert_eq!(shape_id(&frame), Some(5));
        assert_eq!(table_col_count(&frame), 2);
        assert_eq!(table_body_rows(&frame), 2);
        assert_eq!(table_headers(&frame), ["Gene", "VAF"]);
    }

    #[test]
    fn grow_clones_last_row_cleared() {
        let mut frame = sample_frame();
        fill_table_body(
            &mut frame,
            &[vec!["EGFR".into(), "12.50".into()]],
            &CellStyle::default(),
        );
        assert_eq!(table_body_rows(&frame), 1);

        set_table_body_rows(&mut frame, 3);
        assert_eq!(table_body_rows(&frame), 3);
        let tbl = table_of(&frame).unwrap();
        let last = tbl.named("tr").last().unwrap();
        assert!(last.named("tc").all(|tc| cell_text(tc).is_empty()));
        // styling (borders) survived the clone
        assert!(last.descendants().any(|e| e.is("lnL")));
    }

    #[test]
    fn fill_clears_cells_beyond_row_data() {
        let mut frame = sample_frame();
        fill_table_body(&mut frame, &[vec!["EGFR".into()]], &CellStyle::default());
        let tbl = table_of(&frame).unwrap();
        let row = tbl.named("tr").nth(1).unwrap();
        let texts: Vec<String> = row.named("tc").map(cell_text).collect();
        assert_eq!(texts, ["EGFR", ""]);
    }

    #[test]
    fn text_box_round_trips_runs() {
        let src = xml::serialize(&Element::new("p:sld").with_child(Element::new("p:cSld").with_child(Element::new("p:spTree").with_child(
            Element::new("p:nvGrpSpPr")
                .with_child(Element::new("p:cNvPr").with_attr("id", "1").with_attr("name", ""))
                .with_child(Element::new("p:cNvGrpSpPr"))
                .with_child(Element::new("p:nvPr")),
        ))));
        let root = xml::parse(&src).unwrap();
        let mut slide = Slide { part: "ppt/slides/slide1.xml".into(), root, rels: Vec::new() };

        let id = add_text_box(
            &mut slide,
            10,
            20,
            300,
            60,
            &[vec![
                TextRun { text: "- SNVs & Indels: ".into(), bold: true, ..Default::default() },
                TextRun { text: "EGFR".into(), italic: true, ..Default::default() },
            ]],
            false,
        );
        assert_eq!(id, 2);
        let el = shape_by_id(&slide, id).unwrap();
        assert_eq!(shape_text(el), "- SNVs & Indels: EGFR");
        let info = shapes(&slide).into_iter().find(|s| s.id == id).unwrap();
        assert_eq!((info.x, info.y), (10, 20));
        assert_eq!(info.kind, ShapeKind::Text);
    }

    #[test]
    fn decorative_excludes_text_and_tables() {
        let pic = Element::new("p:pic");
        assert!(is_decorative(&pic));
        assert!(!is_decorative(&sample_frame()));
        let sp = Element::new("p:sp").with_child(Element::new("p:txBody").with_child(
            Element::new("a:p").with_child(Element::new("a:r").with_child(Element::new("a:t").with_text("hello"))),
        ));
        assert!(!is_decorative(&sp));
    }
}
