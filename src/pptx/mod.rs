//! PPTX package handling: reading a deck, editing slides in place, inserting
//! and removing slides, and writing the result back out.
//!
//! Only the parts the generator edits are parsed into trees (slides, the
//! presentation part, content types, relationship lists). Everything else,
//! layouts, masters, themes, media, travels through untouched byte for byte.

pub mod shape;
pub mod xml;

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::Error;
use xml::{Element, Node};

pub(crate) const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const PML_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
pub(crate) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_SLIDE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const REL_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
const CT_SLIDE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

#[derive(Clone, Debug)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// One slide part: its parsed XML tree plus its relationship list.
pub struct Slide {
    part: String,
    pub root: Element,
    rels: Vec<Relationship>,
}

impl Slide {
    pub fn part_name(&self) -> &str {
        &self.part
    }

    pub fn sp_tree(&self) -> Option<&Element> {
        self.root.find(&["cSld", "spTree"])
    }

    pub fn sp_tree_mut(&mut self) -> Option<&mut Element> {
        self.root.find_mut(&["cSld", "spTree"])
    }

    pub fn rels(&self) -> &[Relationship] {
        &self.rels
    }

    fn layout_target(&self) -> Option<&str> {
        self.rels
            .iter()
            .find(|r| r.rel_type == REL_SLIDE_LAYOUT)
            .map(|r| r.target.as_str())
    }
}

struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    fn parse(content: &str) -> Result<Self, Error> {
        let doc = roxmltree::Document::parse(content)?;
        let mut defaults = Vec::new();
        let mut overrides = Vec::new();
        for node in doc.root_element().children() {
            match node.tag_name().name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) =
                        (node.attribute("Extension"), node.attribute("ContentType"))
                    {
                        defaults.push((ext.to_string(), ct.to_string()));
                    }
                }
                "Override" => {
                    if let (Some(part), Some(ct)) =
                        (node.attribute("PartName"), node.attribute("ContentType"))
                    {
                        overrides.push((part.to_string(), ct.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(ContentTypes { defaults, overrides })
    }

    fn add_override(&mut self, part_name: String, content_type: &str) {
        if !self.overrides.iter().any(|(p, _)| *p == part_name) {
            self.overrides.push((part_name, content_type.to_string()));
        }
    }

    fn remove_override(&mut self, part_name: &str) {
        self.overrides.retain(|(p, _)| p != part_name);
    }

    fn to_xml(&self) -> Vec<u8> {
        let mut root = Element::new("Types")
            .with_attr("xmlns", "http://schemas.openxmlformats.org/package/2006/content-types");
        for (ext, ct) in &self.defaults {
            root.push(
                Element::new("Default")
                    .with_attr("Extension", ext)
                    .with_attr("ContentType", ct),
            );
        }
        for (part, ct) in &self.overrides {
            root.push(
                Element::new("Override")
                    .with_attr("PartName", part)
                    .with_attr("ContentType", ct),
            );
        }
        xml::serialize(&root)
    }
}

/// An opened deck. Slides are kept in presentation order, matching the
/// `p:sldIdLst` of the presentation part at all times.
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
    pres_part: String,
    pres: Element,
    pres_rels: Vec<Relationship>,
    content_types: ContentTypes,
    slides: Vec<Slide>,
    slide_width: i64,
    slide_height: i64,
}

impl Package {
    pub fn open(path: &Path) -> Result<Package, Error> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
                std::io::Error::new(e.kind(), format!("{}: {}", e, path.display())),
            ),
            _ => Error::Io(e),
        })?;
        let zip = ZipArchive::new(file)
            .map_err(|_| Error::InvalidTemplate("file is not a ZIP archive".into()))?;
        Self::load(zip)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Package, Error> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| Error::InvalidTemplate("data is not a ZIP archive".into()))?;
        Self::load(zip)
    }

    fn load<R: Read + Seek>(mut zip: ZipArchive<R>) -> Result<Package, Error> {
        let mut parts: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.insert(file.name().to_owned(), data);
        }

        let pres_part = root_rels_office_document(&parts)
            .unwrap_or_else(|| "ppt/presentation.xml".to_owned());
        let pres_bytes = parts.remove(&pres_part).ok_or_else(|| {
            Error::InvalidTemplate(format!("missing {pres_part} (is this a PPTX file?)"))
        })?;
        let pres = xml::parse(&pres_bytes)?;

        let sld_sz = pres
            .child("sldSz")
            .ok_or_else(|| Error::InvalidTemplate("presentation has no slide size".into()))?;
        let slide_width = attr_i64(sld_sz, "cx")
            .ok_or_else(|| Error::InvalidTemplate("slide size has no cx".into()))?;
        let slide_height = attr_i64(sld_sz, "cy")
            .ok_or_else(|| Error::InvalidTemplate("slide size has no cy".into()))?;

        let pres_rels_part = rels_path_for(&pres_part);
        let pres_rels = match parts.remove(&pres_rels_part) {
            Some(bytes) => parse_rels(&bytes)?,
            None => {
                return Err(Error::InvalidTemplate(format!("missing {pres_rels_part}")));
            }
        };

        let pres_dir = part_dir(&pres_part);
        let mut slides = Vec::new();
        if let Some(lst) = pres.child("sldIdLst") {
            for sld_id in lst.named("sldId") {
                let Some(rid) = sld_id.attr("r:id") else {
                    continue;
                };
                let Some(rel) = pres_rels.iter().find(|r| r.id == rid) else {
                    return Err(Error::InvalidTemplate(format!("slide id {rid} has no relationship")));
                };
                let part = resolve_target(pres_dir, &rel.target);
                let bytes = parts
                    .remove(&part)
                    .ok_or_else(|| Error::InvalidTemplate(format!("missing slide part {part}")))?;
                let root = xml::parse(&bytes)?;
                let rels = match parts.remove(&rels_path_for(&part)) {
                    Some(bytes) => parse_rels(&bytes)?,
                    None => Vec::new(),
                };
                slides.push(Slide { part, root, rels });
            }
        }
        if slides.is_empty() {
            return Err(Error::InvalidTemplate("deck has no slides".into()));
        }

        let ct_bytes = parts
            .remove("[Content_Types].xml")
            .ok_or_else(|| Error::InvalidTemplate("missing [Content_Types].xml".into()))?;
        let ct_text = String::from_utf8(ct_bytes)
            .map_err(|_| Error::InvalidTemplate("content types part is not utf8".into()))?;
        let content_types = ContentTypes::parse(&ct_text)?;

        log::debug!(
            "opened deck: {} slides, {}x{} EMU, {} passthrough parts",
            slides.len(),
            slide_width,
            slide_height,
            parts.len()
        );

        Ok(Package {
            parts,
            pres_part,
            pres,
            pres_rels,
            content_types,
            slides,
            slide_width,
            slide_height,
        })
    }

    pub fn save(&self) -> Result<Vec<u8>, Error> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(&self.content_types.to_xml())?;

        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        zip.start_file(self.pres_part.as_str(), options)?;
        zip.write_all(&xml::serialize(&self.pres))?;
        zip.start_file(rels_path_for(&self.pres_part), options)?;
        zip.write_all(&rels_xml(&self.pres_rels))?;

        for slide in &self.slides {
            zip.start_file(slide.part.as_str(), options)?;
            zip.write_all(&xml::serialize(&slide.root))?;
            if !slide.rels.is_empty() {
                zip.start_file(rels_path_for(&slide.part), options)?;
                zip.write_all(&rels_xml(&slide.rels))?;
            }
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        std::fs::write(path, self.save()?)?;
        Ok(())
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    pub fn slide(&self, idx: usize) -> &Slide {
        &self.slides[idx]
    }

    pub fn slide_mut(&mut self, idx: usize) -> &mut Slide {
        &mut self.slides[idx]
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn slide_index(&self, part: &str) -> Option<usize> {
        self.slides.iter().position(|s| s.part == part)
    }

    /// Slide dimensions in EMU.
    pub fn slide_size(&self) -> (i64, i64) {
        (self.slide_width, self.slide_height)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// Insert a fresh slide directly after `idx` and return its index.
    ///
    /// The new slide references the master's blank layout when one exists
    /// (falling back to the layout of `decor_from`), and starts out with
    /// clones of the purely decorative shapes of `decor_from`, so page
    /// furniture like logos and rule lines carries over.
    pub fn insert_slide_after(&mut self, idx: usize, decor_from: usize) -> Result<usize, Error> {
        let number = self.next_slide_number();
        let part = format!("ppt/slides/slide{number}.xml");

        let mut root = blank_slide_root();
        let src = &self.slides[decor_from];
        let decor: Vec<Element> = match src.sp_tree() {
            Some(tree) => tree
                .children_elems()
                .filter(|e| shape::is_decorative(e))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let mut rels: Vec<Relationship> = src
            .rels
            .iter()
            .filter(|r| r.rel_type != REL_SLIDE_LAYOUT)
            .cloned()
            .collect();
        let layout_target = self
            .blank_layout_target()
            .or_else(|| src.layout_target().map(str::to_owned))
            .ok_or_else(|| Error::InvalidTemplate("no slide layout to attach".into()))?;
        let layout_rid = next_rid(&rels);
        rels.push(Relationship {
            id: layout_rid,
            rel_type: REL_SLIDE_LAYOUT.to_owned(),
            target: layout_target,
        });
        if let Some(tree) = root.find_mut(&["cSld", "spTree"]) {
            for shape in decor {
                tree.push(shape);
            }
        }

        self.content_types.add_override(format!("/{part}"), CT_SLIDE);

        let rid = next_rid(&self.pres_rels);
        self.pres_rels.push(Relationship {
            id: rid.clone(),
            rel_type: REL_SLIDE.to_owned(),
            target: format!("slides/slide{number}.xml"),
        });

        let sld_id = self.next_sld_id();
        let entry = Element::new("p:sldId")
            .with_attr("id", sld_id.to_string())
            .with_attr("r:id", &rid);
        let lst = self
            .pres
            .child_mut("sldIdLst")
            .ok_or_else(|| Error::InvalidTemplate("presentation has no slide list".into()))?;
        let positions: Vec<usize> = lst
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Node::Element(e) if e.is("sldId") => Some(i),
                _ => None,
            })
            .collect();
        let at = match positions.get(idx + 1) {
            Some(&pos) => pos,
            None => lst.children.len(),
        };
        lst.children.insert(at, Node::Element(entry));

        self.slides.insert(idx + 1, Slide { part, root, rels });
        log::debug!("inserted slide {number} after index {idx}");
        Ok(idx + 1)
    }

    /// Drop the slide at `idx`, unwiring it from the slide list, the
    /// presentation relationships and the content type overrides.
    pub fn remove_slide(&mut self, idx: usize) {
        let slide = self.slides.remove(idx);
        self.content_types.remove_override(&format!("/{}", slide.part));

        let pres_dir = part_dir(&self.pres_part);
        let rid = self
            .pres_rels
            .iter()
            .find(|r| {
                r.rel_type == REL_SLIDE && resolve_target(pres_dir, &r.target) == slide.part
            })
            .map(|r| r.id.clone());
        let Some(rid) = rid else {
            log::warn!("slide {} had no presentation relationship", slide.part);
            return;
        };
        self.pres_rels.retain(|r| r.id != rid);
        if let Some(lst) = self.pres.child_mut("sldIdLst") {
            lst.retain_children(|e| !(e.is("sldId") && e.attr("r:id") == Some(rid.as_str())));
        }
        log::debug!("removed slide {}", slide.part);
    }

    /// Relative target of the master's blank layout, if the deck has one.
    fn blank_layout_target(&self) -> Option<String> {
        for (name, data) in &self.parts {
            if !name.starts_with("ppt/slideLayouts/slideLayout") || !name.ends_with(".xml") {
                continue;
            }
            let Ok(text) = std::str::from_utf8(data) else {
                continue;
            };
            let Ok(doc) = roxmltree::Document::parse(text) else {
                continue;
            };
            let is_blank = doc
                .descendants()
                .find(|n| n.tag_name().name() == "cSld")
                .and_then(|n| n.attribute("name"))
                .is_some_and(|n| n.eq_ignore_ascii_case("blank"));
            if is_blank {
                let file = name.rsplit_once('/').map(|(_, f)| f)?;
                return Some(format!("../slideLayouts/{file}"));
            }
        }
        None
    }

    fn next_slide_number(&self) -> u32 {
        let mut max = 0;
        let names = self
            .slides
            .iter()
            .map(|s| s.part.as_str())
            .chain(self.parts.keys().map(String::as_str));
        for name in names {
            if let Some(n) = name
                .strip_prefix("ppt/slides/slide")
                .and_then(|rest| rest.strip_suffix(".xml"))
                .and_then(|digits| digits.parse::<u32>().ok())
            {
                max = max.max(n);
            }
        }
        max + 1
    }

    fn next_sld_id(&self) -> u64 {
        let mut max = 255;
        if let Some(lst) = self.pres.child("sldIdLst") {
            for sld_id in lst.named("sldId") {
                if let Some(id) = sld_id.attr("id").and_then(|v| v.parse::<u64>().ok()) {
                    max = max.max(id);
                }
            }
        }
        max + 1
    }
}

fn attr_i64(el: &Element, name: &str) -> Option<i64> {
    el.attr(name)?.parse().ok()
}

fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn part_dir(part: &str) -> &str {
    match part.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_owned();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn root_rels_office_document(parts: &BTreeMap<String, Vec<u8>>) -> Option<String> {
    let bytes = parts.get("_rels/.rels")?;
    let text = std::str::from_utf8(bytes).ok()?;
    let doc = roxmltree::Document::parse(text).ok()?;
    for node in doc.root_element().children() {
        if node.tag_name().name() == "Relationship"
            && node.attribute("Type").is_some_and(|t| t.ends_with("/officeDocument"))
            && let Some(target) = node.attribute("Target")
        {
            return Some(target.trim_start_matches('/').to_owned());
        }
    }
    None
}

fn parse_rels(bytes: &[u8]) -> Result<Vec<Relationship>, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Xml("relationship part is not utf8".into()))?;
    let doc = roxmltree::Document::parse(text)?;
    let mut rels = Vec::new();
    for node in doc.root_element().children() {
        if node.tag_name().name() == "Relationship"
            && let (Some(id), Some(rel_type), Some(target)) = (
                node.attribute("Id"),
                node.attribute("Type"),
                node.attribute("Target"),
            )
        {
            rels.push(Relationship {
                id: id.to_string(),
                rel_type: rel_type.to_string(),
                target: target.to_string(),
            });
        }
    }
    Ok(rels)
}

fn rels_xml(rels: &[Relationship]) -> Vec<u8> {
    let mut root = Element::new("Relationships").with_attr("xmlns", PKG_REL_NS);
    for r in rels {
        root.push(
            Element::new("Relationship")
                .with_attr("Id", &r.id)
                .with_attr("Type", &r.rel_type)
                .with_attr("Target", &r.target),
        );
    }
    xml::serialize(&root)
}

fn next_rid(rels: &[Relationship]) -> String {
    let mut max = 0;
    for r in rels {
        if let Some(n) = r.id.strip_prefix("rId").and_then(|d| d.parse::<u32>().ok()) {
            max = max.max(n);
        }
    }
    format!("rId{}", max + 1)
}

fn blank_slide_root() -> Element {
    Element::new("p:sld")
        .with_attr("xmlns:a", DML_NS)
        .with_attr("xmlns:r", REL_NS)
        .with_attr("xmlns:p", PML_NS)
        .with_child(
            Element::new("p:cSld").with_child(
                Element::new("p:spTree")
                    .with_child(
                        Element::new("p:nvGrpSpPr")
                            .with_child(
                                Element::new("p:cNvPr")
                                    .with_attr("id", "1")
                                    .with_attr("name", ""),
                            )
                            .with_child(Element::new("p:cNvGrpSpPr"))
                            .with_child(Element::new("p:nvPr")),
                    )
                    .with_child(
                        Element::new("p:grpSpPr").with_child(
                            Element::new("a:xfrm")
                                .with_child(zero_pt("a:off"))
                                .with_child(zero_ext("a:ext"))
                                .with_child(zero_pt("a:chOff"))
                                .with_child(zero_ext("a:chExt")),
                        ),
                    ),
            ),
        )
        .with_child(Element::new("p:clrMapOvr").with_child(Element::new("a:masterClrMapping")))
}

fn zero_pt(name: &str) -> Element {
    Element::new(name).with_attr("x", "0").with_attr("y", "0")
}

fn zero_ext(name: &str) -> Element {
    Element::new(name).with_attr("cx", "0").with_attr("cy", "0")
}
