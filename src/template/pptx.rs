//! PPTX package: slides, shapes, text frames and tables.
//!
//! A `.pptx` file is a ZIP archive of XML parts. Slide order comes from the
//! `p:sldIdLst` in `ppt/presentation.xml`, resolved through
//! `ppt/_rels/presentation.xml.rels`. Slides are parsed into [`XmlDocument`]s
//! and edited in place; every other part is carried through byte-for-byte.
//!
//! Element names are matched on their conventional qualified form (`p:sp`,
//! `a:t`, ...) which is what PowerPoint, LibreOffice and Google Slides emit.

use super::xml::{Element, Node, XmlDocument};
use crate::error::Sheet2PdfError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// An opaque package part carried through unchanged.
struct Part {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
}

/// One slide: its part name and parsed XML.
pub struct Slide {
    part_name: String,
    xml: XmlDocument,
}

/// A loaded presentation, mutable in place.
pub struct Presentation {
    path: PathBuf,
    parts: Vec<Part>,
    slides: Vec<Slide>,
}

impl Presentation {
    /// Load a presentation from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Sheet2PdfError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Sheet2PdfError::TemplateNotFound {
                path: path.to_path_buf(),
            });
        }
        let invalid = |detail: String| Sheet2PdfError::InvalidTemplate {
            path: path.to_path_buf(),
            detail,
        };

        let file = File::open(path).map_err(|e| Sheet2PdfError::io(path, e))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| invalid(format!("not a ZIP package: {e}")))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| invalid(format!("unreadable entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| invalid(format!("unreadable entry {}: {e}", entry.name())))?;
            parts.push(Part {
                name: entry.name().to_string(),
                data,
                compression: entry.compression(),
            });
        }

        let slide_names = slide_part_names(&parts).map_err(&invalid)?;
        let mut slides = Vec::with_capacity(slide_names.len());
        for name in slide_names {
            let xml = part_xml(&parts, &name).map_err(&invalid)?;
            slides.push(Slide {
                part_name: name,
                xml,
            });
        }
        debug!("Loaded {} with {} slides", path.display(), slides.len());

        Ok(Self {
            path: path.to_path_buf(),
            parts,
            slides,
        })
    }

    /// Slides in presentation order.
    pub fn pages(&self) -> &[Slide] {
        &self.slides
    }

    /// Slides in presentation order, for editing one page at a time.
    pub fn pages_mut(&mut self) -> &mut [Slide] {
        &mut self.slides
    }

    /// Every content container of every slide, page order then shape order.
    pub fn containers_mut(&mut self) -> Vec<Container<'_>> {
        let mut out = Vec::new();
        for slide in self.pages_mut() {
            out.extend(slide.containers_mut());
        }
        out
    }

    /// Write the package (with edited slides) to `dest`.
    pub fn save(&self, dest: impl AsRef<Path>) -> Result<(), Sheet2PdfError> {
        let dest = dest.as_ref();
        let invalid = |detail: String| Sheet2PdfError::InvalidTemplate {
            path: self.path.clone(),
            detail,
        };

        let edited: HashMap<&str, &Slide> = self
            .slides
            .iter()
            .map(|s| (s.part_name.as_str(), s))
            .collect();

        let file = File::create(dest).map_err(|e| Sheet2PdfError::io(dest, e))?;
        let mut writer = ZipWriter::new(file);

        for part in &self.parts {
            let options = SimpleFileOptions::default().compression_method(part.compression);
            writer
                .start_file(part.name.as_str(), options)
                .map_err(|e| invalid(format!("cannot write {}: {e}", part.name)))?;
            let bytes = match edited.get(part.name.as_str()) {
                Some(slide) => slide
                    .xml
                    .to_bytes()
                    .map_err(|e| invalid(format!("cannot serialise {}: {e}", part.name)))?,
                None => part.data.clone(),
            };
            writer
                .write_all(&bytes)
                .map_err(|e| Sheet2PdfError::io(dest, e))?;
        }

        writer
            .finish()
            .map_err(|e| invalid(format!("cannot finish {}: {e}", dest.display())))?;
        Ok(())
    }
}

impl Slide {
    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    /// Text and table containers on this slide, in document order.
    ///
    /// Shapes inside group shapes are included where they appear.
    pub fn containers_mut(&mut self) -> Vec<Container<'_>> {
        let mut out = Vec::new();
        if let Some(tree) = self.xml.root_mut().find_path_mut(&["p:cSld", "p:spTree"]) {
            collect_containers(tree, &mut out);
        }
        out
    }
}

#[derive(Clone, Copy)]
enum ShapeKind {
    Shape,
    GraphicFrame,
    Group,
    Other,
}

impl ShapeKind {
    fn of(name: &str) -> Self {
        match name {
            "p:sp" => Self::Shape,
            "p:graphicFrame" => Self::GraphicFrame,
            "p:grpSp" => Self::Group,
            _ => Self::Other,
        }
    }
}

fn collect_containers<'a>(parent: &'a mut Element, out: &mut Vec<Container<'a>>) {
    for child in parent.child_elements_mut() {
        match ShapeKind::of(child.name()) {
            ShapeKind::Shape => {
                if let Some(body) = child.find_mut("p:txBody") {
                    out.push(Container::Text(TextFrame { body }));
                }
            }
            ShapeKind::GraphicFrame => {
                if let Some(table) = child.find_path_mut(&["a:graphic", "a:graphicData", "a:tbl"]) {
                    out.push(Container::Table(TableFrame { table }));
                }
            }
            ShapeKind::Group => collect_containers(child, out),
            ShapeKind::Other => {}
        }
    }
}

/// A content container that can hold placeholder text.
pub enum Container<'a> {
    Text(TextFrame<'a>),
    Table(TableFrame<'a>),
}

/// The text body of a shape: paragraphs of runs.
pub struct TextFrame<'a> {
    body: &'a mut Element,
}

impl TextFrame<'_> {
    /// Paragraph texts joined with `\n`; line breaks inside a paragraph are `\v`.
    pub fn text(&self) -> String {
        body_text(self.body)
    }

    /// The runs of every paragraph, in order.
    pub fn runs(&mut self) -> Vec<Run<'_>> {
        let mut out = Vec::new();
        for paragraph in self.body.child_elements_mut().filter(|e| e.name() == "a:p") {
            for run in paragraph.child_elements_mut().filter(|e| e.name() == "a:r") {
                if let Some(t) = run.find_mut("a:t") {
                    out.push(Run { t });
                }
            }
        }
        out
    }
}

/// A run: the atomic, uniformly styled text fragment.
pub struct Run<'a> {
    t: &'a mut Element,
}

impl Run<'_> {
    pub fn text(&self) -> String {
        self.t.text()
    }

    pub fn set_text(&mut self, text: &str) {
        self.t.set_text(text);
    }
}

/// A table: rows of cells.
pub struct TableFrame<'a> {
    table: &'a mut Element,
}

impl TableFrame<'_> {
    /// Cells in row-major order.
    pub fn cells(&mut self) -> Vec<Cell<'_>> {
        let mut out = Vec::new();
        for row in self.table.child_elements_mut().filter(|e| e.name() == "a:tr") {
            for tc in row.child_elements_mut().filter(|e| e.name() == "a:tc") {
                out.push(Cell { tc });
            }
        }
        out
    }
}

/// One table cell.
pub struct Cell<'a> {
    tc: &'a mut Element,
}

impl Cell<'_> {
    pub fn text(&self) -> String {
        self.tc.find("a:txBody").map(body_text).unwrap_or_default()
    }

    /// Replace the cell's whole text.
    ///
    /// Paragraphs are rebuilt, one per `\n`, with `\v` becoming a line break.
    /// New runs reuse the run properties of the cell's first run so the cell
    /// keeps its font.
    pub fn set_text(&mut self, text: &str) {
        if self.tc.find("a:txBody").is_none() {
            let mut body = Element::new("a:txBody");
            body.push(Element::new("a:bodyPr"));
            body.push(Element::new("a:lstStyle"));
            self.tc.children.insert(0, Node::Element(body));
        }
        let Some(body) = self.tc.find_mut("a:txBody") else {
            return;
        };

        let run_props = body
            .child_elements()
            .filter(|e| e.name() == "a:p")
            .flat_map(|p| p.child_elements())
            .filter(|e| e.name() == "a:r")
            .find_map(|r| r.find("a:rPr"))
            .cloned();

        body.retain_elements(|e| e.name() != "a:p");
        for line in text.split('\n') {
            let mut paragraph = Element::new("a:p");
            for (i, segment) in line.split('\u{b}').enumerate() {
                if i > 0 {
                    paragraph.push(Element::new("a:br"));
                }
                if segment.is_empty() {
                    continue;
                }
                let mut run = Element::new("a:r");
                if let Some(props) = &run_props {
                    run.push(props.clone());
                }
                run.push(Element::with_text("a:t", segment));
                paragraph.push(run);
            }
            body.push(paragraph);
        }
    }
}

fn body_text(body: &Element) -> String {
    body.child_elements()
        .filter(|e| e.name() == "a:p")
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(paragraph: &Element) -> String {
    let mut out = String::new();
    for child in paragraph.child_elements() {
        match child.name() {
            "a:r" | "a:fld" => {
                if let Some(t) = child.find("a:t") {
                    out.push_str(&t.text());
                }
            }
            "a:br" => out.push('\u{b}'),
            _ => {}
        }
    }
    out
}

// ── Package structure ────────────────────────────────────────────────────

fn part_xml(parts: &[Part], name: &str) -> Result<XmlDocument, String> {
    let part = parts
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| format!("missing part {name}"))?;
    let text = std::str::from_utf8(&part.data).map_err(|e| format!("{name} is not UTF-8: {e}"))?;
    XmlDocument::parse(text).map_err(|e| format!("XML error in {name}: {e}"))
}

/// Slide part names in presentation order.
fn slide_part_names(parts: &[Part]) -> Result<Vec<String>, String> {
    let presentation = part_xml(parts, PRESENTATION_PART)?;
    let rels = part_xml(parts, PRESENTATION_RELS)?;

    let targets: HashMap<String, String> = rels
        .root()
        .child_elements()
        .filter(|e| e.name() == "Relationship")
        .filter_map(|e| Some((e.attr("Id")?, e.attr("Target")?)))
        .collect();

    let Some(list) = presentation.root().find("p:sldIdLst") else {
        return Ok(Vec::new());
    };

    list.child_elements()
        .filter(|e| e.name() == "p:sldId")
        .map(|e| {
            let id = e
                .attr("r:id")
                .ok_or_else(|| "p:sldId without r:id".to_string())?;
            let target = targets
                .get(&id)
                .ok_or_else(|| format!("slide relationship {id} not found"))?;
            Ok(resolve_target("ppt", target))
        })
        .collect()
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal PPTX packages for tests.

    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

    /// A text shape with one paragraph per entry; each paragraph is a list of runs.
    pub fn text_shape(paragraphs: &[&[&str]]) -> String {
        let mut body = String::new();
        for runs in paragraphs {
            body.push_str("<a:p>");
            for run in *runs {
                body.push_str(&format!(
                    r#"<a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r>"#,
                    escape(run)
                ));
            }
            body.push_str("</a:p>");
        }
        format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Text"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{body}</p:txBody></p:sp>"#
        )
    }

    /// A table frame with the given rows of cell texts.
    pub fn table_shape(rows: &[&[&str]]) -> String {
        let mut grid = String::new();
        for row in rows {
            grid.push_str(r#"<a:tr h="370840">"#);
            for cell in *row {
                grid.push_str(&format!(
                    r#"<a:tc><a:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang="en-US" sz="1200"/><a:t>{}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>"#,
                    escape(cell)
                ));
            }
            grid.push_str("</a:tr>");
        }
        format!(
            r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="3" name="Table"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblGrid/>{grid}</a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#
        )
    }

    pub fn slide_xml(shapes: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld {NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
            shapes.concat()
        )
    }

    /// Write a package whose slides are given in presentation order.
    ///
    /// Slide parts are numbered in reverse so that tests catch code that
    /// orders slides by file name instead of by the slide list.
    pub fn write_pptx(path: &Path, slides: &[String]) {
        let n = slides.len();
        let mut ids = String::new();
        let mut rels = String::new();
        let mut overrides = String::new();
        for i in 0..n {
            let part = n - i;
            ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 1));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{part}.xml"/>"#,
                i + 1
            ));
            overrides.push_str(&format!(
                r#"<Override PartName="/ppt/slides/slide{part}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
            ));
        }

        let file = std::fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let mut add = |name: &str, body: &str| {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        };
        add(
            "[Content_Types].xml",
            &format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
            ),
        );
        add(
            "ppt/presentation.xml",
            &format!(r#"<?xml version="1.0" encoding="UTF-8"?><p:presentation {NS}><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#),
        );
        add(
            "ppt/_rels/presentation.xml.rels",
            &format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
            ),
        );
        for (i, slide) in slides.iter().enumerate() {
            add(&format!("ppt/slides/slide{}.xml", n - i), slide);
        }
        zip.finish().unwrap();
    }

    fn escape(s: &str) -> String {
        s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn texts(p: &mut Presentation) -> Vec<String> {
        p.containers_mut()
            .into_iter()
            .flat_map(|c| match c {
                Container::Text(t) => vec![t.text()],
                Container::Table(mut t) => t.cells().iter().map(Cell::text).collect(),
            })
            .collect()
    }

    #[test]
    fn slides_follow_presentation_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_pptx(
            &path,
            &[
                slide_xml(&[text_shape(&[&["first"]])]),
                slide_xml(&[text_shape(&[&["second"]])]),
            ],
        );

        let mut p = Presentation::open(&path).unwrap();
        assert_eq!(p.pages().len(), 2);
        assert_eq!(p.pages()[0].part_name(), "ppt/slides/slide2.xml");
        assert_eq!(texts(&mut p), ["first", "second"]);
    }

    #[test]
    fn text_joins_paragraphs_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_pptx(
            &path,
            &[slide_xml(&[text_shape(&[&["Dear ", "<name>", ","], &["Bye"]])])],
        );

        let mut p = Presentation::open(&path).unwrap();
        let mut containers = p.containers_mut();
        let Container::Text(frame) = &mut containers[0] else {
            panic!("expected a text container");
        };
        assert_eq!(frame.text(), "Dear <name>,\nBye");
        assert_eq!(frame.runs().len(), 4);
    }

    #[test]
    fn edits_survive_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        let dst = dir.path().join("out.pptx");
        write_pptx(
            &src,
            &[slide_xml(&[
                text_shape(&[&["hello"]]),
                table_shape(&[&["a", "b"], &["c", "d"]]),
            ])],
        );

        let mut p = Presentation::open(&src).unwrap();
        for container in p.containers_mut() {
            match container {
                Container::Text(mut t) => t.runs()[0].set_text("bye & co"),
                Container::Table(mut t) => t.cells()[3].set_text("x\ny"),
            }
        }
        p.save(&dst).unwrap();

        let mut reloaded = Presentation::open(&dst).unwrap();
        assert_eq!(texts(&mut reloaded), ["bye & co", "a", "b", "c", "x\ny"]);
    }

    #[test]
    fn single_page_edit_leaves_other_pages_alone() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        let dst = dir.path().join("out.pptx");
        write_pptx(
            &src,
            &[
                slide_xml(&[text_shape(&[&["cover"]])]),
                slide_xml(&[text_shape(&[&["body"]])]),
            ],
        );

        let mut p = Presentation::open(&src).unwrap();
        let second = &mut p.pages_mut()[1];
        assert_eq!(second.part_name(), "ppt/slides/slide1.xml");
        for container in second.containers_mut() {
            if let Container::Text(mut t) = container {
                t.runs()[0].set_text("edited");
            }
        }
        p.save(&dst).unwrap();

        let mut reloaded = Presentation::open(&dst).unwrap();
        assert_eq!(texts(&mut reloaded), ["cover", "edited"]);
    }

    #[test]
    fn cell_set_text_keeps_run_properties_and_breaks() {
        let mut doc = XmlDocument::parse(&format!(
            r#"<p:sld {NS}><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"#,
            table_shape(&[&["old"]])
        ))
        .unwrap();
        let tc = doc
            .root_mut()
            .find_path_mut(&[
                "p:cSld",
                "p:spTree",
                "p:graphicFrame",
                "a:graphic",
                "a:graphicData",
                "a:tbl",
                "a:tr",
                "a:tc",
            ])
            .unwrap();
        let mut cell = Cell { tc };
        cell.set_text("one\u{b}two");
        assert_eq!(cell.text(), "one\u{b}two");

        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(out.contains(r#"<a:r><a:rPr lang="en-US" sz="1200"/><a:t>one</a:t></a:r><a:br/>"#), "got: {out}");
        assert!(out.contains("<a:tcPr/>"), "cell properties must survive");
    }

    #[test]
    fn grouped_shapes_are_enumerated() {
        let group = format!(
            r#"<p:grpSp><p:nvGrpSpPr><p:cNvPr id="9" name="Group"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:grpSp>"#,
            text_shape(&[&["inner"]])
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_pptx(&path, &[slide_xml(&[text_shape(&[&["outer"]]), group])]);

        let mut p = Presentation::open(&path).unwrap();
        assert_eq!(texts(&mut p), ["outer", "inner"]);
    }

    #[test]
    fn missing_and_invalid_templates() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pptx");
        assert!(matches!(
            Presentation::open(&missing),
            Err(Sheet2PdfError::TemplateNotFound { .. })
        ));

        let garbage = dir.path().join("garbage.pptx");
        std::fs::write(&garbage, b"not a zip").unwrap();
        assert!(matches!(
            Presentation::open(&garbage),
            Err(Sheet2PdfError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn relationship_targets_resolve() {
        assert_eq!(resolve_target("ppt", "slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(resolve_target("ppt", "/ppt/slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(resolve_target("ppt/slides", "../media/image1.png"), "ppt/media/image1.png");
    }
}
