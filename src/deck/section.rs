//! Section header rendering: the "- Title: body" line every report section
//! opens with, in the colour and weight of its significance tier.

use crate::error::Error;
use crate::model::{Fragment, Significance};
use crate::pptx::Package;
use crate::pptx::shape::{self, TextRun};

use super::cursor::Cursor;
use super::style::StyleConfig;
use super::template::BottomLimits;

/// What follows the section title on the header line.
pub enum Body<'a> {
    /// Renders the literal placeholder `None`.
    None,
    /// Styled variant descriptors, typically italic gene symbols.
    Fragments(&'a [Fragment]),
    Text(&'a str),
}

impl Body<'_> {
    fn char_len(&self) -> usize {
        match self {
            Body::None => 4,
            Body::Fragments(frags) => frags.iter().map(|f| f.text.chars().count()).sum(),
            Body::Text(t) => t.chars().count(),
        }
    }
}

/// Section title with its page counter, e.g. `SNVs & Indels (2/3)`. A
/// single-page section keeps its bare title.
pub fn title_with_page(title: &str, page: usize, total: usize) -> String {
    if total > 1 {
        format!("{title} ({page}/{total})")
    } else {
        title.to_owned()
    }
}

fn header_runs(cfg: &StyleConfig, title_text: &str, body: &Body, sig: Significance) -> Vec<TextRun> {
    let (color, bold) = cfg.significance_style(sig);
    let mut runs = vec![TextRun {
        text: format!("- {title_text}: "),
        bold,
        color: Some(color.to_owned()),
        size: Some(cfg.title_size),
        font: Some(cfg.font.clone()),
        ..Default::default()
    }];
    match body {
        Body::None => runs.push(TextRun {
            text: "None".to_owned(),
            color: Some(cfg.body_color.clone()),
            size: Some(cfg.body_size),
            font: Some(cfg.font.clone()),
            ..Default::default()
        }),
        Body::Fragments(frags) => {
            for frag in *frags {
                runs.push(TextRun {
                    text: frag.text.clone(),
                    italic: frag.italic,
                    color: Some(color.to_owned()),
                    size: Some(cfg.body_size),
                    font: Some(cfg.font.clone()),
                    ..Default::default()
                });
            }
        }
        Body::Text(text) => runs.push(TextRun {
            text: (*text).to_owned(),
            color: Some(color.to_owned()),
            size: Some(cfg.body_size),
            font: Some(cfg.font.clone()),
            ..Default::default()
        }),
    }
    runs
}

/// Draw a section header at the cursor and advance past it. `reserve` is
/// extra height that must fit below the header on the same page, so a
/// header is never stranded at a page bottom with its first content row
/// pushed to the next page.
pub fn render_header(
    pkg: &mut Package,
    cursor: &mut Cursor,
    limits: &mut BottomLimits,
    cfg: &StyleConfig,
    title_text: &str,
    body: &Body,
    sig: Significance,
    reserve: i64,
) -> Result<(), Error> {
    let text_len = title_text.chars().count() + 4 + body.char_len();
    let height = cfg.section_height(text_len);
    cursor.ensure_space(pkg, limits, cfg, height + reserve)?;

    let runs = header_runs(cfg, title_text, body, sig);
    let (page_w, _) = pkg.slide_size();
    let width = page_w - cfg.left_margin - cfg.right_margin;
    shape::add_text_box(
        pkg.slide_mut(cursor.slide),
        cfg.left_margin,
        cursor.top,
        width,
        height,
        &[runs],
        false,
    );
    cursor.advance(height + cfg.section_gap);
    Ok(())
}
