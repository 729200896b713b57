//! The flow cursor: current slide and vertical write position, page-break
//! decisions, and the running section title that continuation pages redraw.

use crate::error::Error;
use crate::model::Significance;
use crate::pptx::Package;
use crate::pptx::shape::{self, TextRun};

use super::style::StyleConfig;
use super::template::{Anchor, BottomLimits};

/// Section heading redrawn at the top of every continuation page, with its
/// page counter. `None` significance renders the neutral bold style used by
/// the comment heading.
#[derive(Clone, Debug)]
pub struct RunningTitle {
    pub prefix: String,
    pub colon: bool,
    pub total: usize,
    pub next_page: usize,
    pub sig: Option<Significance>,
}

impl RunningTitle {
    fn label(&self) -> String {
        let mut text = if self.total > 1 {
            format!("{} ({}/{})", self.prefix, self.next_page, self.total)
        } else {
            self.prefix.clone()
        };
        if self.colon {
            text.push(':');
        }
        text
    }
}

/// Tracks where the next block of content goes. Positions are EMU from the
/// top of the slide.
pub struct Cursor {
    pub slide: usize,
    pub top: i64,
    running: Option<RunningTitle>,
    /// Parts of every slide this generation pass allocated, in order.
    pub created: Vec<String>,
}

impl Cursor {
    pub fn new() -> Self {
        Cursor { slide: 0, top: 0, running: None, created: Vec::new() }
    }

    /// Snap onto a template anchor: the authored page for a content group.
    pub fn jump(&mut self, pkg: &Package, anchor: &Anchor) -> Result<(), Error> {
        self.slide = pkg
            .slide_index(&anchor.part)
            .ok_or_else(|| Error::Layout(format!("anchor slide {} disappeared", anchor.part)))?;
        self.top = anchor.top;
        Ok(())
    }

    pub fn advance(&mut self, height: i64) {
        self.top += height;
    }

    pub fn fits(&self, pkg: &Package, limits: &BottomLimits, height: i64) -> bool {
        self.top + height <= limits.get(pkg.slide(self.slide).part_name())
    }

    /// Break to a new slide unless `height` fits below the cursor. Returns
    /// whether a break happened.
    pub fn ensure_space(
        &mut self,
        pkg: &mut Package,
        limits: &mut BottomLimits,
        cfg: &StyleConfig,
        height: i64,
    ) -> Result<bool, Error> {
        if self.fits(pkg, limits, height) {
            return Ok(false);
        }
        self.new_slide(pkg, limits, cfg)?;
        Ok(true)
    }

    /// Allocate a continuation slide right after the current one, move the
    /// cursor to its top and redraw the running title if one is active.
    pub fn new_slide(
        &mut self,
        pkg: &mut Package,
        limits: &mut BottomLimits,
        cfg: &StyleConfig,
    ) -> Result<(), Error> {
        let decor_from = cfg.reference_slide.min(pkg.slide_count() - 1);
        let idx = pkg.insert_slide_after(self.slide, decor_from)?;
        let part = pkg.slide(idx).part_name().to_owned();
        let (_, page_h) = pkg.slide_size();
        limits.tighten(&part, page_h - cfg.fresh_bottom_margin);
        self.created.push(part);
        self.slide = idx;
        self.top = cfg.top_margin;

        if let Some(mut rt) = self.running.take() {
            self.draw_title(pkg, cfg, &rt);
            self.advance(cfg.section_line_height + cfg.section_gap);
            rt.next_page += 1;
            self.running = Some(rt);
        }
        Ok(())
    }

    fn draw_title(&mut self, pkg: &mut Package, cfg: &StyleConfig, rt: &RunningTitle) {
        let (color, bold) = match rt.sig {
            Some(sig) => cfg.significance_style(sig),
            None => (cfg.body_color.as_str(), true),
        };
        let run = TextRun {
            text: rt.label(),
            bold,
            color: Some(color.to_owned()),
            size: Some(cfg.title_size),
            font: Some(cfg.font.clone()),
            ..Default::default()
        };
        let (page_w, _) = pkg.slide_size();
        let width = page_w - cfg.left_margin - cfg.right_margin;
        shape::add_text_box(
            pkg.slide_mut(self.slide),
            cfg.left_margin,
            self.top,
            width,
            cfg.section_line_height,
            &[vec![run]],
            false,
        );
    }

    pub fn set_running(&mut self, rt: RunningTitle) {
        self.running = Some(rt);
    }

    pub fn clear_running(&mut self) {
        self.running = None;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}
