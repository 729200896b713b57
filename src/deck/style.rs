//! Layout constants and estimation helpers.
//!
//! Heights here are deliberate approximations: the generator never measures
//! rendered text, it budgets space from fixed per-line heights and
//! characters-per-line counts, the same constants the planner and the
//! renderer both read so page counts cannot drift apart.

use crate::model::Significance;

pub const EMU_PER_CM: i64 = 360_000;

/// Shown when the template carries no disclaimer block of its own.
pub const DEFAULT_DISCLAIMER: &str = "This test was developed and its performance \
    characteristics determined by the laboratory. It has not been cleared or \
    approved by the U.S. Food and Drug Administration.";

pub fn cm(v: f64) -> i64 {
    (v * EMU_PER_CM as f64).round() as i64
}

/// Immutable styling and geometry configuration threaded through the whole
/// generation pass. All lengths are EMU, font sizes hundredths of a point.
#[derive(Clone, Debug)]
pub struct StyleConfig {
    pub left_margin: i64,
    pub right_margin: i64,
    /// Content start on freshly inserted slides.
    pub top_margin: i64,
    /// Bottom inset on authored template slides.
    pub bottom_margin: i64,
    /// Bottom inset on generated slides, which have no authored furniture.
    pub fresh_bottom_margin: i64,
    /// Gap between a section marker's bottom edge and the first content.
    pub anchor_gap: i64,
    /// Vertical gap after each rendered block.
    pub section_gap: i64,

    pub row_height: i64,
    pub header_row_height: i64,
    pub section_line_height: i64,
    /// Extra height charged per estimated wrapped line of a section header.
    pub wrap_line_height: i64,
    pub comment_line_height: i64,
    /// Vertical padding inside the bordered comment box.
    pub comment_box_inset: i64,
    /// Height of the sign-off block on comment pages.
    pub footer_height: i64,
    pub footer_gap: i64,

    pub section_chars_per_line: usize,
    pub comment_chars_per_line: usize,

    pub font: String,
    pub title_size: i32,
    pub body_size: i32,
    pub comment_size: i32,
    pub clinical_color: String,
    pub body_color: String,
    pub table_header_fill: String,
    pub table_border_color: String,

    // Marker substrings, matched case-insensitively against shape text.
    pub clinical_marker: String,
    pub unknown_marker: String,
    pub comment_marker: String,
    pub trailing_marker: String,
    pub footer_marker: String,
    pub disclaimer_marker: String,
    /// Used when the template carries no disclaimer block of its own.
    pub default_disclaimer: String,

    /// Slide whose decorative shapes seed freshly inserted slides.
    pub reference_slide: usize,
}

impl Default for StyleConfig {
    fn default() -> Self {
        StyleConfig {
            left_margin: cm(1.0),
            right_margin: cm(1.0),
            top_margin: cm(1.5),
            bottom_margin: cm(1.0),
            fresh_bottom_margin: cm(0.5),
            anchor_gap: cm(0.2),
            section_gap: cm(0.15),
            row_height: cm(0.8),
            header_row_height: cm(0.8),
            section_line_height: cm(0.6),
            wrap_line_height: cm(0.3),
            comment_line_height: cm(0.5),
            comment_box_inset: cm(0.2),
            footer_height: cm(2.0),
            footer_gap: cm(0.2),
            section_chars_per_line: 110,
            comment_chars_per_line: 105,
            font: "Arial".to_owned(),
            title_size: 1100,
            body_size: 1000,
            comment_size: 1000,
            clinical_color: "C00000".to_owned(),
            body_color: "000000".to_owned(),
            table_header_fill: "C8C8C8".to_owned(),
            table_border_color: "000000".to_owned(),
            clinical_marker: "variants of clinical significance".to_owned(),
            unknown_marker: "variants of unknown significance".to_owned(),
            comment_marker: "\u{25a3} comment".to_owned(),
            trailing_marker: "other biomarkers".to_owned(),
            footer_marker: "department of pathology".to_owned(),
            disclaimer_marker: "performance characteristics".to_owned(),
            default_disclaimer: DEFAULT_DISCLAIMER.to_owned(),
            reference_slide: 1,
        }
    }
}

impl StyleConfig {
    /// Estimated height of a section header line: one base line plus one
    /// wrap increment per full run of `section_chars_per_line` characters,
    /// capped at two increments.
    pub fn section_height(&self, text_len: usize) -> i64 {
        let wraps = (text_len / self.section_chars_per_line).min(2) as i64;
        self.section_line_height + wraps * self.wrap_line_height
    }

    /// Estimated wrapped line count of a comment paragraph. Never zero.
    pub fn comment_lines(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.comment_chars_per_line).max(1)
    }

    /// How many data rows fit in `avail` EMU below a table header row.
    pub fn rows_that_fit(&self, avail: i64) -> usize {
        if avail <= self.header_row_height {
            return 0;
        }
        ((avail - self.header_row_height) / self.row_height) as usize
    }

    pub fn table_height(&self, rows: usize) -> i64 {
        self.header_row_height + rows as i64 * self.row_height
    }

    /// Header colour and weight for a significance tier.
    pub fn significance_style(&self, sig: Significance) -> (&str, bool) {
        match sig {
            Significance::Clinical => (&self.clinical_color, true),
            Significance::Unknown => (&self.body_color, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_height_caps_wrap_surcharge() {
        let cfg = StyleConfig::default();
        assert_eq!(cfg.section_height(10), cfg.section_line_height);
        assert_eq!(
            cfg.section_height(cfg.section_chars_per_line),
            cfg.section_line_height + cfg.wrap_line_height
        );
        // ten full lines of text still only charge two extra increments
        assert_eq!(
            cfg.section_height(cfg.section_chars_per_line * 10),
            cfg.section_line_height + 2 * cfg.wrap_line_height
        );
    }

    #[test]
    fn comment_lines_never_zero() {
        let cfg = StyleConfig::default();
        assert_eq!(cfg.comment_lines(""), 1);
        assert_eq!(cfg.comment_lines(&"x".repeat(cfg.comment_chars_per_line + 1)), 2);
    }

    #[test]
    fn rows_that_fit_floors() {
        let cfg = StyleConfig::default();
        assert_eq!(cfg.rows_that_fit(cfg.header_row_height), 0);
        assert_eq!(cfg.rows_that_fit(cfg.table_height(3)), 3);
        assert_eq!(cfg.rows_that_fit(cfg.table_height(3) + cfg.row_height - 1), 3);
    }
}
