pub mod deck;
pub mod error;
pub mod html;
pub mod model;
pub mod pptx;
pub mod store;
pub mod xlsx;

pub use deck::style::StyleConfig;
pub use error::Error;
pub use model::{Fragment, Panel, ReportRecord, Significance, TableBlock};

use std::io;
use std::path::Path;
use std::time::Instant;

/// Parse a results workbook from disk into a [`ReportRecord`].
pub fn ingest_workbook(input: &Path) -> Result<ReportRecord, Error> {
    let t0 = Instant::now();
    let record = xlsx::open_workbook(input)?;
    log::info!(
        "Timing: ingest={:.1}ms ({} comments, {} sections)",
        t0.elapsed().as_secs_f64() * 1000.0,
        record.comments.len(),
        record.sections.len(),
    );
    Ok(record)
}

/// Generate the slide deck for a record, picking the blank template for its
/// panel from `templates_dir`.
pub fn generate_deck(record: &ReportRecord, templates_dir: &Path) -> Result<Vec<u8>, Error> {
    let t0 = Instant::now();

    let path = templates_dir.join(record.panel.template_name());
    let template = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::TemplateMissing(path));
        }
        Err(e) => {
            return Err(io::Error::new(e.kind(), format!("failed to open {}: {e}", path.display()))
                .into());
        }
    };
    let t_load = t0.elapsed();

    let bytes = deck::generate(record, &template, &StyleConfig::default())?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: load={:.1}ms, layout={:.1}ms, total={:.1}ms (output {} bytes)",
        t_load.as_secs_f64() * 1000.0,
        (t_total - t_load).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        bytes.len(),
    );

    Ok(bytes)
}

/// Generate a deck from in-memory template bytes with explicit styling.
pub fn generate_deck_with(
    record: &ReportRecord,
    template: &[u8],
    cfg: &StyleConfig,
) -> Result<Vec<u8>, Error> {
    deck::generate(record, template, cfg)
}

/// Render the HTML report for a record.
pub fn render_html(record: &ReportRecord) -> String {
    html::render(record)
}
