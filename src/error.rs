use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by workbook ingestion, deck generation and the record store.
///
/// Recoverable problems (a missing optional worksheet, an unmatched label cell,
/// a template table nobody recognises) are logged and worked around instead of
/// being raised; only structural failures end up here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed xml: {0}")]
    Xml(String),

    #[error("invalid workbook: {0}")]
    InvalidWorkbook(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("template not found: {0}")]
    TemplateMissing(PathBuf),

    #[error("no stored record for specimen {0}")]
    RecordMissing(String),

    #[error("record store error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("layout failure: {0}")]
    Layout(String),
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}
