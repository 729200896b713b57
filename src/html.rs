//! Self-contained HTML rendition of a report record: inline CSS, no
//! external assets, so the file can be mailed or archived as-is.

use std::fmt::{self, Write};

use crate::deck::comment::{emphasize, keyword_set};
use crate::deck::style::DEFAULT_DISCLAIMER;
use crate::model::{ReportRecord, SECTIONS, Significance, TableBlock, section_key};

pub fn render(record: &ReportRecord) -> String {
    let mut html = String::with_capacity(32 * 1024);
    // fmt::Write into a String cannot fail.
    let _ = write_report(&mut html, record);
    html
}

fn write_report(html: &mut String, record: &ReportRecord) -> fmt::Result {
    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html lang=\"en\">")?;
    writeln!(html, "<head>")?;
    writeln!(html, "<meta charset=\"utf-8\"/>")?;
    writeln!(html, "<title>NGS report {}</title>", escape(&record.specimen))?;
    writeln!(html, "<style>")?;
    writeln!(
        html,
        "body{{font-family:Arial,Helvetica,sans-serif;margin:24px;color:#222;background:#fff;}}"
    )?;
    writeln!(html, "h1{{margin:0 0 4px 0;font-size:22px;}}")?;
    writeln!(html, "h2{{margin:20px 0 8px 0;font-size:17px;}}")?;
    writeln!(html, ".meta{{color:#555;font-size:13px;margin-bottom:16px;}}")?;
    writeln!(
        html,
        "table{{border-collapse:collapse;margin:8px 0 16px 0;width:100%;max-width:960px;font-size:13px;}}"
    )?;
    writeln!(html, "th,td{{border:1px solid #ccc;padding:4px 8px;text-align:left;}}")?;
    writeln!(html, "th{{background:#c8c8c8;}}")?;
    writeln!(html, ".section{{margin:10px 0 2px 0;font-size:14px;}}")?;
    writeln!(html, ".clinical{{color:#c00000;font-weight:bold;}}")?;
    writeln!(html, ".comment{{max-width:960px;margin:6px 0;font-size:13px;}}")?;
    writeln!(html, ".disclaimer{{color:#555;font-size:12px;max-width:960px;margin-top:18px;}}")?;
    writeln!(html, "</style>")?;
    writeln!(html, "</head>")?;
    writeln!(html, "<body>")?;

    writeln!(html, "<h1>NGS test result</h1>")?;
    writeln!(
        html,
        "<div class=\"meta\">Specimen: <b>{}</b> &middot; Panel: {} &middot; {}</div>",
        escape(&record.specimen),
        escape(record.panel.code()),
        escape(&record.specimen_type)
    )?;

    writeln!(html, "<h2>Patient information</h2>")?;
    kv_table(html, &record.clinical_info)?;

    for (heading, sig) in [
        ("Variants of clinical significance", Significance::Clinical),
        ("Variants of unknown significance", Significance::Unknown),
    ] {
        writeln!(html, "<h2>{heading}</h2>")?;
        for def in SECTIONS {
            let key = section_key(def.key, sig);
            match record.section(&key) {
                Some(block) => variant_section(html, def.title, block, sig)?,
                None => variant_section(html, def.title, &TableBlock::default(), sig)?,
            }
        }
        if sig == Significance::Unknown {
            let failed = if record.failed_genes.trim().is_empty() {
                "None"
            } else {
                record.failed_genes.as_str()
            };
            writeln!(
                html,
                "<p class=\"section\">- Failed genes: {}</p>",
                escape(failed)
            )?;
        }
    }

    writeln!(html, "<h2>Other biomarkers</h2>")?;
    kv_table(
        html,
        &[("TMB".to_owned(), record.tmb.clone()), ("MSI".to_owned(), record.msi.clone())],
    )?;

    writeln!(html, "<h2>Sequencing quality control</h2>")?;
    data_table(html, &record.qc.headers, &record.qc.rows, Significance::Unknown)?;

    writeln!(html, "<h2>Test information</h2>")?;
    kv_table(html, &record.diagnostic_info)?;
    kv_table(html, &record.nucleic_acid)?;
    kv_table(html, &record.filter_history)?;
    kv_table(
        html,
        &[("Analysis program".to_owned(), record.analysis_program.clone())],
    )?;

    writeln!(html, "<h2>Comment</h2>")?;
    let keywords = keyword_set(record);
    if record.comments.is_empty() {
        writeln!(html, "<p class=\"comment\">None</p>")?;
    }
    for comment in &record.comments {
        write!(html, "<p class=\"comment\">")?;
        for (segment, bold) in emphasize(comment, &keywords) {
            if bold {
                write!(html, "<b>{}</b>", escape(&segment))?;
            } else {
                write!(html, "{}", escape(&segment))?;
            }
        }
        writeln!(html, "</p>")?;
    }
    writeln!(html, "<p class=\"disclaimer\">{}</p>", escape(DEFAULT_DISCLAIMER))?;

    writeln!(html, "<h2>Sign-off</h2>")?;
    kv_table(html, &record.signatures)?;

    writeln!(html, "</body>")?;
    writeln!(html, "</html>")?;
    Ok(())
}

fn variant_section(
    html: &mut String,
    title: &str,
    block: &TableBlock,
    sig: Significance,
) -> fmt::Result {
    let class = match sig {
        Significance::Clinical => " class=\"clinical\"",
        Significance::Unknown => "",
    };
    write!(html, "<p class=\"section\"><span{class}>- {}: </span>", escape(title))?;
    if block.is_empty() {
        write!(html, "None")?;
    } else {
        match sig {
            // Gene symbols keep their italics only in the clinical tier.
            Significance::Clinical => {
                write!(html, "<span{class}>")?;
                for frag in &block.highlights {
                    if frag.italic {
                        write!(html, "<i>{}</i>", escape(&frag.text))?;
                    } else {
                        write!(html, "{}", escape(&frag.text))?;
                    }
                }
                write!(html, "</span>")?;
            }
            Significance::Unknown => write!(html, "{}", escape(&block.highlight_text()))?,
        }
    }
    writeln!(html, "</p>")?;
    if !block.is_empty() {
        data_table(html, &block.headers, &block.rows, sig)?;
    }
    Ok(())
}

fn data_table(
    html: &mut String,
    headers: &[String],
    rows: &[Vec<String>],
    sig: Significance,
) -> fmt::Result {
    writeln!(html, "<table>")?;
    write!(html, "<tr>")?;
    for h in headers {
        write!(html, "<th>{}</th>", escape(h))?;
    }
    writeln!(html, "</tr>")?;
    for row in rows {
        write!(html, "<tr>")?;
        for cell in row {
            match sig {
                Significance::Clinical => {
                    write!(html, "<td class=\"clinical\">{}</td>", escape(cell))?
                }
                Significance::Unknown => write!(html, "<td>{}</td>", escape(cell))?,
            }
        }
        writeln!(html, "</tr>")?;
    }
    writeln!(html, "</table>")?;
    Ok(())
}

fn kv_table(html: &mut String, pairs: &[(String, String)]) -> fmt::Result {
    if pairs.is_empty() {
        return Ok(());
    }
    writeln!(html, "<table>")?;
    for (label, value) in pairs {
        writeln!(html, "<tr><td>{}</td><td>{}</td></tr>", escape(label), escape(value))?;
    }
    writeln!(html, "</table>")?;
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fragment;

    fn sample_record() -> ReportRecord {
        let mut record = ReportRecord {
            specimen: "SS2430925".into(),
            comments: vec!["EGFR p.L858R: pathogenic activating mutation".into()],
            ..Default::default()
        };
        record.sections.insert(
            "snv_clinical".into(),
            TableBlock {
                highlights: vec![Fragment::gene("EGFR"), Fragment::plain(" p.L858R")],
                headers: vec!["Gene".into(), "VAF".into()],
                rows: vec![vec!["EGFR".into(), "12.50".into()]],
            },
        );
        record
    }

    #[test]
    fn clinical_rows_are_styled_and_escaped() {
        let html = render(&sample_record());
        assert!(html.contains("<td class=\"clinical\">EGFR</td>"));
        assert!(html.contains("<i>EGFR</i>"));
        assert!(html.contains("- Fusion genes: </span>None"));
    }

    #[test]
    fn comment_keywords_are_bolded() {
        let html = render(&sample_record());
        assert!(html.contains("<b>EGFR p.L858R</b>"));
    }

    #[test]
    fn values_are_escaped() {
        let mut record = sample_record();
        record.clinical_info.push(("Diagnosis".into(), "adeno <3cm & nodal".into()));
        let html = render(&record);
        assert!(html.contains("adeno &lt;3cm &amp; nodal"));
        assert!(!html.contains("<3cm"));
    }
}
