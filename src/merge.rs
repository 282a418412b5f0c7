//! Placeholder substitution: personalise a template for one record.
//!
//! Matching is literal and scoped to the smallest unit PowerPoint keeps
//! together: a run in a text frame, a whole cell in a table. A placeholder
//! that the template author split across two differently styled runs is left
//! untouched.
//!
//! Fields are applied in the record's column order, each pass rewriting the
//! text left by the previous one. A value that itself contains a placeholder
//! handled later in the order is therefore substituted again.

use crate::error::Sheet2PdfError;
use crate::record::{Field, Record};
use crate::template::{Container, Presentation};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of merged documents.
pub const MERGED_EXTENSION: &str = "pptx";

/// Replace every placeholder occurrence in `presentation` with its value.
pub fn substitute(presentation: &mut Presentation, fields: &[Field]) {
    let mut containers = presentation.containers_mut();
    for container in containers.iter_mut() {
        for field in fields {
            match container {
                Container::Text(frame) => {
                    if !frame.text().contains(&field.placeholder) {
                        continue;
                    }
                    for mut run in frame.runs() {
                        let current = run.text();
                        if current.contains(&field.placeholder) {
                            run.set_text(&current.replace(&field.placeholder, &field.value));
                        }
                    }
                }
                Container::Table(table) => {
                    for mut cell in table.cells() {
                        let current = cell.text();
                        if current.contains(&field.placeholder) {
                            cell.set_text(&current.replace(&field.placeholder, &field.value));
                        }
                    }
                }
            }
        }
    }
}

/// Load `template` fresh, substitute `record`, and save `<out_dir>/<filename>.pptx`.
pub fn merge_record(
    template: &Path,
    record: &Record,
    out_dir: &Path,
) -> Result<PathBuf, Sheet2PdfError> {
    let mut presentation = Presentation::open(template)?;
    substitute(&mut presentation, record.fields());

    let dest = out_dir.join(format!("{}.{}", record.filename(), MERGED_EXTENSION));
    presentation.save(&dest)?;
    debug!("Merged {} → {}", record.filename(), dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::pptx::fixtures::*;
    use crate::template::Cell;

    fn fields(pairs: &[(&str, &str)]) -> Vec<Field> {
        pairs.iter().map(|(p, v)| Field::new(*p, *v)).collect()
    }

    fn all_text(p: &mut Presentation) -> Vec<String> {
        p.containers_mut()
            .into_iter()
            .flat_map(|c| match c {
                Container::Text(t) => vec![t.text()],
                Container::Table(mut t) => t.cells().iter().map(Cell::text).collect(),
            })
            .collect()
    }

    fn deck(dir: &Path, shapes: &[String]) -> Presentation {
        let path = dir.join("template.pptx");
        write_pptx(&path, &[slide_xml(shapes)]);
        Presentation::open(&path).unwrap()
    }

    #[test]
    fn replaces_within_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(dir.path(), &[text_shape(&[&["Dear <name>,"]])]);
        substitute(&mut p, &fields(&[("<name>", "Alice")]));
        assert_eq!(all_text(&mut p), ["Dear Alice,"]);
    }

    #[test]
    fn every_occurrence_in_every_run_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(
            dir.path(),
            &[text_shape(&[&["<n> and <n>", " / "], &["<n>!"]])],
        );
        substitute(&mut p, &fields(&[("<n>", "x")]));
        assert_eq!(all_text(&mut p), ["x and x / \nx!"]);
    }

    #[test]
    fn placeholder_split_across_runs_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(dir.path(), &[text_shape(&[&["Dear <na", "me>,"]])]);
        substitute(&mut p, &fields(&[("<name>", "Alice")]));
        assert_eq!(all_text(&mut p), ["Dear <name>,"]);
    }

    #[test]
    fn table_cells_are_replaced_whole() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(
            dir.path(),
            &[table_shape(&[&["Name", "<name>"], &["Score", "<score>/100"]])],
        );
        substitute(&mut p, &fields(&[("<name>", "Bob"), ("<score>", "87")]));
        assert_eq!(all_text(&mut p), ["Name", "Bob", "Score", "87/100"]);
    }

    #[test]
    fn table_substitution_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(dir.path(), &[table_shape(&[&["<a> <a>", "-"]])]);
        let f = fields(&[("<a>", "value")]);
        substitute(&mut p, &f);
        let once = all_text(&mut p);
        substitute(&mut p, &f);
        assert_eq!(all_text(&mut p), once);
    }

    #[test]
    fn earlier_values_are_rewritten_by_later_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(
            dir.path(),
            &[
                text_shape(&[&["Hi <first>"]]),
                table_shape(&[&["<first>"]]),
            ],
        );
        substitute(
            &mut p,
            &fields(&[("<first>", "<last>"), ("<last>", "Smith")]),
        );
        assert_eq!(all_text(&mut p), ["Hi Smith", "Smith"]);
    }

    #[test]
    fn later_values_are_not_rewritten_by_earlier_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(dir.path(), &[text_shape(&[&["<last> <first>"]])]);
        substitute(
            &mut p,
            &fields(&[("<last>", "Smith"), ("<first>", "<last>")]),
        );
        assert_eq!(all_text(&mut p), ["Smith <last>"]);
    }

    #[test]
    fn no_placeholder_survives_without_reintroduction() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = deck(
            dir.path(),
            &[
                text_shape(&[&["<a>", "x<b>y"], &["<c><a>"]]),
                table_shape(&[&["<b>", "<c>"], &["<a><b><c>", "none"]]),
            ],
        );
        let f = fields(&[("<a>", "1"), ("<b>", "22"), ("<c>", "333")]);
        substitute(&mut p, &f);
        for text in all_text(&mut p) {
            for field in &f {
                assert!(!text.contains(&field.placeholder), "{text:?}");
            }
        }
    }

    #[test]
    fn merge_record_writes_named_file_and_leaves_template_alone() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.pptx");
        write_pptx(&template, &[slide_xml(&[text_shape(&[&["Dear <name>,"]])])]);
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let record = Record::new(1, "alice", fields(&[("<name>", "Alice")])).unwrap();
        let path = merge_record(&template, &record, &out).unwrap();
        assert_eq!(path, out.join("alice.pptx"));

        let mut merged = Presentation::open(&path).unwrap();
        assert_eq!(all_text(&mut merged), ["Dear Alice,"]);
        let mut original = Presentation::open(&template).unwrap();
        assert_eq!(all_text(&mut original), ["Dear <name>,"]);
    }
}
