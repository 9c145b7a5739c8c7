//! Static validation of a whole document.
//!
//! Evaluation only parses the sub-templates it reaches. Checking parses every
//! one of them, nested sections included, so tooling can report all syntax
//! errors up front.

use super::ast::{LineIndex, Position};
use super::error::LocatedError;
use super::subtemplates::{SubtemplateMap, extract};
use super::template::{parse_subtemplate_body, parse_template};

/// Every syntax error in `text`, in document coordinates and document order.
pub fn check_document(text: &str) -> Vec<LocatedError> {
    let extraction = extract(text, Position::START);
    let mut errors = extraction.errors;

    let index = LineIndex::new(&extraction.residual);
    errors.extend(
        parse_template(&extraction.residual)
            .errors
            .into_iter()
            .map(|error| LocatedError::locate(error, &index, Position::START)),
    );
    check_subtemplates(&extraction.subtemplates, &mut errors);

    errors.sort_by_key(|error| error.start.offset);
    errors
}

fn check_subtemplates(map: &SubtemplateMap, errors: &mut Vec<LocatedError>) {
    for record in map.values() {
        let index = LineIndex::new(&record.raw);
        errors.extend(
            parse_subtemplate_body(&record.raw)
                .errors
                .into_iter()
                .map(|error| LocatedError::locate(error, &index, record.origin)),
        );
        check_subtemplates(&record.nested, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_document_has_no_errors() {
        let text = "Hi {name}\nSubtemplates:\n{#Row:[{a}]}";
        assert!(check_document(text).is_empty());
    }

    #[test]
    fn reports_errors_in_uninvoked_subtemplates() {
        let text = "{x y}\nSubtemplates:\n{#Unused:[{a b}]}";
        let errors = check_document(text);
        assert_eq!(errors.len(), 2);
        assert_eq!((errors[0].start.line, errors[0].start.column), (1, 1));
        assert_eq!((errors[1].start.line, errors[1].start.column), (3, 11));
    }
}
