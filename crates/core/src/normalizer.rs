use crate::models::{CleanPage, Page};

const ZERO_WIDTH: [char; 6] = [
    '\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}', '\u{00ad}',
];

fn is_artifact(character: char) -> bool {
    (character.is_control() && !character.is_whitespace())
        || character == char::REPLACEMENT_CHARACTER
        || ZERO_WIDTH.contains(&character)
}

/// Drops extraction artifacts, collapses whitespace runs to one space and trims.
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| !is_artifact(*c)).collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One `CleanPage` per input page, in input order. Empty pages stay as `""`.
pub fn normalize(pages: &[Page]) -> Vec<CleanPage> {
    pages
        .iter()
        .map(|page| CleanPage {
            page_number: page.page_number,
            text: normalize_text(&page.raw_text),
        })
        .collect()
}
