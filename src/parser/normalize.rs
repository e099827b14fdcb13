use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

/// Canonicalize raw extracted text into its stable, storable form.
///
/// Total and idempotent. Quote dedup keys on this output, so the cosmetic
/// variation the archive pages carry (mixed encodings, CMS-era typography,
/// stray control characters) must all collapse to one representation.
pub fn normalize(raw: &str) -> String {
    let canonical: String = raw.nfkc().collect();

    // Typographic characters NFKC leaves alone, plus invisible characters.
    let folded = canonical
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2026}', "...")
        .replace('\u{200B}', "")
        .replace('\u{00A0}', " ");

    // Drop control/format/unassigned/private-use code points. Newline, tab,
    // carriage return and space are kept regardless of category.
    let printable: String = folded
        .chars()
        .filter(|&c| {
            matches!(c, '\n' | '\r' | '\t' | ' ')
                || c.general_category_group() != GeneralCategoryGroup::Other
        })
        .collect();

    printable
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
