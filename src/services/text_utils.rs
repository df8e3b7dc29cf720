//! Shared text normalization utilities
//!
//! Slugs for public URLs and cleanup of text coming from the external catalog.

use regex::Regex;

/// Build a URL slug: lowercase ASCII alphanumerics joined by single dashes.
///
/// Common Latin accents are folded to their base letter; anything else that is
/// not alphanumeric acts as a separator.
///
/// # Example
/// ```ignore
/// assert_eq!(slugify("Spider-Man: No Way Home"), "spider-man-no-way-home");
/// ```
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;

    for c in s.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c != '\'' && c != '\u{2019}' {
            pending_dash = true;
        }
    }

    slug
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => c,
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip HTML tags from scraped text and normalize whitespace.
pub fn clean_text(s: &str) -> String {
    let without_tags = Regex::new(r"<[^>]*>")
        .map(|re| re.replace_all(s, " ").to_string())
        .unwrap_or_else(|_| s.to_string());

    normalize_whitespace(
        &without_tags
            .replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&nbsp;", " "),
    )
}

/// Split a comma/semicolon separated list of names, dropping blanks and duplicates.
pub fn split_names(s: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in s.split([',', ';', '|']).map(normalize_whitespace) {
        if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    }
    names
}
