//! Text normalization and fuzzy title comparison
//!
//! Titles read from tags and titles returned by metadata providers rarely
//! agree byte for byte. [`is_similar`] compares one side against a set of
//! permutations of the other: conjunction swaps, abbreviations, articles,
//! bracket styles, parenthetical removal and digits spelled out as words.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static PARENTHETICALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}").unwrap());
static SLASH_SPACING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+/\s+").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());
static VOL_ABBREVIATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)vol\.(\s|$)").unwrap());
static VOL_SPELLED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)volume(\s|$)").unwrap());
static PT_ABBREVIATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)pt\.(\s|$)").unwrap());
static PT_SPELLED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)part(\s|$)").unwrap());
static EDITION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(edition|version|exclusive)$").unwrap());

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [(u64, &str); 6] = [
    (1_000_000_000_000_000_000, "quintillion"),
    (1_000_000_000_000_000, "quadrillion"),
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// Strip accents: NFD decomposition, drop combining marks, recompose.
///
/// Used for the `normalized_title` columns so searches are accent-insensitive.
pub fn normalize_accents(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

/// Replace typographic quotes, ellipses and dashes with their ASCII forms.
pub fn replace_specials(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{2033}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => out.push('-'),
            _ => out.push(c),
        }
    }
    out
}

/// Lowercase and collapse runs of whitespace.
fn fold_case(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Remove every `(...)`, `[...]` and `{...}` group.
///
/// ```ignore
/// assert_eq!(strip_all_parentheses("Abbey Road (Remastered) [2019]"), "Abbey Road");
/// ```
pub fn strip_all_parentheses(s: &str) -> String {
    PARENTHETICALS
        .replace_all(s, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The lowercased text between the last `(` and the last `)` of a title,
/// e.g. `"deluxe edition"` for `"Rumours (Deluxe Edition)"`.
///
/// Empty when the title has no well-formed trailing parenthetical.
pub fn album_disambiguation(title: &str) -> String {
    match (title.rfind('('), title.rfind(')')) {
        (Some(open), Some(close)) if open < close => title[open + 1..close].to_lowercase(),
        _ => String::new(),
    }
}

/// Spell out a number in English words (`21` -> `"twenty-one"`).
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }

    let mut parts = Vec::new();
    let mut rest = n;
    for (scale, name) in SCALES {
        if rest >= scale {
            parts.push(format!("{} {}", below_thousand(rest / scale), name));
            rest %= scale;
        }
    }
    if rest > 0 {
        parts.push(below_thousand(rest));
    }
    parts.join(" ")
}

fn below_thousand(n: u64) -> String {
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let rest = (n % 100) as usize;

    if hundreds > 0 {
        parts.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if rest >= 20 {
        let tens = TENS[rest / 10];
        if rest % 10 == 0 {
            parts.push(tens.to_string());
        } else {
            parts.push(format!("{}-{}", tens, ONES[rest % 10]));
        }
    } else if rest > 0 {
        parts.push(ONES[rest].to_string());
    }
    parts.join(" ")
}

/// Replace every run of digits with its English spelling.
///
/// Runs too long to fit in a `u64` are left untouched.
pub fn numbers_to_words(s: &str) -> String {
    DIGITS
        .replace_all(s, |caps: &regex::Captures| {
            caps[0]
                .parse::<u64>()
                .map(number_to_words)
                .unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Variants of one separator-delimited part with a leading article added or removed.
fn article_variants(part: &str) -> Vec<String> {
    if part.is_empty() {
        return Vec::new();
    }
    if let Some(rest) = part.strip_prefix("the ") {
        vec![rest.to_string()]
    } else if let Some(rest) = part.strip_prefix("a ") {
        vec![rest.to_string()]
    } else {
        vec![format!("the {}", part), format!("a {}", part)]
    }
}

/// Build the set of accepted spellings for `s`.
///
/// All entries are lowercase. The set always contains the lowercased input.
pub fn permutations(s: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    let folded = fold_case(s);
    set.insert(folded.clone());

    let s = replace_specials(&folded);
    set.insert(s.clone());

    set.insert(s.replace(" & ", " and "));
    set.insert(s.replace(" and ", " & "));
    set.insert(VOL_ABBREVIATED.replace_all(&s, "${1}volume${2}").into_owned());
    set.insert(VOL_SPELLED.replace_all(&s, "${1}vol.${2}").into_owned());
    set.insert(PT_ABBREVIATED.replace_all(&s, "${1}part${2}").into_owned());
    set.insert(PT_SPELLED.replace_all(&s, "${1}pt.${2}").into_owned());

    set.insert(s.replace('(', "[").replace(')', "]"));
    set.insert(s.replace('[', "(").replace(']', ")"));

    set.insert(SLASH_SPACING.replace_all(&s, "/").into_owned());
    set.insert(s.replace('/', " / "));

    // "deluxe edition" also answers to "deluxe"
    if EDITION_SUFFIX.is_match(&s) {
        set.insert(EDITION_SUFFIX.replace(&s, "").into_owned());
    }

    let separator = if s.contains(" and ") { " and " } else { " & " };
    for part in s.split(separator) {
        set.insert(part.to_string());
        set.extend(article_variants(part));
    }

    set.insert(strip_all_parentheses(&s));
    set.insert(numbers_to_words(&s));
    set
}

/// Whether `candidate` is a plausible spelling of `reference`.
///
/// Directional: `reference` is expanded into [`permutations`], `candidate`
/// is tried as-is, without parentheticals, with digits spelled out, and with
/// both transforms applied.
pub fn is_similar(candidate: &str, reference: &str) -> bool {
    let accepted = permutations(reference);

    let plain = replace_specials(&fold_case(candidate));
    let stripped = strip_all_parentheses(&plain);
    let spelled = numbers_to_words(&plain);
    let combined = strip_all_parentheses(&spelled);

    [plain, stripped, spelled, combined]
        .iter()
        .any(|variant| accepted.contains(variant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_similar_volume_abbreviation() {
        assert!(is_similar("Vol. 2", "Volume 2"));
        assert!(is_similar("Volume 2", "Vol. 2"));
        assert!(is_similar("Greatest Hits Vol. 1", "Greatest Hits Volume 1"));
    }

    #[test]
    fn test_is_similar_parenthetical_stripped() {
        assert!(is_similar("Deluxe (Explicit)", "Deluxe Edition"));
        assert!(is_similar("Rumours (Remastered)", "Rumours"));
    }

    #[test]
    fn test_is_similar_rejects_different_titles() {
        assert!(!is_similar("Red", "Blue"));
        assert!(!is_similar("Abbey Road", "Let It Be"));
    }

    #[test]
    fn test_is_similar_conjunctions_and_articles() {
        assert!(is_similar("Simon and Garfunkel", "Simon & Garfunkel"));
        assert!(is_similar("Simon & Garfunkel", "Simon and Garfunkel"));
        assert!(is_similar("Beatles", "The Beatles"));
        assert!(is_similar("The National", "National"));
        assert!(is_similar("Garfunkel", "Simon & Garfunkel"));
    }

    #[test]
    fn test_is_similar_brackets_and_slashes() {
        assert!(is_similar("Live [Bonus]", "Live (Bonus)"));
        assert!(is_similar("AC/DC", "AC / DC"));
        assert!(is_similar("Part 1", "Pt. 1"));
    }

    #[test]
    fn test_is_similar_numbers_and_specials() {
        assert!(is_similar("Blink 182", "Blink one hundred eighty-two"));
        assert!(is_similar("Don't Stop", "Don\u{2019}t Stop"));
        assert!(is_similar("  HELLO   World ", "hello world"));
    }

    #[test]
    fn test_number_to_words() {
        assert_eq!(number_to_words(0), "zero");
        assert_eq!(number_to_words(7), "seven");
        assert_eq!(number_to_words(13), "thirteen");
        assert_eq!(number_to_words(40), "forty");
        assert_eq!(number_to_words(21), "twenty-one");
        assert_eq!(number_to_words(100), "one hundred");
        assert_eq!(number_to_words(101), "one hundred one");
        assert_eq!(number_to_words(1999), "one thousand nine hundred ninety-nine");
        assert_eq!(number_to_words(2_000_005), "two million five");
    }

    #[test]
    fn test_numbers_to_words_in_text() {
        assert_eq!(numbers_to_words("track 01 of 12"), "track one of twelve");
        assert_eq!(numbers_to_words("no digits"), "no digits");
        let huge = "99999999999999999999999";
        assert_eq!(numbers_to_words(huge), huge);
    }

    #[test]
    fn test_strip_all_parentheses() {
        assert_eq!(
            strip_all_parentheses("Abbey Road (Remastered) [2019]"),
            "Abbey Road"
        );
        assert_eq!(strip_all_parentheses("A (b) c {d}"), "A c");
        assert_eq!(strip_all_parentheses("plain"), "plain");
    }

    #[test]
    fn test_album_disambiguation() {
        assert_eq!(album_disambiguation("Rumours (Deluxe Edition)"), "deluxe edition");
        assert_eq!(album_disambiguation("A (b) (Explicit)"), "explicit");
        assert_eq!(album_disambiguation("No Parens"), "");
        assert_eq!(album_disambiguation("Broken ) ("), "");
    }

    #[test]
    fn test_replace_specials() {
        assert_eq!(replace_specials("it\u{2019}s"), "it's");
        assert_eq!(replace_specials("\u{201C}x\u{201D}"), "\"x\"");
        assert_eq!(replace_specials("wait\u{2026}"), "wait...");
        assert_eq!(replace_specials("a\u{2013}b\u{2014}c"), "a-b-c");
    }

    #[test]
    fn test_normalize_accents() {
        assert_eq!(normalize_accents("Beyonc\u{e9}"), "Beyonce");
        assert_eq!(normalize_accents("Sigur R\u{f3}s"), "Sigur Ros");
        assert_eq!(normalize_accents("plain"), "plain");
    }

    #[test]
    fn test_permutations_contains_lowercase_input() {
        let set = permutations("The Dark Side & The Moon");
        assert!(set.contains("the dark side & the moon"));
        assert!(set.contains("the dark side and the moon"));
        assert!(set.contains("dark side"));
    }
}
