//! Naming helpers: PascalCase -> snake_case and English pluralization.
//! Every derived name (table names, route paths, schema names) is computed through here.

use regex::Regex;
use std::sync::OnceLock;

fn snake_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z])([A-Z])").expect("static regex"))
}

/// (pattern, replacement) pairs; the first pattern that matches wins.
fn plural_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"([bcdfghjklmnpqrstvwxz])y$", "${1}ies"),
            (r"(s|x|z|ch|sh)$", "${1}es"),
            (r"([^aeiou])o$", "${1}oes"),
            (r"$", "s"),
        ]
        .into_iter()
        .map(|(p, r)| (Regex::new(p).expect("static regex"), r))
        .collect()
    })
}

/// Convert an entity name to snake_case.
/// e.g. "VideoStudy" -> "video_study", "Video" -> "video"
pub fn to_snake_case(s: &str) -> String {
    snake_boundary().replace_all(s, "${1}_${2}").to_lowercase()
}

/// Pluralize an English word.
/// e.g. "Study" -> "Studies", "Box" -> "Boxes", "Potato" -> "Potatoes", "Video" -> "Videos"
pub fn plural(word: &str) -> String {
    for (pattern, replacement) in plural_rules() {
        if pattern.is_match(word) {
            return pattern.replace(word, *replacement).into_owned();
        }
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_splits_on_lower_upper_boundary() {
        assert_eq!(to_snake_case("VideoStudy"), "video_study");
        assert_eq!(to_snake_case("Video"), "video");
        assert_eq!(to_snake_case("VideoRecord"), "video_record");
        assert_eq!(to_snake_case("HTTPServer"), "httpserver");
    }

    #[test]
    fn plural_consonant_y() {
        assert_eq!(plural("Study"), "Studies");
        assert_eq!(plural("video_study"), "video_studies");
    }

    #[test]
    fn plural_sibilant_suffix() {
        assert_eq!(plural("Box"), "Boxes");
        assert_eq!(plural("Class"), "Classes");
        assert_eq!(plural("Match"), "Matches");
        assert_eq!(plural("Wish"), "Wishes");
    }

    #[test]
    fn plural_consonant_o() {
        assert_eq!(plural("Potato"), "Potatoes");
    }

    #[test]
    fn plural_default_appends_s() {
        assert_eq!(plural("Video"), "Videos");
        assert_eq!(plural("Day"), "Days");
        assert_eq!(plural("Sentence"), "Sentences");
    }
}
