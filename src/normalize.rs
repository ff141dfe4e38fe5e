//! Deterministic team/event text normalization shared by the resolver and
//! the persister. Pure and idempotent: `normalize_team(normalize_team(s))
//! == normalize_team(s)` for every input, which the database unique
//! constraint on the normalized pair depends on.

use crate::markets::vocabulary::{SportId, TABLE_TENNIS, TENNIS};

/// Club-form affixes stripped from team names. Tokens of one or two
/// characters are dropped wholesale, so only longer affixes need listing.
const AFFIXES: &[&str] = &[
    "afc", "club", "clube", "deportivo", "fudbalski", "kosarkaski", "team",
];

/// Fold one character to its ASCII base form. Covers the Latin-1/Latin-2
/// letters the European sources actually emit.
fn fold_char(c: char, out: &mut String) {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
        'ç' | 'ć' | 'č' | 'ĉ' => out.push('c'),
        'đ' | 'ď' => out.push_str("dj"),
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' => out.push('e'),
        'ì' | 'í' | 'î' | 'ï' | 'ī' => out.push('i'),
        'ľ' | 'ł' => out.push('l'),
        'ñ' | 'ń' | 'ň' => out.push('n'),
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ő' => out.push('o'),
        'ŕ' | 'ř' => out.push('r'),
        'ß' => out.push_str("ss"),
        'ś' | 'š' | 'ş' => out.push('s'),
        'ť' | 'ţ' => out.push('t'),
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => out.push('u'),
        'ý' | 'ÿ' => out.push('y'),
        'ź' | 'ż' | 'ž' => out.push('z'),
        'æ' => out.push_str("ae"),
        'œ' => out.push_str("oe"),
        _ => out.push(c),
    }
}

/// Lowercase, diacritic-fold and strip punctuation/digits, keeping spaces so
/// token structure survives for the affix pass.
fn fold_text(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphabetic() || c == ' ' {
            folded.push(c);
        } else if c.is_whitespace() || c.is_ascii_punctuation() {
            folded.push(' ');
        } else if c.is_ascii_digit() {
            // dropped
        } else {
            fold_char(c, &mut folded);
        }
    }
    folded
}

/// Normalize a team name for matching and storage.
pub fn normalize_team(raw: &str) -> String {
    let folded = fold_text(raw);
    let tokens: Vec<&str> = folded
        .split_whitespace()
        .filter(|t| t.len() > 2 && !AFFIXES.contains(t))
        .collect();
    if tokens.is_empty() {
        // Everything was an affix or too short; fall back to the folded
        // text so e.g. "PSG" still produces a usable key.
        return folded.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    tokens.join(" ")
}

/// Tennis (and table tennis) names reduce to surname tokens: both
/// `"Last, First"` and `"First Last"` forms, with initials dropped.
pub fn tennis_surname(raw: &str) -> String {
    // Split on the comma before folding; folding turns it into a space.
    if let Some((last, _first)) = raw.split_once(',') {
        let folded = fold_text(last);
        let last = folded.split_whitespace().collect::<Vec<_>>().join(" ");
        if !last.is_empty() {
            return last;
        }
    }
    let folded = fold_text(raw);
    // "First Last" or "Last F.": drop single-letter initials, keep the
    // final remaining token.
    let tokens: Vec<&str> = folded.split_whitespace().filter(|t| t.len() > 1).collect();
    match tokens.last() {
        Some(last) => last.to_string(),
        None => folded.trim().to_string(),
    }
}

/// Sport-aware normalization entry point.
pub fn normalize_for_sport(sport: SportId, raw: &str) -> String {
    match sport {
        TENNIS | TABLE_TENNIS => tennis_surname(raw),
        _ => normalize_team(raw),
    }
}

/// Token-sort similarity in [0, 100]: tokens are sorted before comparison so
/// "zvezda crvena" and "crvena zvezda" score 100.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sort = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    let (a, b) = (sort(a), sort(b));
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b) * 100.0
}

/// Similarity of a team pair across two observations, evaluated in both
/// orientations (providers disagree about home/away often enough that the
/// flipped orientation must score too).
pub fn pair_similarity(a1: &str, a2: &str, b1: &str, b2: &str) -> f64 {
    let straight = (token_sort_ratio(a1, b1) + token_sort_ratio(a2, b2)) / 2.0;
    let flipped = (token_sort_ratio(a1, b2) + token_sort_ratio(a2, b1)) / 2.0;
    straight.max(flipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::vocabulary::{FOOTBALL, TENNIS};

    #[test]
    fn strips_affixes_and_punctuation() {
        assert_eq!(normalize_team("FC Crvena Zvezda"), "crvena zvezda");
        assert_eq!(normalize_team("F.K. Partizan 1945"), "partizan");
        assert_eq!(normalize_team("Śląsk Wrocław"), "slask wroclaw");
        assert_eq!(normalize_team("Borussia M'gladbach"), "borussia gladbach");
    }

    #[test]
    fn short_names_survive() {
        assert_eq!(normalize_team("PSG"), "psg");
        assert_eq!(normalize_team("OFK"), "ofk");
    }

    #[test]
    fn idempotent() {
        for raw in ["FC Crvena Zvezda", "Śląsk Wrocław", "Đoković, Novak", "PSG"] {
            let once = normalize_team(raw);
            assert_eq!(normalize_team(&once), once);
        }
    }

    #[test]
    fn tennis_forms_converge_on_the_surname() {
        assert_eq!(tennis_surname("Djokovic, Novak"), "djokovic");
        assert_eq!(tennis_surname("Novak Djokovic"), "djokovic");
        assert_eq!(tennis_surname("Đoković N."), "djokovic");
        assert_eq!(
            normalize_for_sport(TENNIS, "Alcaraz Garfia, Carlos"),
            "alcaraz garfia"
        );
    }

    #[test]
    fn sport_dispatch() {
        assert_eq!(normalize_for_sport(FOOTBALL, "FC Partizan"), "partizan");
        assert_eq!(normalize_for_sport(TENNIS, "Sinner, Jannik"), "sinner");
    }

    #[test]
    fn token_sort_is_order_insensitive() {
        assert!(token_sort_ratio("crvena zvezda", "zvezda crvena") > 99.9);
        assert!(token_sort_ratio("partizan", "partizan") > 99.9);
        assert!(token_sort_ratio("partizan", "vojvodina") < 50.0);
    }

    #[test]
    fn pair_similarity_handles_orientation_flip() {
        let s = pair_similarity("partizan", "crvena zvezda", "crvena zvezda", "partizan");
        assert!(s > 99.9);
    }
}
