//! The selection grammar: a strictly-typed ASCII encoding of arity-1
//! outcomes, designed so two providers can never disagree on form.
//!
//! ```text
//! selection := branch ('|' branch)*
//! branch    := atom ('&' atom)*
//! atom      := ('H1:' | 'H2:' | 'FT:')? term
//! term      := score | htft | exact | range | open | side | parity
//! score     := INT ':' INT          -- correct score, 1:0
//! htft      := res '/' res          -- halftime/fulltime, 1/X (never '-')
//! exact     := 'T' INT              -- exact goal count, T3
//! range     := INT '-' INT          -- goal range, 0-2
//! open      := INT '+'              -- open-ended range, 3+
//! side      := 'H' | 'A' | 'X'      -- team side / neither
//! parity    := 'GG' | 'NG'          -- both-teams-to-score yes/no
//! res       := '1' | 'X' | '2'
//! ```

/// One parsed term of a selection branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// `X:Y` correct score.
    Score(u8, u8),
    /// `r/r` halftime/fulltime result pair.
    HtFt(Res, Res),
    /// `T<n>` exact goal count.
    Exact(u8),
    /// `A-B` closed goal range.
    Range(u8, u8),
    /// `N+` open-ended range.
    AtLeast(u8),
    /// `H`, `A` or `X`.
    Side(Side),
    /// `GG` / `NG`.
    Btts(bool),
    /// Bare `1`, `X`, `2` result token inside a combo.
    Result(Res),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Res {
    Home,
    Draw,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
    Neither,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Full,
    FirstHalf,
    SecondHalf,
    /// `FT:` prefix inside a combo that also carries a half-scoped atom.
    FullTimeTagged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub scope: Scope,
    pub term: Term,
}

impl Res {
    fn from_byte(b: u8) -> Option<Res> {
        match b {
            b'1' => Some(Res::Home),
            b'X' => Some(Res::Draw),
            b'2' => Some(Res::Away),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Res::Home => "1",
            Res::Draw => "X",
            Res::Away => "2",
        }
    }
}

/// Parse a full selection string. Returns the OR-branches, each a list of
/// AND-ed atoms. An empty string is not a valid selection.
pub fn parse(selection: &str) -> Result<Vec<Vec<Atom>>, SelectionError> {
    if selection.is_empty() {
        return Err(SelectionError::Empty);
    }
    if !selection.is_ascii() {
        return Err(SelectionError::NotAscii);
    }
    selection
        .split('|')
        .map(parse_branch)
        .collect::<Result<Vec<_>, _>>()
}

pub fn is_valid(selection: &str) -> bool {
    parse(selection).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("empty selection")]
    Empty,
    #[error("selection contains non-ASCII bytes")]
    NotAscii,
    #[error("unrecognized term {0:?}")]
    BadTerm(String),
}

fn parse_branch(branch: &str) -> Result<Vec<Atom>, SelectionError> {
    if branch.is_empty() {
        return Err(SelectionError::Empty);
    }
    branch.split('&').map(parse_atom).collect()
}

fn parse_atom(atom: &str) -> Result<Atom, SelectionError> {
    let (scope, rest) = if let Some(rest) = atom.strip_prefix("H1:") {
        (Scope::FirstHalf, rest)
    } else if let Some(rest) = atom.strip_prefix("H2:") {
        (Scope::SecondHalf, rest)
    } else if let Some(rest) = atom.strip_prefix("FT:") {
        (Scope::FullTimeTagged, rest)
    } else {
        (Scope::Full, atom)
    };
    let term = parse_term(rest).ok_or_else(|| SelectionError::BadTerm(atom.to_string()))?;
    Ok(Atom { scope, term })
}

fn parse_term(s: &str) -> Option<Term> {
    let b = s.as_bytes();
    match b {
        b"GG" => return Some(Term::Btts(true)),
        b"NG" => return Some(Term::Btts(false)),
        b"H" => return Some(Term::Side(Side::Home)),
        b"A" => return Some(Term::Side(Side::Away)),
        _ => {}
    }
    // Single result token; 'X' doubles as Side::Neither in side-bearing
    // types, which the validator treats as equivalent.
    if b.len() == 1 {
        if b[0] == b'X' {
            return Some(Term::Side(Side::Neither));
        }
        return Res::from_byte(b[0]).map(Term::Result);
    }
    // T-prefixed exact count.
    if let Some(digits) = s.strip_prefix('T') {
        return digits.parse::<u8>().ok().map(Term::Exact);
    }
    // N+ open range.
    if let Some(digits) = s.strip_suffix('+') {
        return digits.parse::<u8>().ok().map(Term::AtLeast);
    }
    // X:Y correct score.
    if let Some((l, r)) = s.split_once(':') {
        let (l, r) = (l.parse::<u8>().ok()?, r.parse::<u8>().ok()?);
        return Some(Term::Score(l, r));
    }
    // r/r halftime-fulltime. The '-' form is a vendor artifact the codec
    // folds away before the grammar ever sees it.
    if let Some((l, r)) = s.split_once('/') {
        if l.len() == 1 && r.len() == 1 {
            let (l, r) = (Res::from_byte(l.as_bytes()[0])?, Res::from_byte(r.as_bytes()[0])?);
            return Some(Term::HtFt(l, r));
        }
        return None;
    }
    // A-B closed range.
    if let Some((l, r)) = s.split_once('-') {
        let (l, r) = (l.parse::<u8>().ok()?, r.parse::<u8>().ok()?);
        if l > r {
            return None;
        }
        return Some(Term::Range(l, r));
    }
    None
}

// --- Canonical constructors used by the codec and the adapters ---

pub fn score(home: u8, away: u8) -> String {
    format!("{}:{}", home, away)
}

pub fn exact_goals(n: u8) -> String {
    format!("T{}", n)
}

pub fn goal_range(lo: u8, hi: u8) -> String {
    format!("{}-{}", lo, hi)
}

pub fn at_least(n: u8) -> String {
    format!("{}+", n)
}

pub fn htft(half: Res, full: Res) -> String {
    format!("{}/{}", half.as_str(), full.as_str())
}

/// Render a parsed selection back to a human fragment for publisher labels.
pub fn human_fragment(selection: &str) -> String {
    match parse(selection) {
        Ok(branches) => branches
            .iter()
            .map(|branch| {
                branch
                    .iter()
                    .map(atom_label)
                    .collect::<Vec<_>>()
                    .join(" and ")
            })
            .collect::<Vec<_>>()
            .join(" or "),
        Err(_) => selection.to_string(),
    }
}

fn atom_label(atom: &Atom) -> String {
    let scope = match atom.scope {
        Scope::Full => "",
        Scope::FirstHalf => "1st half ",
        Scope::SecondHalf => "2nd half ",
        Scope::FullTimeTagged => "full time ",
    };
    let term = match &atom.term {
        Term::Score(h, a) => format!("{}:{}", h, a),
        Term::HtFt(h, f) => format!("{}/{}", h.as_str(), f.as_str()),
        Term::Exact(n) => format!("exactly {} goals", n),
        Term::Range(l, r) => format!("{}-{} goals", l, r),
        Term::AtLeast(n) => format!("{}+ goals", n),
        Term::Side(Side::Home) => "home".to_string(),
        Term::Side(Side::Away) => "away".to_string(),
        Term::Side(Side::Neither) => "neither".to_string(),
        Term::Btts(true) => "both score".to_string(),
        Term::Btts(false) => "not both score".to_string(),
        Term::Result(r) => r.as_str().to_string(),
    };
    format!("{}{}", scope, term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_grammar_examples() {
        for sel in [
            "H1:0-1", "H2:2+", "H", "A", "X", "H1:1+&FT:2+", "1&2-3", "1|3+", "1/X", "2/2",
            "1:0", "2:2", "T0", "T1", "T5", "0-2", "3+", "GG", "NG", "GG&3+",
        ] {
            assert!(is_valid(sel), "expected {:?} to parse", sel);
        }
    }

    #[test]
    fn rejects_vendor_artifacts() {
        // HT/FT must use '/', never '-'; '1-1' only reads as a degenerate
        // goal range, and '1-X' reads as nothing at all.
        assert!(!is_valid("1-X"));
        assert!(!is_valid(""));
        assert!(!is_valid("1&"));
        assert!(!is_valid("Tim1"));
        assert!(!is_valid("I:0-1"));
        assert!(!is_valid("5-3")); // inverted range
        assert!(!is_valid("žut karton"));
    }

    #[test]
    fn htft_parses_to_result_pair() {
        let parsed = parse("1/X").unwrap();
        assert_eq!(parsed[0][0].term, Term::HtFt(Res::Home, Res::Draw));
    }

    #[test]
    fn combo_scopes() {
        let parsed = parse("H1:1+&FT:2+").unwrap();
        assert_eq!(parsed[0][0].scope, Scope::FirstHalf);
        assert_eq!(parsed[0][1].scope, Scope::FullTimeTagged);
        assert_eq!(parsed[0][1].term, Term::AtLeast(2));
    }

    #[test]
    fn or_branches() {
        let parsed = parse("1|3+").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0][0].term, Term::Result(Res::Home));
        assert_eq!(parsed[1][0].term, Term::AtLeast(3));
    }

    #[test]
    fn constructors_round_trip_through_the_parser() {
        assert!(is_valid(&score(2, 1)));
        assert!(is_valid(&exact_goals(4)));
        assert!(is_valid(&goal_range(0, 2)));
        assert!(is_valid(&at_least(3)));
        assert!(is_valid(&htft(Res::Draw, Res::Away)));
    }
}
