//! Canonical market codec: projects provider-specific market codes, names
//! and parameters into the fixed `(bet_type_id, selection, margin)` key
//! space, and renders keys back to human labels for the publisher.
//!
//! The canonical key space is provider-independent. Two providers offering
//! the identical real-world wager must produce byte-identical keys, so all
//! vendor idiosyncrasies (sign conventions, separators, localized tokens)
//! are folded away here and nowhere else.

use super::selection;
use super::vocabulary::{self, BetTypeId, SportId};
use crate::providers::{self, Family, ProviderId};

/// The provider-independent canonical key of one wager.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketKey {
    pub bet_type: BetTypeId,
    /// Empty for arity-2/3 types; grammar-valid for arity-1.
    pub selection: String,
    /// Handicap line or total threshold; 0.0 for parameterless types.
    /// Signed lines use positive = home advantage.
    pub margin: f64,
}

/// A vendor market as the adapter saw it, before canonicalization.
#[derive(Debug, Clone)]
pub struct VendorMarket<'a> {
    pub code: &'a str,
    pub margin: Option<f64>,
    pub selection: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    Key(MarketKey),
    /// Unknown vendor code or a selection that cannot be folded into the
    /// grammar. Not an error: the caller logs it on the unmapped-market
    /// channel and moves on.
    Unmapped(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowViolation {
    #[error("unknown bet type {0}")]
    UnknownBetType(BetTypeId),
    #[error("bet type {bet_type} has arity {arity} but the row carries {given} prices")]
    PriceCountMismatch { bet_type: BetTypeId, arity: u8, given: u8 },
    #[error("price {0} is not a decimal price above 1.0")]
    NonDecimalPrice(f64),
    #[error("selection {0:?} fails the grammar")]
    BadSelection(String),
    #[error("bet type {0} carries a selection but has arity above one")]
    UnexpectedSelection(BetTypeId),
    #[error("bet type {0} requires a selection")]
    MissingSelection(BetTypeId),
    #[error("bet type {0} is parameterless but margin is {1}")]
    UnexpectedMargin(BetTypeId, f64),
}

pub fn encode(provider: ProviderId, sport: SportId, market: VendorMarket) -> EncodeOutcome {
    let family = match providers::family(provider) {
        Some(f) => f,
        None => return EncodeOutcome::Unmapped(format!("provider {}", provider)),
    };

    let bet_type_id = match family {
        Family::Platform => platform_code(market.code),
        Family::Structured => betstar_code(market.code),
        Family::Compressed => pulsbet_code(sport, market.code),
    };
    let Some(mut bet_type_id) = bet_type_id else {
        return EncodeOutcome::Unmapped(market.code.to_string());
    };
    let Some(bt) = vocabulary::bet_type(bet_type_id) else {
        return EncodeOutcome::Unmapped(market.code.to_string());
    };

    let mut margin = match (bt.margined, market.margin) {
        (true, Some(m)) => m,
        (true, None) => return EncodeOutcome::Unmapped(format!("{} without line", market.code)),
        (false, _) => 0.0,
    };
    if bt.margined && family == Family::Platform && is_football_handicap(bet_type_id, sport) {
        // The platform backend quotes football handicap lines from the away
        // side; canonical lines are positive = home advantage.
        margin = -margin;
    }
    margin = round_margin(margin);

    let mut sel = match market.selection {
        Some(s) => fold_selection(family, bet_type_id, s),
        None => String::new(),
    };

    // Standalone digits under a goal-range market are really exact-goal
    // wagers; re-route them so `3` and `T3` can never coexist as two keys.
    if bet_type_id == vocabulary::GOAL_RANGE && !sel.is_empty() && sel.bytes().all(|b| b.is_ascii_digit())
    {
        bet_type_id = vocabulary::EXACT_GOALS;
        sel = format!("T{}", sel);
    }

    if bt.arity == 1 {
        if sel.is_empty() || !selection::is_valid(&sel) {
            return EncodeOutcome::Unmapped(format!("{} selection {:?}", market.code, sel));
        }
    } else {
        sel.clear();
    }

    EncodeOutcome::Key(MarketKey { bet_type: bet_type_id, selection: sel, margin })
}

/// Resolve a vendor code to its bet type without forming a key. Adapters
/// use this to pick the right price-field layout before encoding.
pub fn lookup(
    provider: ProviderId,
    sport: SportId,
    code: &str,
) -> Option<&'static vocabulary::BetType> {
    let family = providers::family(provider)?;
    let id = match family {
        Family::Platform => platform_code(code),
        Family::Structured => betstar_code(code),
        Family::Compressed => pulsbet_code(sport, code),
    }?;
    vocabulary::bet_type(id)
}

/// Human-readable label for publisher payloads.
pub fn decode(key: &MarketKey) -> String {
    let Some(bt) = vocabulary::bet_type(key.bet_type) else {
        return format!("bet type {}", key.bet_type);
    };
    let mut label = bt.name.to_string();
    if bt.margined {
        label.push_str(&format!(" {}", format_margin(key.margin)));
    }
    if !key.selection.is_empty() {
        label.push_str(&format!(" {}", selection::human_fragment(&key.selection)));
    }
    label
}

/// Reject rows whose arity, price count, selection syntax or margin violate
/// the canonical contract. Prices are positional: index 0 is outcome 1,
/// index 1 outcome 2, index 2 the draw-or-third outcome.
pub fn validate(key: &MarketKey, prices: &[Option<f64>; 3]) -> Result<(), RowViolation> {
    let bt = vocabulary::bet_type(key.bet_type)
        .ok_or(RowViolation::UnknownBetType(key.bet_type))?;

    let given = prices.iter().take_while(|p| p.is_some()).count() as u8;
    if given != bt.arity || prices.iter().skip(given as usize).any(|p| p.is_some()) {
        return Err(RowViolation::PriceCountMismatch {
            bet_type: bt.id,
            arity: bt.arity,
            given: prices.iter().filter(|p| p.is_some()).count() as u8,
        });
    }
    for price in prices.iter().flatten() {
        if !price.is_finite() || *price <= 1.0 {
            return Err(RowViolation::NonDecimalPrice(*price));
        }
    }

    match (bt.arity, key.selection.is_empty()) {
        (1, true) => return Err(RowViolation::MissingSelection(bt.id)),
        (1, false) => {
            if !selection::is_valid(&key.selection) {
                return Err(RowViolation::BadSelection(key.selection.clone()));
            }
        }
        (_, false) => return Err(RowViolation::UnexpectedSelection(bt.id)),
        (_, true) => {}
    }

    if !bt.margined && key.margin != 0.0 {
        return Err(RowViolation::UnexpectedMargin(bt.id, key.margin));
    }
    Ok(())
}

fn round_margin(m: f64) -> f64 {
    let r = (m * 100.0).round() / 100.0;
    if r == 0.0 {
        0.0 // collapse -0.0
    } else {
        r
    }
}

fn format_margin(m: f64) -> String {
    if (m.fract()).abs() < f64::EPSILON {
        format!("{:+.0}", m)
    } else {
        format!("{:+}", m)
    }
}

fn is_football_handicap(bet_type: BetTypeId, sport: SportId) -> bool {
    sport == vocabulary::FOOTBALL
        && matches!(
            bet_type,
            vocabulary::EUROPEAN_HANDICAP | vocabulary::ASIAN_HANDICAP | vocabulary::ASIAN_HANDICAP_H1
        )
}

// --- Selection folds -------------------------------------------------------

fn fold_selection(family: Family, bet_type: BetTypeId, raw: &str) -> String {
    let folded = match family {
        Family::Platform => fold_platform_tokens(raw),
        _ => raw.to_string(),
    };
    if bet_type == vocabulary::HALFTIME_FULLTIME {
        return fold_htft_separator(&folded);
    }
    folded
}

/// The platform family emits Roman-numeral half prefixes and localized team
/// and BTTS tokens (`Tim1`, `Tim2`, `GG`, `NG`). Fold them into the
/// canonical vocabulary atom by atom so combos survive intact.
fn fold_platform_tokens(raw: &str) -> String {
    raw.split('|')
        .map(|branch| {
            branch
                .split('&')
                .map(fold_platform_atom)
                .collect::<Vec<_>>()
                .join("&")
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn fold_platform_atom(atom: &str) -> String {
    let atom = atom.trim();
    match atom {
        "Tim1" => return "H".to_string(),
        "Tim2" => return "A".to_string(),
        _ => {}
    }
    if let Some(rest) = atom.strip_prefix("II:") {
        return format!("H2:{}", rest);
    }
    if let Some(rest) = atom.strip_prefix("I:") {
        return format!("H1:{}", rest);
    }
    atom.to_string()
}

/// One structured provider separates halftime/fulltime with `-`; canonical
/// form is `/`.
fn fold_htft_separator(raw: &str) -> String {
    let b = raw.as_bytes();
    if b.len() == 3 && (b[1] == b'-' || b[1] == b'/') {
        let res = |c: u8| matches!(c, b'1' | b'X' | b'2');
        if res(b[0]) && res(b[2]) {
            return format!("{}/{}", b[0] as char, b[2] as char);
        }
    }
    raw.to_string()
}

// --- Vendor code tables -----------------------------------------------------

/// Platform family short codes, shared by every deployment of the backend.
fn platform_code(code: &str) -> Option<BetTypeId> {
    use vocabulary::*;
    let id = match code {
        "ki" => FULL_TIME_1X2,
        "ki1" => FIRST_HALF_1X2,
        "ki2" => SECOND_HALF_1X2,
        "ds" => DOUBLE_CHANCE,
        "ds1" => DOUBLE_CHANCE_H1,
        "ds2" => DOUBLE_CHANCE_H2,
        "eh" => EUROPEAN_HANDICAP,
        "ah" => ASIAN_HANDICAP,
        "ah1" => ASIAN_HANDICAP_H1,
        "ug" => TOTAL_GOALS,
        "ug1" => TOTAL_GOALS_H1,
        "ug2" => TOTAL_GOALS_H2,
        "ugd" => HOME_TOTAL_GOALS,
        "ugg" => AWAY_TOTAL_GOALS,
        "gg" => BTTS,
        "gg1" => BTTS_H1,
        "gg2" => BTTS_H2,
        "pn" => ODD_EVEN_GOALS,
        "dnb" => DRAW_NO_BET,
        "pkr" => HALFTIME_FULLTIME,
        "tr" => CORRECT_SCORE,
        "tbg" => EXACT_GOALS,
        "rg" => GOAL_RANGE,
        "pg" => FIRST_GOAL,
        "kitg" => RESULT_TOTAL_COMBO,
        "pol" => HALF_GOALS_COMBO,
        "ggtg" => BTTS_TOTAL_COMBO,
        "timg" => TEAM_GOALS_COMBO,
        "bp" => WIN_TO_NIL,
        "bbw" => BB_WINNER,
        "bbh" => BB_HANDICAP,
        "bbt" => BB_TOTAL_POINTS,
        "bbtd" => BB_HOME_TOTAL,
        "bbtg" => BB_AWAY_TOTAL,
        "bbpn" => BB_ODD_EVEN,
        "bbki1" => BB_FIRST_HALF_1X2,
        "bbt1" => BB_FIRST_HALF_TOTAL,
        "tnw" => TN_WINNER,
        "tng" => TN_TOTAL_GAMES,
        "tngh" => TN_GAME_HANDICAP,
        "tnsh" => TN_SET_HANDICAP,
        "tns1" => TN_FIRST_SET_WINNER,
        "tnts" => TN_CORRECT_SETS_BO3,
        "tnpn" => TN_SET_ODD_EVEN,
        "hkki" => HK_1X2,
        "hkug" => HK_TOTAL_GOALS,
        "hkh" => HK_HANDICAP,
        "hkdnb" => HK_DRAW_NO_BET,
        "hkgg" => HK_BTTS,
        "hkpn" => HK_ODD_EVEN,
        "ttw" => TT_WINNER,
        "ttug" => TT_TOTAL_POINTS,
        "tth" => TT_POINT_HANDICAP,
        "ttts" => TT_CORRECT_SETS_BO5,
        "tts1" => TT_FIRST_SET_WINNER,
        _ => return None,
    };
    Some(id)
}

/// Structured provider first-class bet type ids (stringified integers).
fn betstar_code(code: &str) -> Option<BetTypeId> {
    use vocabulary::*;
    let id = match code {
        "110" => FULL_TIME_1X2,
        "111" => FIRST_HALF_1X2,
        "112" => SECOND_HALF_1X2,
        "120" => DOUBLE_CHANCE,
        "130" => EUROPEAN_HANDICAP,
        "131" => ASIAN_HANDICAP,
        "132" => ASIAN_HANDICAP_H1,
        "140" => HALFTIME_FULLTIME,
        "150" => TOTAL_GOALS,
        "151" => TOTAL_GOALS_H1,
        "152" => TOTAL_GOALS_H2,
        "153" => HOME_TOTAL_GOALS,
        "154" => AWAY_TOTAL_GOALS,
        "160" => BTTS,
        "161" => BTTS_H1,
        "170" => ODD_EVEN_GOALS,
        "180" => DRAW_NO_BET,
        "190" => CORRECT_SCORE,
        "200" => EXACT_GOALS,
        "210" => GOAL_RANGE,
        "220" => FIRST_GOAL,
        "230" => RESULT_TOTAL_COMBO,
        "240" => BTTS_TOTAL_COMBO,
        "250" => WIN_TO_NIL,
        "310" => BB_WINNER,
        "311" => BB_HANDICAP,
        "312" => BB_TOTAL_POINTS,
        "313" => BB_FIRST_HALF_1X2,
        "314" => BB_FIRST_HALF_TOTAL,
        "410" => TN_WINNER,
        "411" => TN_TOTAL_GAMES,
        "412" => TN_GAME_HANDICAP,
        "413" => TN_SET_HANDICAP,
        "414" => TN_FIRST_SET_WINNER,
        "415" => TN_CORRECT_SETS_BO3,
        "510" => HK_1X2,
        "511" => HK_TOTAL_GOALS,
        "512" => HK_HANDICAP,
        "513" => HK_DRAW_NO_BET,
        "514" => HK_BTTS,
        "610" => TT_WINNER,
        "611" => TT_TOTAL_POINTS,
        "612" => TT_POINT_HANDICAP,
        "613" => TT_CORRECT_SETS_BO5,
        _ => return None,
    };
    Some(id)
}

/// Compressed-overview market names. A few are sport-dependent because the
/// vendor reuses the same name across sports.
fn pulsbet_code(sport: SportId, code: &str) -> Option<BetTypeId> {
    use vocabulary::*;
    let id = match (code, sport) {
        ("1x2", FOOTBALL) => FULL_TIME_1X2,
        ("1x2h1", FOOTBALL) => FIRST_HALF_1X2,
        ("1x2h2", FOOTBALL) => SECOND_HALF_1X2,
        ("1x2", HOCKEY) => HK_1X2,
        ("dc", FOOTBALL) => DOUBLE_CHANCE,
        ("ehnd", FOOTBALL) => EUROPEAN_HANDICAP,
        ("hnd", FOOTBALL) => ASIAN_HANDICAP,
        ("hndh1", FOOTBALL) => ASIAN_HANDICAP_H1,
        ("hnd", BASKETBALL) => BB_HANDICAP,
        ("hnd", TENNIS) => TN_GAME_HANDICAP,
        ("hnd", HOCKEY) => HK_HANDICAP,
        ("hnd", TABLE_TENNIS) => TT_POINT_HANDICAP,
        ("tot", FOOTBALL) => TOTAL_GOALS,
        ("toth1", FOOTBALL) => TOTAL_GOALS_H1,
        ("toth2", FOOTBALL) => TOTAL_GOALS_H2,
        ("toth", FOOTBALL) => HOME_TOTAL_GOALS,
        ("tota", FOOTBALL) => AWAY_TOTAL_GOALS,
        ("tot", BASKETBALL) => BB_TOTAL_POINTS,
        ("tot", TENNIS) => TN_TOTAL_GAMES,
        ("tot", HOCKEY) => HK_TOTAL_GOALS,
        ("tot", TABLE_TENNIS) => TT_TOTAL_POINTS,
        ("bts", FOOTBALL) => BTTS,
        ("bts", HOCKEY) => HK_BTTS,
        ("oe", FOOTBALL) => ODD_EVEN_GOALS,
        ("oe", BASKETBALL) => BB_ODD_EVEN,
        ("oe", HOCKEY) => HK_ODD_EVEN,
        ("dnb", FOOTBALL) => DRAW_NO_BET,
        ("dnb", HOCKEY) => HK_DRAW_NO_BET,
        ("htft", FOOTBALL) => HALFTIME_FULLTIME,
        ("cs", FOOTBALL) => CORRECT_SCORE,
        ("xg", FOOTBALL) => EXACT_GOALS,
        ("rng", FOOTBALL) => GOAL_RANGE,
        ("fg", FOOTBALL) => FIRST_GOAL,
        ("wnr", BASKETBALL) => BB_WINNER,
        ("wnr", TENNIS) => TN_WINNER,
        ("wnr", TABLE_TENNIS) => TT_WINNER,
        ("set1", TENNIS) => TN_FIRST_SET_WINNER,
        ("set1", TABLE_TENNIS) => TT_FIRST_SET_WINNER,
        ("sets", TENNIS) => TN_CORRECT_SETS_BO3,
        ("sets", TABLE_TENNIS) => TT_CORRECT_SETS_BO5,
        _ => return None,
    };
    Some(id)
}
