//! Cross-provider audit: the same real-world wagers expressed in every
//! vendor payload shape must land on byte-identical canonical keys, and the
//! engine must be able to combine the resulting rows.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use oddsradar::adapters::betstar::{parse_offer, BetstarOffer};
use oddsradar::adapters::platform::parse_events;
use oddsradar::adapters::pulsbet::parse_feed;
use oddsradar::adapters::{RawMatch, RawOdds};
use oddsradar::arbitrage::{self, InputRow};
use oddsradar::markets::codec;
use oddsradar::markets::vocabulary::{
    ASIAN_HANDICAP, EXACT_GOALS, FOOTBALL, FULL_TIME_1X2, GOAL_RANGE, HALFTIME_FULLTIME,
    TOTAL_GOALS,
};
use oddsradar::providers::{BETSTAR, TOPBET};
use oddsradar::stats::Stats;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn platform_match() -> RawMatch {
    let payload = serde_json::from_str(&read_fixture("platform_events.json")).unwrap();
    let mut matches = parse_events(TOPBET, FOOTBALL, &payload, &HashMap::new(), &Stats::new());
    assert_eq!(matches.len(), 1);
    matches.remove(0)
}

fn betstar_match() -> RawMatch {
    let offer: BetstarOffer =
        serde_json::from_str(&read_fixture("betstar_offer.json")).unwrap();
    let mut matches = parse_offer(FOOTBALL, offer, &Stats::new());
    assert_eq!(matches.len(), 1);
    matches.remove(0)
}

fn pulsbet_match() -> RawMatch {
    let payload = serde_json::from_str(&read_fixture("pulsbet_feed.json")).unwrap();
    let mut matches = parse_feed(FOOTBALL, &payload, &Stats::new());
    assert_eq!(matches.len(), 1);
    matches.remove(0)
}

fn find<'a>(m: &'a RawMatch, bet_type: i16, selection: &str) -> &'a RawOdds {
    m.odds
        .iter()
        .find(|o| o.key.bet_type == bet_type && o.key.selection == selection)
        .unwrap_or_else(|| panic!("no row for bet type {} selection {:?}", bet_type, selection))
}

fn as_input(m: &RawMatch, match_id: i64) -> Vec<InputRow> {
    m.odds
        .iter()
        .map(|o| InputRow {
            match_id,
            provider_id: m.provider,
            bet_type: o.key.bet_type,
            margin: o.key.margin,
            selection: o.key.selection.clone(),
            prices: o.prices(),
            start_time: m.start_time,
        })
        .collect()
}

#[test]
fn htft_separator_converges_across_shapes() {
    let platform = platform_match();
    let betstar = betstar_match();
    let pulsbet = pulsbet_match();

    let a = find(&platform, HALFTIME_FULLTIME, "1/1");
    let b = find(&betstar, HALFTIME_FULLTIME, "1/1");
    let c = find(&pulsbet, HALFTIME_FULLTIME, "1/1");
    assert_eq!(a.key, b.key);
    assert_eq!(b.key, c.key);
    assert_eq!(codec::decode(&a.key), "HT/FT 1/1");

    // The dash form never survives into the canonical space.
    assert!(betstar
        .odds
        .iter()
        .all(|o| !o.key.selection.contains('-') || o.key.bet_type != HALFTIME_FULLTIME));
}

#[test]
fn handicap_sign_converges_on_home_advantage() {
    let platform = platform_match();
    let betstar = betstar_match();

    let a = find(&platform, ASIAN_HANDICAP, "");
    let b = find(&betstar, ASIAN_HANDICAP, "");
    // Vendor X quoted the line as -1.0, vendor Y as +1.0; one wager, one key.
    assert_eq!(a.key, b.key);
    assert_eq!(a.key.margin, 1.0);

    // Four comparable prices, two per side, in one engine group.
    let mut rows = as_input(&platform, 7);
    rows.extend(as_input(&betstar, 7));
    let ah_rows: Vec<_> = rows.iter().filter(|r| r.bet_type == ASIAN_HANDICAP).collect();
    assert_eq!(ah_rows.len(), 2);
    let best_home = ah_rows.iter().filter_map(|r| r.prices[0]).fold(0.0, f64::max);
    let best_away = ah_rows.iter().filter_map(|r| r.prices[1]).fold(0.0, f64::max);
    assert_eq!(best_home, 1.72);
    assert_eq!(best_away, 2.10);
}

#[test]
fn goal_range_digit_reroutes_everywhere() {
    let platform = platform_match();
    let pulsbet = pulsbet_match();

    let a = find(&platform, EXACT_GOALS, "T3");
    let b = find(&pulsbet, EXACT_GOALS, "T3");
    assert_eq!(a.key, b.key);

    // Real ranges stay goal-range rows.
    assert_eq!(find(&platform, GOAL_RANGE, "0-2").key, find(&pulsbet, GOAL_RANGE, "0-2").key);
}

#[test]
fn totals_share_a_line_key() {
    let platform = platform_match();
    let betstar = betstar_match();
    let pulsbet = pulsbet_match();
    let a = find(&platform, TOTAL_GOALS, "");
    let b = find(&betstar, TOTAL_GOALS, "");
    let c = find(&pulsbet, TOTAL_GOALS, "");
    assert_eq!(a.key, b.key);
    assert_eq!(b.key, c.key);
    assert_eq!(a.key.margin, 2.5);
}

#[test]
fn cross_provider_1x2_arbitrage_detects_once() {
    // Platform quotes (2.10, 3.50, 4.20), the structured book
    // (2.30, 3.60, 3.80): best legs 2.30 / 4.20 / 3.60, about 5.19% profit.
    let platform = platform_match();
    let betstar = betstar_match();
    let mut rows = as_input(&platform, 7);
    rows.extend(as_input(&betstar, 7));

    let found = arbitrage::detect(&rows, 0.5);
    let opp = found
        .iter()
        .find(|o| o.bet_type == FULL_TIME_1X2)
        .expect("1X2 group should arb");

    assert!((opp.profit_pct - 5.19).abs() < 1e-9);
    let prices: Vec<f64> = opp.legs.iter().map(|l| l.price).collect();
    assert_eq!(prices, vec![2.30, 4.20, 3.60]);
    let providers: Vec<i16> = opp.legs.iter().map(|l| l.provider_id).collect();
    assert_eq!(providers, vec![BETSTAR, TOPBET, BETSTAR]);
    assert!((opp.stakes.iter().sum::<f64>() - 1.0).abs() <= 1e-9);

    // Re-detection of unchanged rows yields the identical content hash.
    let again = arbitrage::detect(&rows, 0.5);
    let opp_again = again.iter().find(|o| o.bet_type == FULL_TIME_1X2).unwrap();
    assert_eq!(opp.content_hash, opp_again.content_hash);
}

#[test]
fn localized_platform_combos_fold_into_grammar() {
    let platform = platform_match();
    assert!(platform.odds.iter().any(|o| o.key.selection == "H&GG"));
    assert!(platform.odds.iter().any(|o| o.key.selection == "H1:1+&FT:2+"));
    // Nothing localized leaks through.
    assert!(platform.odds.iter().all(|o| !o.key.selection.contains("Tim")));
    assert!(platform.odds.iter().all(|o| !o.key.selection.starts_with("I:")));
}

#[test]
fn unmapped_markets_never_reach_rows() {
    let payload = serde_json::json!({
        "events": [{
            "id": 1, "home": "A", "away": "B", "kickoff": 1_786_816_800,
            "odds": {"mystery_market": {"1": 2.0, "2": 1.8}}
        }]
    });
    let stats = Stats::new();
    let matches = parse_events(TOPBET, FOOTBALL, &payload, &HashMap::new(), &stats);
    assert!(matches[0].odds.is_empty());
    assert_eq!(stats.snapshot().unmapped_markets, 1);

    let pulsbet = serde_json::json!({
        "g": [{"b": "A - B", "d": 1_786_816_800, "h": [{"n": "mystery", "o": [2.0]}]}]
    });
    let stats = Stats::new();
    let matches = parse_feed(FOOTBALL, &pulsbet, &stats);
    assert!(matches[0].odds.is_empty());
    assert_eq!(stats.snapshot().unmapped_markets, 1);
}

#[test]
fn every_emitted_row_validates() {
    for m in [platform_match(), betstar_match(), pulsbet_match()] {
        for odds in &m.odds {
            codec::validate(&odds.key, &odds.prices())
                .unwrap_or_else(|v| panic!("row {:?} violates the contract: {}", odds.key, v));
        }
    }
}

#[test]
fn vendor_orderings_agree_on_the_draw_slot() {
    let platform = platform_match();
    let pulsbet = pulsbet_match();
    let a = find(&platform, FULL_TIME_1X2, "");
    let c = find(&pulsbet, FULL_TIME_1X2, "");
    // Both adapters park the draw in the third price field.
    assert_eq!((a.p1, a.p2, a.p3), (2.10, Some(4.20), Some(3.50)));
    assert_eq!((c.p1, c.p2, c.p3), (2.25, Some(3.90), Some(3.40)));
}
