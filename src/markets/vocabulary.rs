//! The closed bet-type vocabulary every provider market is projected into.
//!
//! The table is append-only: ids are stable, new entries go at the end of
//! their sport block. `validate_table` runs at startup so a bad edit fails
//! fast instead of corrupting the canonical key space.

pub type BetTypeId = i16;
pub type SportId = i16;

pub const FOOTBALL: SportId = 1;
pub const BASKETBALL: SportId = 2;
pub const TENNIS: SportId = 3;
pub const HOCKEY: SportId = 4;
pub const TABLE_TENNIS: SportId = 5;

pub struct Sport {
    pub id: SportId,
    pub name: &'static str,
}

pub const SPORTS: &[Sport] = &[
    Sport { id: FOOTBALL, name: "football" },
    Sport { id: BASKETBALL, name: "basketball" },
    Sport { id: TENNIS, name: "tennis" },
    Sport { id: HOCKEY, name: "hockey" },
    Sport { id: TABLE_TENNIS, name: "table tennis" },
];

pub fn sport_name(id: SportId) -> &'static str {
    SPORTS.iter().find(|s| s.id == id).map(|s| s.name).unwrap_or("unknown")
}

/// Resolver time window per sport, in minutes either side of the observed
/// start time.
pub fn candidate_window_minutes(sport: SportId) -> i64 {
    match sport {
        TENNIS | TABLE_TENNIS => 30,
        _ => 120,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BetType {
    pub id: BetTypeId,
    pub name: &'static str,
    /// How many price fields a row of this type carries (1, 2 or 3).
    pub arity: u8,
    /// Whether the numeric margin parameter is meaningful (handicap line,
    /// total threshold). Margin must be 0.0 otherwise.
    pub margined: bool,
    /// For arity-1 types only: the complete outcome partition, when one is
    /// declared. A partition is the exhaustive set of selections whose best
    /// prices may be combined into an arbitrage. `None` means rows of this
    /// type are never combined.
    pub partition: Option<&'static [&'static str]>,
}

const HTFT_PARTITION: &[&str] = &[
    "1/1", "1/X", "1/2", "X/1", "X/X", "X/2", "2/1", "2/X", "2/2",
];
const FIRST_GOAL_PARTITION: &[&str] = &["H", "X", "A"];
const BO3_SETS_PARTITION: &[&str] = &["2:0", "2:1", "0:2", "1:2"];
const BO5_SETS_PARTITION: &[&str] = &["3:0", "3:1", "3:2", "0:3", "1:3", "2:3"];

// Football 1-39, basketball 40-59, tennis 60-79, hockey 80-99,
// table tennis 100-119.
pub const FULL_TIME_1X2: BetTypeId = 1;
pub const FIRST_HALF_1X2: BetTypeId = 2;
pub const SECOND_HALF_1X2: BetTypeId = 3;
pub const DOUBLE_CHANCE: BetTypeId = 4;
pub const DOUBLE_CHANCE_H1: BetTypeId = 5;
pub const DOUBLE_CHANCE_H2: BetTypeId = 6;
pub const EUROPEAN_HANDICAP: BetTypeId = 7;
pub const ASIAN_HANDICAP: BetTypeId = 8;
pub const ASIAN_HANDICAP_H1: BetTypeId = 9;
pub const TOTAL_GOALS: BetTypeId = 10;
pub const TOTAL_GOALS_H1: BetTypeId = 11;
pub const TOTAL_GOALS_H2: BetTypeId = 12;
pub const HOME_TOTAL_GOALS: BetTypeId = 13;
pub const AWAY_TOTAL_GOALS: BetTypeId = 14;
pub const BTTS: BetTypeId = 15;
pub const BTTS_H1: BetTypeId = 16;
pub const BTTS_H2: BetTypeId = 17;
pub const ODD_EVEN_GOALS: BetTypeId = 18;
pub const DRAW_NO_BET: BetTypeId = 19;
pub const HALFTIME_FULLTIME: BetTypeId = 20;
pub const CORRECT_SCORE: BetTypeId = 21;
pub const EXACT_GOALS: BetTypeId = 22;
pub const GOAL_RANGE: BetTypeId = 23;
pub const FIRST_GOAL: BetTypeId = 24;
pub const RESULT_TOTAL_COMBO: BetTypeId = 25;
pub const HALF_GOALS_COMBO: BetTypeId = 26;
pub const BTTS_TOTAL_COMBO: BetTypeId = 27;
pub const TEAM_GOALS_COMBO: BetTypeId = 28;
pub const WIN_TO_NIL: BetTypeId = 29;

pub const BB_WINNER: BetTypeId = 40;
pub const BB_HANDICAP: BetTypeId = 41;
pub const BB_TOTAL_POINTS: BetTypeId = 42;
pub const BB_HOME_TOTAL: BetTypeId = 43;
pub const BB_AWAY_TOTAL: BetTypeId = 44;
pub const BB_ODD_EVEN: BetTypeId = 45;
pub const BB_FIRST_HALF_1X2: BetTypeId = 46;
pub const BB_FIRST_HALF_TOTAL: BetTypeId = 47;

pub const TN_WINNER: BetTypeId = 60;
pub const TN_TOTAL_GAMES: BetTypeId = 61;
pub const TN_GAME_HANDICAP: BetTypeId = 62;
pub const TN_SET_HANDICAP: BetTypeId = 63;
pub const TN_FIRST_SET_WINNER: BetTypeId = 64;
pub const TN_CORRECT_SETS_BO3: BetTypeId = 65;
pub const TN_SET_ODD_EVEN: BetTypeId = 66;

pub const HK_1X2: BetTypeId = 80;
pub const HK_TOTAL_GOALS: BetTypeId = 81;
pub const HK_HANDICAP: BetTypeId = 82;
pub const HK_DRAW_NO_BET: BetTypeId = 83;
pub const HK_BTTS: BetTypeId = 84;
pub const HK_ODD_EVEN: BetTypeId = 85;

pub const TT_WINNER: BetTypeId = 100;
pub const TT_TOTAL_POINTS: BetTypeId = 101;
pub const TT_POINT_HANDICAP: BetTypeId = 102;
pub const TT_CORRECT_SETS_BO5: BetTypeId = 103;
pub const TT_FIRST_SET_WINNER: BetTypeId = 104;

pub const BET_TYPES: &[BetType] = &[
    BetType { id: FULL_TIME_1X2, name: "1X2", arity: 3, margined: false, partition: None },
    BetType { id: FIRST_HALF_1X2, name: "1st Half 1X2", arity: 3, margined: false, partition: None },
    BetType { id: SECOND_HALF_1X2, name: "2nd Half 1X2", arity: 3, margined: false, partition: None },
    BetType { id: DOUBLE_CHANCE, name: "Double Chance", arity: 3, margined: false, partition: None },
    BetType { id: DOUBLE_CHANCE_H1, name: "1st Half Double Chance", arity: 3, margined: false, partition: None },
    BetType { id: DOUBLE_CHANCE_H2, name: "2nd Half Double Chance", arity: 3, margined: false, partition: None },
    BetType { id: EUROPEAN_HANDICAP, name: "European Handicap", arity: 3, margined: true, partition: None },
    BetType { id: ASIAN_HANDICAP, name: "Asian Handicap", arity: 2, margined: true, partition: None },
    BetType { id: ASIAN_HANDICAP_H1, name: "1st Half Asian Handicap", arity: 2, margined: true, partition: None },
    BetType { id: TOTAL_GOALS, name: "Total Goals", arity: 2, margined: true, partition: None },
    BetType { id: TOTAL_GOALS_H1, name: "1st Half Total Goals", arity: 2, margined: true, partition: None },
    BetType { id: TOTAL_GOALS_H2, name: "2nd Half Total Goals", arity: 2, margined: true, partition: None },
    BetType { id: HOME_TOTAL_GOALS, name: "Home Team Total Goals", arity: 2, margined: true, partition: None },
    BetType { id: AWAY_TOTAL_GOALS, name: "Away Team Total Goals", arity: 2, margined: true, partition: None },
    BetType { id: BTTS, name: "Both Teams To Score", arity: 2, margined: false, partition: None },
    BetType { id: BTTS_H1, name: "Both Teams To Score 1st Half", arity: 2, margined: false, partition: None },
    BetType { id: BTTS_H2, name: "Both Teams To Score 2nd Half", arity: 2, margined: false, partition: None },
    BetType { id: ODD_EVEN_GOALS, name: "Odd/Even Goals", arity: 2, margined: false, partition: None },
    BetType { id: DRAW_NO_BET, name: "Draw No Bet", arity: 2, margined: false, partition: None },
    BetType { id: HALFTIME_FULLTIME, name: "HT/FT", arity: 1, margined: false, partition: Some(HTFT_PARTITION) },
    BetType { id: CORRECT_SCORE, name: "Correct Score", arity: 1, margined: false, partition: None },
    BetType { id: EXACT_GOALS, name: "Exact Goals", arity: 1, margined: false, partition: None },
    BetType { id: GOAL_RANGE, name: "Goal Range", arity: 1, margined: false, partition: None },
    BetType { id: FIRST_GOAL, name: "First Goal", arity: 1, margined: false, partition: Some(FIRST_GOAL_PARTITION) },
    BetType { id: RESULT_TOTAL_COMBO, name: "Result & Total Goals", arity: 1, margined: false, partition: None },
    BetType { id: HALF_GOALS_COMBO, name: "Goals Per Half Combo", arity: 1, margined: false, partition: None },
    BetType { id: BTTS_TOTAL_COMBO, name: "BTTS & Total Goals", arity: 1, margined: false, partition: None },
    BetType { id: TEAM_GOALS_COMBO, name: "Team Goals Combo", arity: 1, margined: false, partition: None },
    BetType { id: WIN_TO_NIL, name: "Win To Nil", arity: 2, margined: false, partition: None },
    BetType { id: BB_WINNER, name: "Winner (incl. OT)", arity: 2, margined: false, partition: None },
    BetType { id: BB_HANDICAP, name: "Point Handicap", arity: 2, margined: true, partition: None },
    BetType { id: BB_TOTAL_POINTS, name: "Total Points", arity: 2, margined: true, partition: None },
    BetType { id: BB_HOME_TOTAL, name: "Home Team Total Points", arity: 2, margined: true, partition: None },
    BetType { id: BB_AWAY_TOTAL, name: "Away Team Total Points", arity: 2, margined: true, partition: None },
    BetType { id: BB_ODD_EVEN, name: "Odd/Even Points", arity: 2, margined: false, partition: None },
    BetType { id: BB_FIRST_HALF_1X2, name: "1st Half 1X2 (Basketball)", arity: 3, margined: false, partition: None },
    BetType { id: BB_FIRST_HALF_TOTAL, name: "1st Half Total Points", arity: 2, margined: true, partition: None },
    BetType { id: TN_WINNER, name: "Match Winner", arity: 2, margined: false, partition: None },
    BetType { id: TN_TOTAL_GAMES, name: "Total Games", arity: 2, margined: true, partition: None },
    BetType { id: TN_GAME_HANDICAP, name: "Game Handicap", arity: 2, margined: true, partition: None },
    BetType { id: TN_SET_HANDICAP, name: "Set Handicap", arity: 2, margined: true, partition: None },
    BetType { id: TN_FIRST_SET_WINNER, name: "1st Set Winner", arity: 2, margined: false, partition: None },
    BetType { id: TN_CORRECT_SETS_BO3, name: "Correct Score In Sets", arity: 1, margined: false, partition: Some(BO3_SETS_PARTITION) },
    BetType { id: TN_SET_ODD_EVEN, name: "Odd/Even Games", arity: 2, margined: false, partition: None },
    BetType { id: HK_1X2, name: "1X2 (Hockey)", arity: 3, margined: false, partition: None },
    BetType { id: HK_TOTAL_GOALS, name: "Total Goals (Hockey)", arity: 2, margined: true, partition: None },
    BetType { id: HK_HANDICAP, name: "Goal Handicap (Hockey)", arity: 2, margined: true, partition: None },
    BetType { id: HK_DRAW_NO_BET, name: "Draw No Bet (Hockey)", arity: 2, margined: false, partition: None },
    BetType { id: HK_BTTS, name: "Both Teams To Score (Hockey)", arity: 2, margined: false, partition: None },
    BetType { id: HK_ODD_EVEN, name: "Odd/Even Goals (Hockey)", arity: 2, margined: false, partition: None },
    BetType { id: TT_WINNER, name: "Match Winner (Table Tennis)", arity: 2, margined: false, partition: None },
    BetType { id: TT_TOTAL_POINTS, name: "Total Points (Table Tennis)", arity: 2, margined: true, partition: None },
    BetType { id: TT_POINT_HANDICAP, name: "Point Handicap (Table Tennis)", arity: 2, margined: true, partition: None },
    BetType { id: TT_CORRECT_SETS_BO5, name: "Correct Score In Sets (Bo5)", arity: 1, margined: false, partition: Some(BO5_SETS_PARTITION) },
    BetType { id: TT_FIRST_SET_WINNER, name: "1st Set Winner (Table Tennis)", arity: 2, margined: false, partition: None },
];

pub fn bet_type(id: BetTypeId) -> Option<&'static BetType> {
    BET_TYPES.iter().find(|bt| bt.id == id)
}

/// Startup sanity pass over the static table. Panics on a bad table because
/// nothing downstream can run against a corrupted vocabulary.
pub fn validate_table() {
    let mut seen = std::collections::HashSet::new();
    for bt in BET_TYPES {
        assert!(seen.insert(bt.id), "duplicate bet type id {}", bt.id);
        assert!(
            (1..=3).contains(&bt.arity),
            "bet type {} has arity {}",
            bt.id,
            bt.arity
        );
        if let Some(partition) = bt.partition {
            assert_eq!(bt.arity, 1, "partition declared on arity-{} type {}", bt.arity, bt.id);
            assert!(partition.len() >= 2, "degenerate partition on type {}", bt.id);
            for sel in partition {
                assert!(
                    super::selection::is_valid(sel),
                    "partition member {:?} of type {} fails the selection grammar",
                    sel,
                    bt.id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_passes_startup_validation() {
        validate_table();
    }

    #[test]
    fn htft_partition_is_the_nine_combinations() {
        let bt = bet_type(HALFTIME_FULLTIME).unwrap();
        assert_eq!(bt.partition.unwrap().len(), 9);
    }

    #[test]
    fn margined_types_are_handicaps_and_totals() {
        for bt in BET_TYPES {
            if bt.margined {
                assert!(
                    bt.name.contains("Handicap") || bt.name.contains("Total"),
                    "{} is margined but looks parameterless",
                    bt.name
                );
            }
        }
    }

    #[test]
    fn sport_windows() {
        assert_eq!(candidate_window_minutes(FOOTBALL), 120);
        assert_eq!(candidate_window_minutes(TENNIS), 30);
    }
}
