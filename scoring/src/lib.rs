use std::collections::{HashMap, HashSet};

use board::{Board, Cell, Pathfinder};
use serde::Serialize;
use words::BoggleWord;

/// How effective scores are derived from raw scores.
///
/// Under mild scoring every word is worth double its base value, duplicates
/// keep their score instead of being wiped, and the longest-word bonus is a
/// x3 instead of a x2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Basic,
    Mild,
}

impl Variant {
    pub fn from_mild_flag(mild: bool) -> Self {
        if mild { Variant::Mild } else { Variant::Basic }
    }
}

/// A word with its persisted scoring outputs: the raw score (path-gated base
/// value, kept even for duplicates so a variant or manual approval can revive
/// it), the cross-player duplicate flag, the dictionary flag, and the first
/// path found on the board.
#[derive(Debug, Clone)]
pub struct ScoredWord {
    pub word: BoggleWord,
    pub score: i32,
    pub duplicate: bool,
    pub dictionary_valid: bool,
    pub path: Option<Vec<Cell>>,
}

/// Base score by display-form length.
pub fn base_score(len: usize) -> i32 {
    match len {
        0..=4 => 1,
        5 => 2,
        6 => 3,
        7 => 5,
        _ => 11,
    }
}

/// Score one round across all players. Input word lists are expected to be
/// deduplicated per player already (ingress collapses a player's own
/// repeats); output lists are parallel to the input lists.
///
/// A word only counts as duplicate when its equality form shows up in more
/// than one player's list. Without a dictionary every word is
/// dictionary-valid.
pub fn score_round(
    players: Vec<Vec<BoggleWord>>,
    board: &Board,
    dictionary: Option<&HashSet<String>>,
) -> Vec<Vec<ScoredWord>> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in players.iter().flatten() {
        *counts.entry(word.equality()).or_default() += 1;
    }
    let duplicates: HashSet<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(eq, _)| eq.to_owned())
        .collect();

    let finder = Pathfinder::new(board);
    players
        .into_iter()
        .map(|list| {
            list.into_iter()
                .map(|word| {
                    let path = finder.first_path(word.equality());
                    let score = if path.is_some() {
                        base_score(word.len())
                    } else {
                        0
                    };
                    let duplicate = duplicates.contains(word.equality());
                    let dictionary_valid = match dictionary {
                        None => true,
                        Some(dict) => dict.contains(word.display()),
                    };
                    ScoredWord {
                        word,
                        score,
                        duplicate,
                        dictionary_valid,
                        path,
                    }
                })
                .collect()
        })
        .collect()
}

/// A scored word as exposed to clients, after the variant rules and the
/// longest-word bonus have been applied.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveWord {
    pub word: String,
    pub score: i32,
    pub path: Option<Vec<Cell>>,
    pub duplicate: bool,
    pub dictionary_valid: bool,
    pub longest_bonus: bool,
    pub in_grid: bool,
}

/// Project stored scores into effective scores for one round.
///
/// Dictionary-invalid words score zero (their raw score stays in storage so
/// approval can revive them). Basic scoring wipes duplicates. The longest
/// bonus goes to a player who uniquely holds the longest word among words
/// that would otherwise score; a cross-player tie at that length suppresses
/// the bonus for everyone.
pub fn effective_scores(players: &[Vec<ScoredWord>], variant: Variant) -> Vec<Vec<EffectiveWord>> {
    let mild = variant == Variant::Mild;
    let counts_for_bonus =
        |w: &ScoredWord| w.score > 0 && w.dictionary_valid && (mild || !w.duplicate);

    let longest = players
        .iter()
        .flatten()
        .filter(|w| counts_for_bonus(w))
        .map(|w| w.word.len())
        .max();
    let bonus_holder = longest.and_then(|len| {
        let mut holders = players.iter().enumerate().filter(|(_, list)| {
            list.iter()
                .any(|w| counts_for_bonus(w) && w.word.len() == len)
        });
        let first = holders.next()?.0;
        holders.next().is_none().then_some((first, len))
    });

    players
        .iter()
        .enumerate()
        .map(|(player_idx, list)| {
            list.iter()
                .map(|w| {
                    let longest_bonus = bonus_holder
                        .is_some_and(|(holder, len)| {
                            holder == player_idx && counts_for_bonus(w) && w.word.len() == len
                        });
                    let multiplier = if !w.dictionary_valid {
                        0
                    } else if !mild && w.duplicate {
                        0
                    } else {
                        match (mild, longest_bonus) {
                            (false, false) => 1,
                            (false, true) => 2,
                            (true, false) => 2,
                            (true, true) => 3,
                        }
                    };
                    EffectiveWord {
                        word: w.word.display().to_owned(),
                        score: w.score * multiplier,
                        path: w.path.clone(),
                        duplicate: w.duplicate,
                        dictionary_valid: w.dictionary_valid,
                        longest_bonus,
                        in_grid: w.path.is_some(),
                    }
                })
                .collect()
        })
        .collect()
}
