//! Final ranking
//!
//! Entrants still holding chips rank first, by chip count descending with ties
//! broken by entrant id. Busted entrants follow, the last one busted ranking
//! highest.

use std::cmp::{Ordering, Reverse};

use crate::model::{EntrantStats, RankedEntrant};

/// Rank `stats` into positions `1..=N`.
///
/// The result depends only on the multiset of inputs, never on their order.
pub fn rank_entrants(stats: &[EntrantStats]) -> Vec<RankedEntrant> {
    let (mut active, mut busted): (Vec<&EntrantStats>, Vec<&EntrantStats>) =
        stats.iter().partition(|s| s.is_active());

    active.sort_by(|a, b| compare_active(a, b));
    busted.sort_by(|a, b| compare_busted(a, b));

    active
        .into_iter()
        .chain(busted)
        .enumerate()
        .map(|(index, s)| RankedEntrant {
            entrant_id: s.entrant_id,
            rank: position_rank(index),
            stats: s.clone(),
        })
        .collect()
}

/// One-based rank for a zero-based position, saturating at `u32::MAX`.
fn position_rank(index: usize) -> u32 {
    u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX)
}

fn compare_active(a: &EntrantStats, b: &EntrantStats) -> Ordering {
    (Reverse(a.final_chips), a.entrant_id)
        .cmp(&(Reverse(b.final_chips), b.entrant_id))
        .then_with(|| a.cmp(b))
}

fn compare_busted(a: &EntrantStats, b: &EntrantStats) -> Ordering {
    (Reverse(a.busted_order), a.entrant_id)
        .cmp(&(Reverse(b.busted_order), b.entrant_id))
        .then_with(|| a.cmp(b))
}
