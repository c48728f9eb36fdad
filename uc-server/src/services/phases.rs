//! Training phase generation
//!
//! Splits the weeks between a plan's start and its race into contiguous
//! base, build, peak and taper blocks. Blocks are laid out backwards from
//! the race, so the taper always ends on race day and the first block
//! absorbs any partial week.

use chrono::{Duration, NaiveDate};
use uc_common::db::models::{PhaseKind, PlanPhase};
use uc_common::time::weeks_between;
use uuid::Uuid;

/// Plans shorter than this get a single taper block
pub const MIN_PERIODISED_WEEKS: i64 = 4;
pub const PEAK_SHARE: f64 = 0.20;
pub const BUILD_SHARE: f64 = 0.35;

/// Taper length for a plan of `total_weeks`
pub fn taper_weeks(total_weeks: i64) -> i64 {
    if total_weeks >= 24 {
        3
    } else if total_weeks >= 12 {
        2
    } else {
        1
    }
}

/// Block lengths in weeks, in training order; blocks of zero weeks are omitted
pub fn phase_weeks(total_weeks: i64) -> Vec<(PhaseKind, i64)> {
    if total_weeks < MIN_PERIODISED_WEEKS {
        return vec![(PhaseKind::Taper, total_weeks)];
    }

    let taper = taper_weeks(total_weeks);
    let remaining = total_weeks - taper;
    let peak = ((remaining as f64 * PEAK_SHARE).round() as i64).max(1);
    let build = ((remaining as f64 * BUILD_SHARE).round() as i64).max(1);
    let base = remaining - peak - build;

    let mut blocks = Vec::with_capacity(4);
    if base > 0 {
        blocks.push((PhaseKind::Base, base));
    }
    blocks.push((PhaseKind::Build, build));
    blocks.push((PhaseKind::Peak, peak));
    blocks.push((PhaseKind::Taper, taper));
    blocks
}

/// Generate the phases of a plan running from `start` to `race_date`
///
/// Phases are contiguous, ordered from 1 and cover exactly `start..=race_date`.
pub fn generate_phases(plan_id: Uuid, start: NaiveDate, race_date: NaiveDate) -> Vec<PlanPhase> {
    let blocks = phase_weeks(weeks_between(start, race_date));

    // Walk backwards from race day
    let mut phases = Vec::with_capacity(blocks.len());
    let mut end = race_date;
    for (index, (kind, weeks)) in blocks.iter().enumerate().rev() {
        let first_block = index == 0;
        let block_start = if first_block {
            start
        } else {
            (end - Duration::days(weeks * 7 - 1)).max(start)
        };
        phases.push(PlanPhase {
            id: Uuid::new_v4(),
            training_plan_id: plan_id,
            phase: *kind,
            phase_order: index as i64 + 1,
            start_date: block_start,
            end_date: end,
        });
        end = block_start - Duration::days(1);
    }

    phases.reverse();
    phases
}
