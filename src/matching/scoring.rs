use crate::models::{index, GestureTemplate, HandFrame, HandSet};

use super::config::MatchConfig;
use super::normalize::normalize;

/// Dissimilarity between a stored hand set and a live one. Lower is closer.
///
/// Hands are paired by position. Differing hand counts, differing point
/// counts in any pair, or nothing to compare all yield `f32::INFINITY`.
/// The result is the weighted mean of per-point distances, so it does not
/// grow with the number of hands compared.
pub fn score(template: &HandSet, current: &HandSet, config: &MatchConfig) -> f32 {
    if template.len() != current.len() || template.is_empty() {
        return f32::INFINITY;
    }

    let mut total_distance = 0.0_f32;
    let mut total_weight = 0.0_f32;

    for (saved, live) in template.iter().zip(current.iter()) {
        if saved.len() != live.len() {
            return f32::INFINITY;
        }
        accumulate_pair(saved, live, config, &mut total_distance, &mut total_weight);
    }

    if total_weight > 0.0 {
        total_distance / total_weight
    } else {
        f32::INFINITY
    }
}

fn accumulate_pair(
    saved: &HandFrame,
    live: &HandFrame,
    config: &MatchConfig,
    total_distance: &mut f32,
    total_weight: &mut f32,
) {
    let saved = normalize(saved, config.scale_reference);
    let live = normalize(live, config.scale_reference);

    for (j, (a, b)) in saved.points.iter().zip(live.points.iter()).enumerate() {
        let weight = point_weight(j, config);
        let dx = a.x - b.x;
        let dy = a.y - b.y;
        let dz = (a.z - b.z) * config.z_weight;

        *total_distance += (dx * dx + dy * dy + dz * dz).sqrt() * weight;
        *total_weight += weight;
    }
}

fn point_weight(point_index: usize, config: &MatchConfig) -> f32 {
    if index::FINGERTIPS.contains(&point_index) {
        config.fingertip_weight
    } else if point_index == index::WRIST {
        config.wrist_weight
    } else {
        1.0
    }
}

/// Lowest-scoring template for `current`, with its score. Earlier templates
/// win ties. Templates that cannot be compared are skipped.
pub fn best_match<'a, I>(
    templates: I,
    current: &HandSet,
    config: &MatchConfig,
) -> Option<(&'a GestureTemplate, f32)>
where
    I: IntoIterator<Item = &'a GestureTemplate>,
{
    let mut best: Option<(&GestureTemplate, f32)> = None;
    for template in templates {
        let candidate = score(&template.landmarks, current, config);
        if !candidate.is_finite() {
            continue;
        }
        match best {
            Some((_, best_score)) if candidate >= best_score => {}
            _ => best = Some((template, candidate)),
        }
    }
    best
}
