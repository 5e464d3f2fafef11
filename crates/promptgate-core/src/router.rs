//! Deterministic variant selection
//!
//! Policy layers are evaluated in strict order; the first layer that matches
//! wins: tag match, phased rollout, weighted default rules, hard default.
//! Weighted picks hash the user id so that routing is reproducible per user;
//! anonymous requests draw uniformly.

use crate::config::{Prompt, Variant};
use crate::error::{Error, Result};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Why a variant was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingReason {
    TagMatch,
    PhasedRollout,
    WeightDistribution,
    Default,
}

impl RoutingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingReason::TagMatch => "tag-match",
            RoutingReason::PhasedRollout => "phased-rollout",
            RoutingReason::WeightDistribution => "weight-distribution",
            RoutingReason::Default => "default",
        }
    }
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The routing outcome for one request.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub variant_id: String,
    pub variant: &'a Variant,
    pub reason: RoutingReason,
    /// The winning entry's weight, present for weighted layers.
    pub weight: Option<f64>,
}

/// Select a variant for a request.
///
/// `now` is epoch seconds and gates phased rollouts. The validator guarantees
/// rule targets and phased keys resolve, so a missing variant here is a
/// programming error surfaced as an execution error.
pub fn select_variant<'a>(
    prompt: &'a Prompt,
    prompt_id: &str,
    user_id: Option<&str>,
    tags: &[String],
    now: i64,
) -> Result<Selection<'a>> {
    // Layer 1: tag match.
    if !tags.is_empty() {
        let matching: Vec<(String, f64)> = prompt
            .routing
            .rules
            .iter()
            .filter(|rule| {
                rule.tags
                    .as_ref()
                    .map_or(false, |rule_tags| rule_tags.iter().any(|t| tags.contains(t)))
            })
            .map(|rule| (rule.target.clone(), rule.weight))
            .collect();

        if !matching.is_empty() {
            let weights = dedupe_weights(matching);
            let (variant_id, weight) = weighted_pick(&weights, user_id, prompt_id, "tag");
            return resolve(prompt, prompt_id, variant_id, RoutingReason::TagMatch, Some(weight));
        }
    }

    // Layer 2: phased rollout. Among windows covering `now`, the greatest
    // start wins; ties keep the earlier entry.
    if let Some(phased) = &prompt.routing.phased {
        let active = phased
            .iter()
            .filter(|entry| entry.covers(now))
            .fold(None, |best: Option<&crate::config::PhasedRule>, entry| match best {
                Some(current) if entry.start <= current.start => Some(current),
                _ => Some(entry),
            });

        if let Some(entry) = active {
            let weights: Vec<(String, f64)> = entry
                .weights
                .iter()
                .map(|(id, w)| (id.clone(), w.as_f64().unwrap_or(0.0)))
                .collect();
            let (variant_id, weight) = weighted_pick(&weights, user_id, prompt_id, "phase");
            return resolve(
                prompt,
                prompt_id,
                variant_id,
                RoutingReason::PhasedRollout,
                Some(weight),
            );
        }
    }

    // Layer 3: untagged rules form the default weight distribution.
    let untagged: Vec<(String, f64)> = prompt
        .routing
        .rules
        .iter()
        .filter(|rule| rule.is_untagged())
        .map(|rule| (rule.target.clone(), rule.weight))
        .collect();

    if !untagged.is_empty() {
        let weights = dedupe_weights(untagged);
        let (variant_id, weight) = weighted_pick(&weights, user_id, prompt_id, "weight");
        return resolve(
            prompt,
            prompt_id,
            variant_id,
            RoutingReason::WeightDistribution,
            Some(weight),
        );
    }

    // Layer 4: hard default.
    let (variant_id, variant) = prompt.default_variant().ok_or_else(|| {
        Error::execution_with(
            format!("prompt '{}' has no default variant", prompt_id),
            json!({"promptId": prompt_id}),
        )
    })?;
    Ok(Selection {
        variant_id: variant_id.clone(),
        variant,
        reason: RoutingReason::Default,
        weight: None,
    })
}

/// Collapse duplicate targets: the first occurrence keeps its position, the
/// last occurrence's weight wins.
fn dedupe_weights(entries: Vec<(String, f64)>) -> Vec<(String, f64)> {
    let mut out: Vec<(String, f64)> = Vec::with_capacity(entries.len());
    for (id, weight) in entries {
        if let Some(pos) = out.iter().position(|(existing, _)| *existing == id) {
            out[pos].1 = weight;
        } else {
            out.push((id, weight));
        }
    }
    out
}

/// Deterministic weighted pick over `(id, weight)` entries in insertion
/// order. Returns the chosen id and its weight; the first entry wins when the
/// total weight is zero.
fn weighted_pick(
    entries: &[(String, f64)],
    user_id: Option<&str>,
    prompt_id: &str,
    salt: &str,
) -> (String, f64) {
    debug_assert!(!entries.is_empty(), "validator rejects empty weight maps");

    let total: f64 = entries.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return entries[0].clone();
    }

    let r = match user_id {
        Some(user) => bucket_for(user, prompt_id, salt),
        None => rand::thread_rng().gen::<f64>(),
    };

    let mut remaining = r * total;
    for (id, weight) in entries {
        remaining -= weight;
        if remaining < 0.0 {
            return (id.clone(), *weight);
        }
    }
    entries[0].clone()
}

/// Stable fractional bucket in [0, 1): the first 32 bits of
/// `SHA-256("{userId}:{promptId}:{salt}")` as an unsigned big-endian integer,
/// divided by 2^32.
fn bucket_for(user_id: &str, prompt_id: &str, salt: &str) -> f64 {
    let digest = Sha256::digest(format!("{}:{}:{}", user_id, prompt_id, salt));
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head as f64 / (u32::MAX as f64 + 1.0)
}

fn resolve<'a>(
    prompt: &'a Prompt,
    prompt_id: &str,
    variant_id: String,
    reason: RoutingReason,
    weight: Option<f64>,
) -> Result<Selection<'a>> {
    let variant = prompt.variants.get(&variant_id).ok_or_else(|| {
        Error::execution_with(
            format!(
                "routing selected variant '{}' which does not exist in prompt '{}'",
                variant_id, prompt_id
            ),
            json!({"promptId": prompt_id, "variantId": variant_id}),
        )
    })?;
    tracing::debug!(
        prompt = prompt_id,
        variant = %variant_id,
        reason = %reason,
        "variant selected"
    );
    Ok(Selection {
        variant_id,
        variant,
        reason,
        weight,
    })
}
