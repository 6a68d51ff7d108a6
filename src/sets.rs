use crate::config::ProfileConfig;
use crate::data::{pois_to_collection, write_collection};
use crate::types::Poi;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileReport {
    pub profile: String,
    pub written: usize,
    pub skipped: usize,
    pub shortfalls: usize,
}

/// Picks one set for a profile: `count` distinct POIs per rule category.
/// Returns the picks and a warning for every category that fell short.
pub fn pick_set<'a, R: rand::Rng>(
    profile: &ProfileConfig,
    by_category: &HashMap<&str, Vec<&'a Poi>>,
    rng: &mut R,
) -> (Vec<&'a Poi>, Vec<String>) {
    let mut picked = Vec::new();
    let mut warnings = Vec::new();

    for rule in &profile.picks {
        let candidates = by_category.get(rule.category.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        if candidates.len() < rule.count {
            warnings.push(format!(
                "only {} of {} '{}' POIs available",
                candidates.len(),
                rule.count,
                rule.category
            ));
        }
        picked.extend(candidates.choose_multiple(rng, rule.count).copied());
    }

    (picked, warnings)
}

pub fn generate_sets(
    pois: &[Poi],
    profiles: &[ProfileConfig],
    sets_per_profile: usize,
    out_dir: &Path,
    seed: Option<u64>,
) -> Result<Vec<ProfileReport>> {
    info!("Generating {} sets for {} profiles from {} POIs", sets_per_profile, profiles.len(), pois.len());

    let mut by_category: HashMap<&str, Vec<&Poi>> = HashMap::new();
    for poi in pois {
        by_category.entry(poi.category.as_str()).or_default().push(poi);
    }

    profiles
        .par_iter()
        .enumerate()
        .map(|(i, profile)| {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                None => StdRng::from_entropy(),
            };
            generate_profile_sets(profile, &by_category, sets_per_profile, out_dir, &mut rng)
        })
        .collect()
}

fn generate_profile_sets<R: rand::Rng>(
    profile: &ProfileConfig,
    by_category: &HashMap<&str, Vec<&Poi>>,
    sets_per_profile: usize,
    out_dir: &Path,
    rng: &mut R,
) -> Result<ProfileReport> {
    let profile_dir = out_dir.join(&profile.name);
    let mut report = ProfileReport { profile: profile.name.clone(), ..Default::default() };

    for i in 1..=sets_per_profile {
        let (picked, warnings) = pick_set(profile, by_category, rng);
        if !warnings.is_empty() {
            report.shortfalls += 1;
            for w in &warnings {
                warn!(profile = %profile.name, set = i, "{}", w);
            }
        }
        if picked.is_empty() {
            warn!(profile = %profile.name, set = i, "set not generated, no data");
            report.skipped += 1;
            continue;
        }

        let owned: Vec<Poi> = picked.into_iter().cloned().collect();
        write_collection(&profile_dir.join(format!("{}.geojson", i)), &pois_to_collection(&owned))?;
        report.written += 1;
    }

    info!(profile = %profile.name, written = report.written, skipped = report.skipped, "profile sets done");
    Ok(report)
}
