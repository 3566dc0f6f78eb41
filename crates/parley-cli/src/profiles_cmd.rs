//! `parley profiles` command: list loadable agent profiles.

use anyhow::Result;
use tracing::warn;

use parley_core::prompt::weight_bar;

use crate::config::ParleyConfig;
use crate::runtime;

pub fn run_profiles(cfg: &ParleyConfig, verbose: bool) -> Result<()> {
    let store = runtime::profile_store(cfg);
    let ids = store.list()?;

    if ids.is_empty() {
        println!("No profiles found.");
        return Ok(());
    }

    for id in &ids {
        let profile = match store.load(id) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(profile = %id, error = %e, "skipping unloadable profile");
                println!("  {id:<12} (invalid: {e})");
                continue;
            }
        };

        println!(
            "  {id:<12} {} ({}), top axiom {}, prefers {}",
            profile.name, profile.role, profile.top_axiom_id, profile.preferred_backend
        );
        if verbose {
            if !profile.description.is_empty() {
                println!("      {}", profile.description);
            }
            for axiom in profile.sorted_axioms() {
                println!(
                    "      {} [{}] {:.2}  {}",
                    axiom.id,
                    weight_bar(axiom.weight),
                    axiom.weight,
                    axiom.title
                );
            }
            println!("      non-negotiable: {}", profile.non_negotiable_text);
            println!("      model: {}", profile.model);
            println!();
        }
    }

    println!();
    println!("{} profile(s)", ids.len());
    Ok(())
}
