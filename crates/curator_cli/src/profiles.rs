//! `curator profiles`: list and edit the platform profiles.
//!
//! Works on `profiles.toml` directly, so no scan and no workers are needed.

use curator_config::{load_config, resolve_config, ProfileSet};

use crate::project::resolve_project_root;
use crate::{GlobalArgs, ProfileAction};

/// Runs the `curator profiles` command. Without an action the profiles are
/// listed.
pub fn run(action: Option<&ProfileAction>, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    let config = resolve_config(&load_config(&root)?, &root);
    let mut profiles = ProfileSet::load(&config.output_dir).unwrap_or_default();

    let changed = apply(&mut profiles, action)?;
    if changed {
        profiles.save(&config.output_dir)?;
    }
    if !changed || !global.quiet {
        print!("{}", listing(&profiles));
    }
    Ok(0)
}

fn apply(profiles: &mut ProfileSet, action: Option<&ProfileAction>) -> Result<bool, Box<dyn std::error::Error>> {
    match action {
        None | Some(ProfileAction::List) => return Ok(false),
        Some(ProfileAction::Add { name, platform }) => {
            profiles.add(name, platform)?;
        }
        Some(ProfileAction::Rename { index, name }) => profiles.rename(*index, name)?,
        Some(ProfileAction::Remove { index }) => {
            profiles.remove(*index)?;
        }
        Some(ProfileAction::Select { index }) => profiles.set_active(*index)?,
    }
    Ok(true)
}

fn listing(profiles: &ProfileSet) -> String {
    profiles
        .profiles
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let marker = if i == profiles.active { '*' } else { ' ' };
            format!("{marker} {i}: {} ({})\n", p.name, p.platform)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_select_marks_active() {
        let mut profiles = ProfileSet::new();
        let add = ProfileAction::Add {
            name: "Android".to_string(),
            platform: "android".to_string(),
        };
        assert!(apply(&mut profiles, Some(&add)).unwrap());
        assert!(apply(&mut profiles, Some(&ProfileAction::Select { index: 1 })).unwrap());

        let text = listing(&profiles);
        assert!(text.contains("* 1: Android (android)"));
        assert!(text.starts_with("  0: Default"));
    }

    #[test]
    fn default_profile_cannot_be_removed() {
        let mut profiles = ProfileSet::new();
        assert!(apply(&mut profiles, Some(&ProfileAction::Remove { index: 0 })).is_err());
        assert!(!apply(&mut profiles, None).unwrap());
    }
}
