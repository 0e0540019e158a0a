//! Deterministic resolution of destination name collisions.
//!
//! Colliding members get the name of the first ancestor directory that
//! tells them apart from each other member, inserted before the extension:
//! `/a/2023/p.jpg` and `/b/2023/p.jpg` both mapped to `2024/05/p.jpg`
//! become `2024/05/p_a.jpg` and `2024/05/p_b.jpg`. Whatever still collides
//! afterwards gets a numeric suffix in scan order, as does any name already
//! taken in the destination tree.

use crate::error::PlanError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

/// Highest numeric suffix tried before giving up on a name
pub const MAX_NUMERIC_SUFFIX: u32 = 10_000;

/// Make every candidate destination unique.
///
/// `candidates` is `(source, destination)` in scan order. The result has one
/// entry per candidate, in the same order. `occupied` reports destinations
/// that already hold a file; those are never handed out. Identical inputs
/// always produce identical outputs.
pub fn resolve_conflicts<F>(
    candidates: &[(PathBuf, PathBuf)],
    occupied: F,
) -> Vec<Result<PathBuf, PlanError>>
where
    F: Fn(&Path) -> bool,
{
    let mut groups: HashMap<&Path, Vec<usize>> = HashMap::new();
    for (index, (_, destination)) in candidates.iter().enumerate() {
        groups.entry(destination.as_path()).or_default().push(index);
    }

    let mut proposed: Vec<PathBuf> = candidates.iter().map(|(_, d)| d.clone()).collect();
    let mut collisions = 0usize;

    for members in groups.values().filter(|m| m.len() > 1) {
        collisions += members.len();
        let chains: Vec<Vec<&OsStr>> = members
            .iter()
            .map(|&i| ancestor_names(&candidates[i].0))
            .collect();

        for (position, &index) in members.iter().enumerate() {
            let own = &chains[position];
            let depths: BTreeSet<usize> = chains
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != position)
                .filter_map(|(_, theirs)| first_difference(own, theirs))
                .filter(|&depth| depth < own.len())
                .collect();

            if depths.is_empty() {
                continue;
            }

            let mut suffix = OsString::new();
            for (n, depth) in depths.iter().enumerate() {
                if n > 0 {
                    suffix.push("_");
                }
                suffix.push(own[*depth]);
            }
            proposed[index] = with_suffix(&candidates[index].1, &suffix);
        }
    }

    if collisions > 0 {
        tracing::debug!("Resolving {} colliding destinations", collisions);
    }

    let mut claimed: HashSet<PathBuf> = HashSet::with_capacity(proposed.len());
    let taken = |path: &Path, claimed: &HashSet<PathBuf>| {
        claimed.contains(path) || occupied(path)
    };
    proposed
        .into_iter()
        .map(|path| {
            if !taken(path.as_path(), &claimed) {
                claimed.insert(path.clone());
                return Ok(path);
            }
            for n in 1..=MAX_NUMERIC_SUFFIX {
                let numbered = with_suffix(&path, OsStr::new(&n.to_string()));
                if !taken(numbered.as_path(), &claimed) {
                    claimed.insert(numbered.clone());
                    return Ok(numbered);
                }
            }
            Err(PlanError::PathConflictUnresolvable {
                destination: path,
                attempts: MAX_NUMERIC_SUFFIX,
            })
        })
        .collect()
}

/// Directory names above a file, nearest first
fn ancestor_names(source: &Path) -> Vec<&OsStr> {
    let mut names: Vec<&OsStr> = source
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    names.reverse();
    names
}

/// Depth of the first ancestor that differs. A chain that ends early
/// differs from one that goes on.
fn first_difference(own: &[&OsStr], theirs: &[&OsStr]) -> Option<usize> {
    (0..own.len().max(theirs.len())).find(|&depth| own.get(depth) != theirs.get(depth))
}

/// `dir/stem.ext` -> `dir/stem_suffix.ext`
pub(crate) fn with_suffix(path: &Path, suffix: &OsStr) -> PathBuf {
    let mut name = path.file_stem().map(OsStr::to_os_string).unwrap_or_default();
    name.push("_");
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(source: &str, destination: &str) -> (PathBuf, PathBuf) {
        (PathBuf::from(source), PathBuf::from(destination))
    }

    fn resolved(candidates: &[(PathBuf, PathBuf)]) -> Vec<PathBuf> {
        resolve_conflicts(candidates, |_| false)
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn unique_destinations_are_untouched() {
        let candidates = vec![
            pair("/a/p.jpg", "2024/05/p.jpg"),
            pair("/a/q.jpg", "2024/05/q.jpg"),
        ];
        assert_eq!(
            resolved(&candidates),
            vec![PathBuf::from("2024/05/p.jpg"), PathBuf::from("2024/05/q.jpg")]
        );
    }

    #[test]
    fn first_distinct_ancestor_becomes_suffix() {
        let candidates = vec![
            pair("/a/2023/p.jpg", "2024/05/p.jpg"),
            pair("/b/2023/p.jpg", "2024/05/p.jpg"),
        ];
        assert_eq!(
            resolved(&candidates),
            vec![
                PathBuf::from("2024/05/p_a.jpg"),
                PathBuf::from("2024/05/p_b.jpg")
            ]
        );
    }

    #[test]
    fn nearest_difference_wins() {
        let candidates = vec![
            pair("/photos/trip/day1/IMG_1.jpg", "2024/IMG_1.jpg"),
            pair("/photos/trip/day2/IMG_1.jpg", "2024/IMG_1.jpg"),
        ];
        assert_eq!(
            resolved(&candidates),
            vec![
                PathBuf::from("2024/IMG_1_day1.jpg"),
                PathBuf::from("2024/IMG_1_day2.jpg")
            ]
        );
    }

    #[test]
    fn three_way_collision_joins_differentiators() {
        let candidates = vec![
            pair("/x/a/p.jpg", "d/p.jpg"),
            pair("/x/b/p.jpg", "d/p.jpg"),
            pair("/y/a/p.jpg", "d/p.jpg"),
        ];
        let result = resolved(&candidates);
        assert_eq!(result[0], PathBuf::from("d/p_a_x.jpg"));
        assert_eq!(result[1], PathBuf::from("d/p_b.jpg"));
        assert_eq!(result[2], PathBuf::from("d/p_a_y.jpg"));
    }

    #[test]
    fn identical_chains_fall_back_to_scan_order_numbers() {
        // Same source path twice, e.g. the same root listed twice
        let candidates = vec![
            pair("/a/p.jpg", "d/p.jpg"),
            pair("/a/p.jpg", "d/p.jpg"),
            pair("/a/p.jpg", "d/p.jpg"),
        ];
        assert_eq!(
            resolved(&candidates),
            vec![
                PathBuf::from("d/p.jpg"),
                PathBuf::from("d/p_1.jpg"),
                PathBuf::from("d/p_2.jpg")
            ]
        );
    }

    #[test]
    fn suffix_colliding_with_existing_name_gets_number() {
        let candidates = vec![
            pair("/s/p_a.jpg", "d/p_a.jpg"),
            pair("/a/p.jpg", "d/p.jpg"),
            pair("/b/p.jpg", "d/p.jpg"),
        ];
        let result = resolved(&candidates);
        assert_eq!(result[0], PathBuf::from("d/p_a.jpg"));
        assert_eq!(result[1], PathBuf::from("d/p_a_1.jpg"));
        assert_eq!(result[2], PathBuf::from("d/p_b.jpg"));
    }

    #[test]
    fn shorter_chain_keeps_name_when_other_differs() {
        let candidates = vec![
            pair("/p.jpg", "d/p.jpg"),
            pair("/deep/p.jpg", "d/p.jpg"),
        ];
        let result = resolved(&candidates);
        assert_eq!(result[0], PathBuf::from("d/p.jpg"));
        assert_eq!(result[1], PathBuf::from("d/p_deep.jpg"));
    }

    #[test]
    fn occupied_names_are_never_reused() {
        let candidates = vec![
            pair("/s1/p.jpg", "d/p.jpg"),
            pair("/s1/q.jpg", "d/q.jpg"),
        ];
        let on_disk: HashSet<PathBuf> = [PathBuf::from("d/p.jpg"), PathBuf::from("d/p_1.jpg")]
            .into_iter()
            .collect();

        let result: Vec<PathBuf> = resolve_conflicts(&candidates, |path| on_disk.contains(path))
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            result,
            vec![PathBuf::from("d/p_2.jpg"), PathBuf::from("d/q.jpg")]
        );
    }

    #[test]
    fn files_without_extension() {
        assert_eq!(
            with_suffix(Path::new("d/README"), OsStr::new("a")),
            PathBuf::from("d/README_a")
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let candidates: Vec<_> = (0..20)
            .map(|i| pair(&format!("/root{}/sub/p.jpg", i % 4), "d/p.jpg"))
            .collect();
        assert_eq!(resolved(&candidates), resolved(&candidates));
        let unique: HashSet<_> = resolved(&candidates).into_iter().collect();
        assert_eq!(unique.len(), candidates.len());
    }
}
