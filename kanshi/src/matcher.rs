//! Matcher (C4): picks the first profile whose output list covers the
//! current head set exactly once. Spec.md §4.3.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::config::{Profile, ProfileOutput};

/// A head as seen by the matcher: just enough to test a [`ProfileOutput`]
/// against it. Kept decoupled from the live [`crate::head::Head`] type so the
/// matcher can be exercised without a real Wayland connection.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a, K> {
    pub id: K,
    pub name: &'a str,
    pub description: &'a str,
}

/// Finds the first profile, in declaration order, whose output list can be
/// assigned to `heads` such that the assignment is total, injective, and
/// size-exact (spec.md §4.3). Assignment is ordered-greedy: profile-outputs
/// are considered in declaration order, and each takes the first unassigned
/// matching head — wildcards-last (an invariant of [`Profile`]) means
/// specific matches always bind before wildcards.
pub fn find_profile<'p, 'h, K>(
    profiles: &'p [Profile],
    heads: &[Candidate<'h, K>],
) -> Option<(&'p Profile, HashMap<K, &'p ProfileOutput>)>
where
    K: Copy + Eq + Hash,
{
    for profile in profiles {
        if let Some(assignment) = try_match(profile, heads) {
            return Some((profile, assignment));
        }
    }
    None
}

/// Assigns each non-wildcard output the first unassigned head it matches
/// (injective, must succeed for every such output); a trailing wildcard then
/// absorbs every head still unassigned, however many there are — it is not
/// "consumed" by one head. Profile.outputs is wildcards-last, so a wildcard
/// is always the catch-all for whatever the specific outputs left over.
/// Without a wildcard, every head must already be spoken for.
fn try_match<'p, 'h, K>(
    profile: &'p Profile,
    heads: &[Candidate<'h, K>],
) -> Option<HashMap<K, &'p ProfileOutput>>
where
    K: Copy + Eq + Hash,
{
    let mut remaining: HashSet<usize> = (0..heads.len()).collect();
    let mut assignment = HashMap::new();

    for output in &profile.outputs {
        if output.is_wildcard() {
            for idx in remaining.drain() {
                assignment.insert(heads[idx].id, output);
            }
            continue;
        }

        let found = heads
            .iter()
            .enumerate()
            .find(|(idx, candidate)| remaining.contains(idx) && output.matches(candidate.name, candidate.description));

        match found {
            Some((idx, candidate)) => {
                remaining.remove(&idx);
                assignment.insert(candidate.id, output);
            }
            None => return None,
        }
    }

    if remaining.is_empty() {
        Some(assignment)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProfileOutput};
    use crate::parser::parse_str;
    use std::path::Path;

    fn parse(src: &str) -> Config {
        parse_str(Path::new("<test>"), src).unwrap()
    }

    #[test]
    fn empty_config_matches_nothing() {
        let config = parse("");
        let heads: Vec<Candidate<u32>> = vec![];
        assert!(find_profile(&config.profiles, &heads).is_none());
    }

    #[test]
    fn s1_exact_match() {
        let config = parse(
            r#"
            profile laptop {
                output eDP-1
                output DP-1
            }
            "#,
        );
        let heads = vec![
            Candidate { id: 0u32, name: "DP-1", description: "Dell U2720 0x123" },
            Candidate { id: 1u32, name: "eDP-1", description: "Built-in" },
        ];
        let (profile, assignment) = find_profile(&config.profiles, &heads).unwrap();
        assert_eq!(profile.name, "laptop");
        assert_eq!(assignment.len(), 2);
    }

    #[test]
    fn s2_wildcard_fallback() {
        let config = parse(
            r#"
            profile desk {
                output DP-1 enable
            }
            profile any {
                output "*" enable
            }
            "#,
        );
        let heads = vec![Candidate { id: 0u32, name: "HDMI-A-1", description: "" }];
        let (profile, _) = find_profile(&config.profiles, &heads).unwrap();
        assert_eq!(profile.name, "any");
    }

    #[test]
    fn size_mismatch_is_not_a_match() {
        let config = parse(
            "profile p {\n    output eDP-1\n    output DP-1\n}\n",
        );
        let heads = vec![Candidate { id: 0u32, name: "eDP-1", description: "" }];
        assert!(find_profile(&config.profiles, &heads).is_none());
    }

    #[test]
    fn wildcard_n_heads_boundary() {
        for n in 1..=4 {
            let config = parse("profile any {\n    output \"*\" enable\n}\n");
            let heads: Vec<Candidate<u32>> = (0..n)
                .map(|i| Candidate { id: i, name: "whatever", description: "" })
                .collect();
            assert!(find_profile(&config.profiles, &heads).is_some(), "n={n}");
        }
    }

    #[test]
    fn s5_description_substring_match() {
        let config = parse("profile d {\n    output \"Dell U2720\" mode 2560x1440\n}\n");
        let heads = vec![Candidate {
            id: 0u32,
            name: "DP-1",
            description: "Dell Inc. U2720 0x123",
        }];
        assert!(find_profile(&config.profiles, &heads).is_some());
    }

    #[test]
    fn declaration_order_wins_first_match() {
        let config = parse(
            r#"
            profile first {
                output "*" enable
            }
            profile second {
                output "*" enable
            }
            "#,
        );
        let heads = vec![Candidate { id: 0u32, name: "eDP-1", description: "" }];
        let (profile, _) = find_profile(&config.profiles, &heads).unwrap();
        assert_eq!(profile.name, "first");
    }

    #[test]
    fn specific_outputs_bind_before_wildcard() {
        let mut config = parse("profile p {\n    output \"*\" enable\n}\n");
        config.profiles[0].insert_output(ProfileOutput::new("DP-1"));
        // After insertion, DP-1 (specific) must precede the wildcard.
        assert_eq!(config.profiles[0].outputs[0].name, "DP-1");

        let heads = vec![
            Candidate { id: 0u32, name: "DP-1", description: "" },
            Candidate { id: 1u32, name: "HDMI-A-1", description: "" },
        ];
        let (_, assignment) = find_profile(&config.profiles, &heads).unwrap();
        assert_eq!(assignment[&0].name, "DP-1");
        assert_eq!(assignment[&1].name, "*");
    }
}
