//! Output artifact naming.
//!
//! Display names become lowercase snake-case file stems with unsafe
//! characters replaced, matching the naming scheme of the card tooling this
//! orchestrator feeds.

use std::collections::HashSet;

use crate::types::JobId;

/// Convert a display name to a safe file stem.
///
/// Alphanumerics, spaces, hyphens, and underscores are kept; everything else
/// becomes `_`. The result is trimmed, space-collapsed to underscores, and
/// lowercased.
pub fn sanitize_file_stem(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    safe.trim().replace(' ', "_").to_lowercase()
}

/// Derive a unique `.png` filename for a job's artifact.
///
/// Empty stems fall back to the job id; a stem already taken by another job
/// in the same run gets the job id appended.
pub fn artifact_file_name(display_name: &str, id: JobId, taken: &mut HashSet<String>) -> String {
    let mut stem = sanitize_file_stem(display_name);
    if stem.is_empty() {
        stem = format!("job_{id}");
    }
    if !taken.insert(stem.clone()) {
        stem = format!("{stem}_{id}");
        taken.insert(stem.clone());
    }
    format!("{stem}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- sanitize_file_stem ---------------------------------------------------

    #[test]
    fn spaces_become_underscores_and_case_folds() {
        assert_eq!(sanitize_file_stem("Ada Lovelace"), "ada_lovelace");
    }

    #[test]
    fn punctuation_is_replaced() {
        assert_eq!(sanitize_file_stem("O'Brien, Jr."), "o_brien__jr_");
    }

    #[test]
    fn hyphens_and_underscores_survive() {
        assert_eq!(sanitize_file_stem("mary-jane_watson"), "mary-jane_watson");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(sanitize_file_stem("  Grace Hopper  "), "grace_hopper");
    }

    #[test]
    fn fully_unsafe_name_collapses_to_underscores() {
        assert_eq!(sanitize_file_stem("!!!"), "___");
    }

    // -- artifact_file_name ---------------------------------------------------

    #[test]
    fn unique_names_pass_through() {
        let mut taken = HashSet::new();
        assert_eq!(
            artifact_file_name("Ada Lovelace", 1, &mut taken),
            "ada_lovelace.png"
        );
        assert_eq!(
            artifact_file_name("Grace Hopper", 2, &mut taken),
            "grace_hopper.png"
        );
    }

    #[test]
    fn duplicate_names_get_job_id_suffix() {
        let mut taken = HashSet::new();
        assert_eq!(
            artifact_file_name("Ada Lovelace", 1, &mut taken),
            "ada_lovelace.png"
        );
        assert_eq!(
            artifact_file_name("Ada Lovelace", 2, &mut taken),
            "ada_lovelace_2.png"
        );
    }

    #[test]
    fn empty_name_falls_back_to_job_id() {
        let mut taken = HashSet::new();
        assert_eq!(artifact_file_name("", 7, &mut taken), "job_7.png");
    }
}
