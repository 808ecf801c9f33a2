//! Small shared helpers with no natural home in a single module: "did you
//! mean" suggestions for typo'd identifiers, and path normalization for
//! turning absolute scan results back into the relative form config
//! documents speak in.

use std::path::{Path, PathBuf};

/// Smallest-edit-distance match among `candidates`, used across the config
/// loader and validator for "did you mean" hints on typo'd names. Returns
/// `None` if nothing is within a reasonable distance of `input`.
pub fn closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(input, c)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(c, _)| c)
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        dp[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}

/// Strips `base` off `path`, falling back to `path` unchanged if it isn't
/// actually a prefix, so the rest of the pipeline can always work with
/// something presentable instead of juggling `Option`.
pub fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

/// `<os>-<arch>` tag used when a plugin-declared tool needs a
/// platform-specific download or cache key.
pub fn platform_arch() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
