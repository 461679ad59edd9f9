//! Unique artifact names: `{task}_{nonce}_{unix_ts}_{suffix}`.

use rand::Rng;

const SUFFIX_LEN: usize = 4;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh artifact name for a task/nonce pair.
pub fn artifact_name(task: &str, nonce: &str) -> String {
    let base = format!("{}_{}", task, nonce);
    unique_name(&base, chrono::Utc::now().timestamp())
}

/// Append a timestamp and a random lowercase alphanumeric suffix to `base`.
pub fn unique_name(base: &str, timestamp: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", sanitize(base), timestamp, suffix)
}

/// Replace characters GitHub does not allow in repository names with `-`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
