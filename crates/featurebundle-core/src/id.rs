// Policy naming prefix generation
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Fixed tag every generated policy prefix starts with.
pub const POLICY_PREFIX_TAG: &str = "fb";

/// Number of random characters following [`POLICY_PREFIX_TAG`].
pub const POLICY_PREFIX_LENGTH: usize = 10;

/// Generates a fresh policy prefix: the tag followed by random lowercase
/// alphanumerics, so the result is usable inside resource names.
pub fn generate_policy_prefix() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(POLICY_PREFIX_LENGTH)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{POLICY_PREFIX_TAG}{suffix}")
}

/// Returns `true` if `prefix` has the shape produced by [`generate_policy_prefix`].
pub fn is_policy_prefix(prefix: &str) -> bool {
    prefix
        .strip_prefix(POLICY_PREFIX_TAG)
        .is_some_and(|rest| {
            rest.len() == POLICY_PREFIX_LENGTH && rest.chars().all(|c| c.is_ascii_alphanumeric())
        })
}
