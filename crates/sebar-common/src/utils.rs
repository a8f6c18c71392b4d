use rand::{Rng, distr::Alphanumeric};

/// Generate an alphanumeric admission secret of `len` characters.
///
/// The value is an admission token handed to operators, not key material.
pub fn random_secret(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
