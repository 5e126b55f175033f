use crate::error::{AppError, AppResult};
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

pub const AFFILIATE_CODE_LEN: usize = 7;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_code_chars(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Derive a 7-character affiliate code candidate from a seed (typically the
/// user's email): uppercase, strip non-alphanumerics, pad with random
/// characters up to the fixed length.
pub fn affiliate_code_candidate(seed: &str) -> String {
    let mut candidate: String = seed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(AFFILIATE_CODE_LEN)
        .collect();

    if candidate.len() < AFFILIATE_CODE_LEN {
        candidate.push_str(&random_code_chars(AFFILIATE_CODE_LEN - candidate.len()));
    }

    candidate
}

/// Replace the trailing two characters with random alphanumerics. Used when a
/// candidate collides with an existing code.
pub fn perturb_affiliate_code(code: &str) -> String {
    let keep = AFFILIATE_CODE_LEN.saturating_sub(2);
    let mut out: String = code.chars().take(keep).collect();
    out.push_str(&random_code_chars(AFFILIATE_CODE_LEN - keep));
    out
}

/// Fully random fallback after bounded perturbation retries.
pub fn random_affiliate_code() -> String {
    random_code_chars(AFFILIATE_CODE_LEN)
}

pub fn validate_affiliate_code(code: &str) -> AppResult<()> {
    if code.len() != AFFILIATE_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::ValidationError(format!(
            "Affiliate code must be exactly {AFFILIATE_CODE_LEN} alphanumeric characters"
        )));
    }
    Ok(())
}

/// Opaque single-use verification token: a v4 UUID plus a random tail, so the
/// value is unguessable and never collides in practice. Uniqueness is still
/// enforced by the tokens table index.
pub fn generate_token_string() -> String {
    let mut rng = rand::thread_rng();
    let tail: String = (0..16)
        .map(|_| {
            let chars = b"abcdefghijklmnopqrstuvwxyz0123456789";
            chars[rng.gen_range(0..chars.len())] as char
        })
        .collect();
    format!("{}{}", Uuid::new_v4().simple(), tail)
}

pub fn validate_email(email: &str) -> AppResult<()> {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
    });

    if !re.is_match(email) {
        return Err(AppError::ValidationError("Invalid email address".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_from_long_seed() {
        let code = affiliate_code_candidate("jane.doe@example.com");
        assert_eq!(code, "JANEDOE");
    }

    #[test]
    fn test_candidate_from_short_seed_is_padded() {
        let code = affiliate_code_candidate("al@x.io");
        assert_eq!(code.len(), AFFILIATE_CODE_LEN);
        assert!(code.starts_with("ALXIO"));
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_perturb_keeps_prefix_and_length() {
        let code = perturb_affiliate_code("JANEDOE");
        assert_eq!(code.len(), AFFILIATE_CODE_LEN);
        assert!(code.starts_with("JANED"));
    }

    #[test]
    fn test_random_code_shape() {
        let code = random_affiliate_code();
        assert_eq!(code.len(), AFFILIATE_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_validate_affiliate_code() {
        assert!(validate_affiliate_code("ABC1234").is_ok());
        assert!(validate_affiliate_code("abc1234").is_ok());
        assert!(validate_affiliate_code("ABC123").is_err()); // too short
        assert!(validate_affiliate_code("ABC12345").is_err()); // too long
        assert!(validate_affiliate_code("ABC-123").is_err()); // bad char
    }

    #[test]
    fn test_token_string_is_opaque_and_long() {
        let t1 = generate_token_string();
        let t2 = generate_token_string();
        assert_eq!(t1.len(), 48);
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane.doe@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }
}
