use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::verification::VerificationCode;

const CODE_LENGTH: usize = 6;

pub fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}

/// Trims `raw` and checks it is a six-digit code.
pub fn parse_code(raw: &str) -> Result<&str, AppError> {
    let code = raw.trim();
    if code.len() != CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "code must be {CODE_LENGTH} digits"
        )));
    }
    Ok(code)
}

/// Consumes `stored` if `submitted` matches it. A code verifies once.
pub fn verify_code(
    stored: &mut VerificationCode,
    submitted: &str,
    verified_by: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let submitted = parse_code(submitted)?;

    if stored.is_consumed() {
        return Err(AppError::InvalidState("code has already been used".to_string()));
    }
    if stored.code != submitted {
        return Err(AppError::Validation("code does not match".to_string()));
    }

    stored.verified_at = Some(now);
    stored.verified_by = Some(verified_by);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{generate_code, parse_code, verify_code};
    use crate::error::AppError;
    use crate::models::verification::VerificationCode;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert!(parse_code(&code).is_ok(), "bad code {code}");
        }
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(matches!(parse_code("12345"), Err(AppError::Validation(_))));
        assert!(matches!(parse_code("12a456"), Err(AppError::Validation(_))));
        assert_eq!(parse_code(" 012345 ").unwrap(), "012345");
    }

    #[test]
    fn code_verifies_once() {
        let mut stored = VerificationCode::issue("424242".to_string(), Utc::now());
        let courier = Uuid::new_v4();

        assert!(matches!(
            verify_code(&mut stored, "111111", courier, Utc::now()),
            Err(AppError::Validation(_))
        ));
        assert!(verify_code(&mut stored, "424242", courier, Utc::now()).is_ok());
        assert_eq!(stored.verified_by, Some(courier));
        assert!(matches!(
            verify_code(&mut stored, "424242", courier, Utc::now()),
            Err(AppError::InvalidState(_))
        ));
    }
}
