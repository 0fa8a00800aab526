use crate::error::{Error, Result};
use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};
use url::Url;

pub const DIGITS: usize = 6;
pub const PERIOD: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCode {
    pub code: String,
    pub seconds_remaining: u64,
}

/// Strip whitespace and padding, uppercase, then Base32-decode.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    let cleaned: String = secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .trim_end_matches('=')
        .to_uppercase();

    let bytes = Secret::Encoded(cleaned)
        .to_bytes()
        .map_err(|e| Error::Validation(format!("Invalid OTP secret (base32): {e:?}")))?;
    if bytes.is_empty() {
        return Err(Error::Validation(
            "OTP secret decoded to empty byte string".to_string(),
        ));
    }
    Ok(bytes)
}

/// Code for `secret` at unix time `time` (SHA1, 6 digits, 30s step).
pub fn generate_at(secret: &str, time: u64) -> Result<OtpCode> {
    let bytes = decode_secret(secret)?;
    // unchecked: providers like GitHub hand out 80-bit secrets
    let totp = TOTP::new_unchecked(Algorithm::SHA1, DIGITS, 1, PERIOD, bytes);
    Ok(OtpCode {
        code: totp.generate(time),
        seconds_remaining: PERIOD - time % PERIOD,
    })
}

pub fn generate_current(secret: &str) -> Result<OtpCode> {
    let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
    generate_at(secret, now)
}

/// Accept a bare Base32 secret or an `otpauth://totp/...` URL and return
/// the Base32 secret.
pub fn parse_secret_input(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Validation("OTP secret cannot be empty".to_string()));
    }

    if !input.starts_with("otpauth://") {
        decode_secret(input)?;
        return Ok(input.to_string());
    }

    let url = Url::parse(input)
        .map_err(|e| Error::Validation(format!("Invalid otpauth URL: {e}")))?;
    let kind = url.host_str().unwrap_or("").to_lowercase();
    if kind != "totp" {
        return Err(Error::Validation(format!(
            "Unsupported otpauth type '{kind}', only 'totp' is supported"
        )));
    }

    let mut secret = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "secret" => secret = Some(v.to_string()),
            "digits" if v.parse::<usize>().ok() != Some(DIGITS) => {
                return Err(Error::Validation(format!(
                    "Unsupported OTP digits '{v}', only {DIGITS} is supported"
                )));
            }
            "period" if v.parse::<u64>().ok() != Some(PERIOD) => {
                return Err(Error::Validation(format!(
                    "Unsupported OTP period '{v}', only {PERIOD}s is supported"
                )));
            }
            "algorithm" if !v.eq_ignore_ascii_case("SHA1") => {
                return Err(Error::Validation(format!(
                    "Unsupported OTP algorithm '{v}', only SHA1 is supported"
                )));
            }
            _ => {}
        }
    }

    let secret =
        secret.ok_or_else(|| Error::Validation("otpauth URL missing 'secret' param".to_string()))?;
    decode_secret(&secret)?;
    Ok(secret)
}
