//! Random password, username and salt generation.

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::ValidationError;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const SALT_CHARS: &[u8] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub const DEFAULT_PASSWORD_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const MAX_PASSWORD_LENGTH: usize = 200;
const USERNAME_LENGTH: usize = 20;
const SALT_LENGTH: usize = 16;

/// How a password was generated. Stored encrypted next to generated
/// versions so that regeneration reproduces the same shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordParameters {
    pub length: usize,
    pub exclude_lower: bool,
    pub exclude_upper: bool,
    pub exclude_number: bool,
    pub include_special: bool,
}

impl Default for PasswordParameters {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_lower: false,
            exclude_upper: false,
            exclude_number: false,
            include_special: false,
        }
    }
}

impl PasswordParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&self.length) {
            return Err(ValidationError::InvalidPasswordParameters(
                "length must be between 4 and 200",
            ));
        }
        if self.charsets().is_empty() {
            return Err(ValidationError::InvalidPasswordParameters(
                "at least one character class must be included",
            ));
        }
        Ok(())
    }

    fn charsets(&self) -> Vec<&'static [u8]> {
        let mut sets = Vec::with_capacity(4);
        if !self.exclude_lower {
            sets.push(LOWER);
        }
        if !self.exclude_upper {
            sets.push(UPPER);
        }
        if !self.exclude_number {
            sets.push(DIGITS);
        }
        if self.include_special {
            sets.push(SPECIAL);
        }
        sets
    }
}

/// A password containing at least one character of every included class.
pub fn password(params: &PasswordParameters) -> Result<Zeroizing<String>, ValidationError> {
    params.validate()?;
    let sets = params.charsets();
    let mut rng = rand::rng();

    let mut chars: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(params.length));
    for set in &sets {
        chars.push(pick(&mut rng, set));
    }
    let all: Vec<u8> = sets.concat();
    while chars.len() < params.length {
        chars.push(pick(&mut rng, &all));
    }
    chars.shuffle(&mut rng);

    Ok(Zeroizing::new(chars.iter().map(|&b| b as char).collect()))
}

/// A random alphabetic username.
pub fn username() -> String {
    let mut rng = rand::rng();
    let letters = [LOWER, UPPER].concat();
    (0..USERNAME_LENGTH)
        .map(|_| pick(&mut rng, &letters) as char)
        .collect()
}

/// A SHA-512 crypt style salt, `$6$` followed by 16 salt characters.
pub fn salt() -> String {
    let mut rng = rand::rng();
    let body: String = (0..SALT_LENGTH)
        .map(|_| pick(&mut rng, SALT_CHARS) as char)
        .collect();
    format!("$6${body}")
}

fn pick(rng: &mut impl Rng, set: &[u8]) -> u8 {
    set[rng.random_range(0..set.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_password_is_alphanumeric() {
        let pw = password(&PasswordParameters::default()).unwrap();
        assert_eq!(pw.len(), DEFAULT_PASSWORD_LENGTH);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn every_included_class_is_present() {
        let params = PasswordParameters {
            length: 4,
            include_special: true,
            ..PasswordParameters::default()
        };
        for _ in 0..50 {
            let pw = password(&params).unwrap();
            assert!(pw.bytes().any(|b| LOWER.contains(&b)));
            assert!(pw.bytes().any(|b| UPPER.contains(&b)));
            assert!(pw.bytes().any(|b| DIGITS.contains(&b)));
            assert!(pw.bytes().any(|b| SPECIAL.contains(&b)));
        }
    }

    #[test]
    fn exclusions_are_honoured() {
        let params = PasswordParameters {
            exclude_lower: true,
            exclude_upper: true,
            ..PasswordParameters::default()
        };
        assert!(password(&params).unwrap().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn invalid_parameters() {
        let too_short = PasswordParameters {
            length: 3,
            ..PasswordParameters::default()
        };
        assert!(password(&too_short).is_err());

        let nothing = PasswordParameters {
            exclude_lower: true,
            exclude_upper: true,
            exclude_number: true,
            ..PasswordParameters::default()
        };
        assert_eq!(
            nothing.validate(),
            Err(ValidationError::InvalidPasswordParameters(
                "at least one character class must be included"
            ))
        );
    }

    #[test]
    fn salt_and_username_shape() {
        let s = salt();
        assert!(s.starts_with("$6$"));
        assert_eq!(s.len(), 3 + SALT_LENGTH);
        let u = username();
        assert_eq!(u.len(), USERNAME_LENGTH);
        assert!(u.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
