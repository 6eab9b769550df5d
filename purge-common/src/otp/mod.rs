use rand::Rng;

use crate::threadrand::SecureRng;

pub const OTP_LENGTH: usize = 6;

pub struct Otp {}

impl Otp {
    /// Generates a numeric code of `length` digits. The leading digit is never zero, so the
    /// code keeps its length when treated as a number.
    pub fn generate(length: usize) -> String {
        let mut rng = SecureRng;
        (0..length)
            .map(|i| {
                let low = if i == 0 { 1 } else { 0 };
                (b'0' + rng.gen_range(low..10)) as char
            })
            .collect()
    }

    pub fn is_well_formed(code: &str) -> bool {
        code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn are_equal(given: &str, saved: &str) -> bool {
        let given = given.as_bytes();
        let saved = saved.as_bytes();

        if given.len() != saved.len() {
            return false;
        }

        // Do bitwise comparison to prevent timing attacks
        let otps_dont_match = saved
            .iter()
            .zip(given.iter())
            .fold(0u8, |acc, (s, g)| acc | (s ^ g));

        otps_dont_match == 0
    }
}
