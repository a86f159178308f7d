//! Secrets handed to users who cannot log in: numeric reset codes and
//! temporary passwords.

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*";

pub const RESET_CODE_DIGITS: usize = 6;
pub const TEMPORARY_PASSWORD_LEN: usize = 12;

/// A zero-padded six digit code.
pub fn reset_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

/// Random password of at least `min_len` characters (and never fewer than
/// [`TEMPORARY_PASSWORD_LEN`]) with at least one upper case letter, one lower
/// case letter, one digit and one symbol.
pub fn temporary_password(min_len: usize) -> String {
    let mut rng = rand::rng();
    let len = min_len.max(TEMPORARY_PASSWORD_LEN);
    let classes = [UPPER, LOWER, DIGITS, SPECIAL];
    let alphabet = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .filter_map(|class| class.choose(&mut rng).copied())
        .collect();
    while chars.len() < len {
        if let Some(c) = alphabet.choose(&mut rng) {
            chars.push(*c);
        }
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}
