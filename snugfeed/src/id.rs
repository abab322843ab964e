use nanoid::nanoid;
use uuid::Uuid;

/// Canonical alphabet for row identifiers (no ambiguous glyphs).
const ROW_ID_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y',
    'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
/// Default row id length.
const ROW_ID_LENGTH: usize = 20;

/// Generates a new row identifier using the configured alphabet and length.
pub fn generate_row_id() -> String {
    nanoid!(ROW_ID_LENGTH, ROW_ID_ALPHABET)
}

/// Opaque bearer token handed out by the auth service.
pub fn generate_access_token() -> String {
    Uuid::new_v4().simple().to_string()
}
