use nanoid::nanoid;

/// Canonical alphabet for generated document identifiers (no ambiguous glyphs).
const DOCUMENT_ID_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y',
    'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
/// Default document id length.
const DOCUMENT_ID_LENGTH: usize = 20;

/// Separator joining the two sorted user ids of a pair key.
///
/// Identifiers never contain it, so distinct pairs never share a key.
pub const PAIR_SEPARATOR: &str = "~";

/// Generates a new document identifier using the configured alphabet and length.
pub fn generate_document_id() -> String {
    nanoid!(DOCUMENT_ID_LENGTH, DOCUMENT_ID_ALPHABET)
}

/// Order-independent key for an unordered pair of user ids.
pub fn pair_key(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}{PAIR_SEPARATOR}{high}")
}

/// Deterministic id of the conversation between two users.
///
/// Both participants compute the same id regardless of who writes first.
pub fn conversation_id(a: &str, b: &str) -> String {
    pair_key(a, b)
}

/// Canonical relationship edge id used when edges are keyed by their pair.
pub fn canonical_edge_id(a: &str, b: &str) -> String {
    pair_key(a, b)
}

/// Id of the like marker a user leaves on a content item.
pub fn like_marker_id(content_id: &str, user_id: &str) -> String {
    format!("{content_id}:{user_id}")
}
