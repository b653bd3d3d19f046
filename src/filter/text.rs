//! Accent-insensitive patterns for the text operators.

const CLASSES: &[(char, &str)] = &[
    ('a', "aàáâãäåæ"),
    ('c', "cç"),
    ('e', "eèéêëẽ"),
    ('i', "iìíîïĩ"),
    ('n', "nñ"),
    ('o', "oòóôõöø"),
    ('u', "uùúûü"),
    ('s', "sšß"),
    ('y', "yýÿ"),
    ('z', "zž"),
];

/// Builds a regular expression matching `input` with any accent variant.
///
/// Characters outside the accent classes are escaped literally. The result
/// is meant to be used case-insensitively.
pub fn accent_to_regex(input: &str) -> String {
    let mut pattern = String::with_capacity(input.len() * 4);
    for ch in input.chars().flat_map(char::to_lowercase) {
        match CLASSES.iter().find(|(base, variants)| *base == ch || variants.contains(ch)) {
            Some((_, variants)) => {
                pattern.push('[');
                pattern.push_str(variants);
                pattern.push(']');
            }
            None => pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4]))),
        }
    }
    pattern
}
