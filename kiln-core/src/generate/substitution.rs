//! Placeholder token rewriting
//!
//! Strategy steps refer to build fields with `$(build.*)` tokens. The
//! execution engine only understands its own `$(inputs.*)`/`$(outputs.*)`
//! variables, so every token is rewritten before a plan is created.

/// Token and the engine variable it is rewritten to
pub const TOKEN_TABLE: [(&str, &str); 4] = [
    ("$(build.output.image)", "$(outputs.resources.image.url)"),
    ("$(build.builder.image)", "$(inputs.params.BUILDER_IMAGE)"),
    ("$(build.dockerfile)", "$(inputs.params.DOCKERFILE)"),
    ("$(build.source.contextDir)", "$(inputs.params.PATH_CONTEXT)"),
];

// A replacement containing a token would make the result depend on the
// order of the table.
const _: () = assert!(replacements_are_token_free());

const fn contains(haystack: &str, needle: &str) -> bool {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.len() > h.len() {
        return false;
    }

    let mut i = 0;
    while i + n.len() <= h.len() {
        let mut j = 0;
        while j < n.len() && h[i + j] == n[j] {
            j += 1;
        }
        if j == n.len() {
            return true;
        }
        i += 1;
    }
    false
}

const fn replacements_are_token_free() -> bool {
    let mut r = 0;
    while r < TOKEN_TABLE.len() {
        let mut t = 0;
        while t < TOKEN_TABLE.len() {
            if contains(TOKEN_TABLE[r].1, TOKEN_TABLE[t].0) {
                return false;
            }
            t += 1;
        }
        r += 1;
    }
    true
}

/// Replaces every occurrence of every known token
pub fn substitute(input: &str) -> String {
    TOKEN_TABLE
        .iter()
        .fold(input.to_string(), |acc, (token, replacement)| {
            acc.replace(token, replacement)
        })
}

/// Substitutes each element of a list
pub fn substitute_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| substitute(v)).collect()
}

/// Returns true when the input still holds a known token
pub fn contains_token(input: &str) -> bool {
    TOKEN_TABLE.iter().any(|(token, _)| input.contains(token))
}
