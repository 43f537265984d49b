use std::collections::BTreeSet;

/// Turns the comma separated tag input into a tag list. Whitespace is dropped
/// everywhere, so `"travel, summer nights"` yields `travel` and
/// `summernights`. Empty entries are skipped.
#[must_use]
pub fn parse_tags(input: &str) -> Vec<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    compact
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Flips membership of `member` and reports whether it is now present.
pub fn toggle_member<T: Ord>(set: &mut BTreeSet<T>, member: T) -> bool {
    if set.remove(&member) {
        false
    } else {
        set.insert(member);
        true
    }
}
