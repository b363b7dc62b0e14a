/// Glob match for parameter names: `*` spans any run of characters, `?`
/// exactly one.
pub(crate) fn name_matches(pattern: &str, name: &str) -> bool {
    fn walk(pattern: &[char], name: &[char]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                walk(&pattern[1..], name) || (!name.is_empty() && walk(pattern, &name[1..]))
            }
            (Some('?'), Some(_)) => walk(&pattern[1..], &name[1..]),
            (Some(p), Some(n)) if p == n => walk(&pattern[1..], &name[1..]),
            _ => false,
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    walk(&pattern, &name)
}

#[cfg(test)]
mod tests {
    use super::name_matches;

    #[test]
    fn globs() {
        assert!(name_matches("temp_*", "temp_sensor"));
        assert!(name_matches("*_sensor", "temp_sensor"));
        assert!(name_matches("t?mp_sensor", "temp_sensor"));
        assert!(name_matches("*", "anything"));
        assert!(!name_matches("temp_*", "tmp_sensor"));
        assert!(!name_matches("temp", "temp_sensor"));
    }
}
