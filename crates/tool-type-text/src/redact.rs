/// Log-safe preview of a committed value.
pub fn value(raw: &str, max_chars: usize) -> String {
    let count = raw.chars().count();
    if count <= max_chars {
        return raw.to_string();
    }
    let head: String = raw.chars().take(max_chars).collect();
    format!("{head}...({count} chars)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_values_are_truncated_by_chars() {
        assert_eq!(value("100000103722927", 32), "100000103722927");
        assert_eq!(value("国能e购国能e购", 4), "国能e购...(8 chars)");
    }
}
