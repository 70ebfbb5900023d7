///
/// Identifier conversion between surface names and Rust names.
///
/// - Logical method names (`System_GetCPUUsageEx`) become snake_case host
///   names (`system_get_cpu_usage_ex`).
/// - Surface names (`audio_engine`) become PascalCase type names.
/// - Names colliding with Rust keywords are emitted as raw identifiers.
///

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "static", "struct", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Keywords that cannot be written as raw identifiers either.
const RESERVED: &[&str] = &["self", "Self", "super", "crate", "_"];

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

pub fn escape_keyword(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for segment in name.split('_').filter(|s| !s.is_empty()) {
        if !out.is_empty() {
            out.push('_');
        }
        let chars: Vec<char> = segment.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            if c.is_ascii_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
                if prev.is_ascii_lowercase() || (prev.is_ascii_uppercase() && next_lower) {
                    out.push('_');
                }
            }
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Open"), "open");
        assert_eq!(snake_case("System_Create"), "system_create");
        assert_eq!(snake_case("System_GetCPUUsageEx"), "system_get_cpu_usage_ex");
        assert_eq!(snake_case("Geometry_Get3DMinMax"), "geometry_get3d_min_max");
        assert_eq!(snake_case("Channel_SetLowPassGain"), "channel_set_low_pass_gain");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("audio_engine"), "AudioEngine");
        assert_eq!(pascal_case("System_GetVersion"), "SystemGetVersion");
        assert_eq!(pascal_case("native"), "Native");
    }

    #[test]
    fn test_identifiers_and_keywords() {
        assert!(is_identifier("sound"));
        assert!(is_identifier("_private9"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("has-dash"));
        assert!(!is_identifier(""));
        assert_eq!(escape_keyword("type"), "r#type");
        assert_eq!(escape_keyword("volume"), "volume");
        assert!(is_reserved("self"));
    }
}
