//! Redis-style glob patterns for key scans.

/// Escape glob metacharacters so `raw` matches only itself.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Match `text` against a glob supporting `*`, `?` and `\` escapes.
///
/// Character classes are not supported; `[` and `]` match literally.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position after the last `*` seen and the text position it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c if c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
        }

        match star {
            Some((after_star, tried)) => {
                p = after_star;
                t = tried + 1;
                star = Some((after_star, tried + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_wildcards() {
        assert!(glob_match("ratelimit:*", "ratelimit:1.2.3.4:/a:minute:60"));
        assert!(!glob_match("ratelimit:*", "forex:latest:USD:default"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_escaped_metacharacters() {
        let pattern = format!("{}:*", escape_glob("we*rd?"));
        assert!(glob_match(&pattern, "we*rd?:x"));
        assert!(!glob_match(&pattern, "weird!:x"));
        assert_eq!(escape_glob("a[b]\\"), "a\\[b\\]\\\\");
    }
}
