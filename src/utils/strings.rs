//! Small text helpers for the descriptor strings produced by the external
//! polyhedral analysis (`[n] -> { S[i0] : ... }` and friends).

/// Text strictly between the first `open` and the next `close` after it.
pub fn between<'a>(s: &'a str, open: char, close: char) -> Option<&'a str> {
    let start = s.find(open)? + open.len_utf8();
    let len = s[start..].find(close)?;
    Some(&s[start..start + len])
}

/// Split on `sep` and trim every piece, dropping empty pieces.
pub fn split_trimmed<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    s.split(sep).map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Comma separated names inside the first `[...]` of `s`.
pub fn bracket_list(s: &str) -> Vec<String> {
    between(s, '[', ']')
        .map(|inner| split_trimmed(inner, ",").into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Replace whole identifiers in `expr`.
///
/// Every identifier for which `lookup` returns a value is replaced by that
/// value wrapped in parentheses, so `i0` in `2 + i0` becomes `2 + (0)`.
/// Identifiers are matched as whole tokens: substituting `n` leaves `n1` alone.
pub fn substitute_idents<F>(expr: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if !is_ident_start(c) {
            out.push(c);
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(idx, next)) = chars.peek() {
            if !is_ident_char(next) {
                break;
            }
            end = idx + next.len_utf8();
            chars.next();
        }
        let ident = &expr[start..end];
        match lookup(ident) {
            Some(value) => {
                out.push('(');
                out.push_str(&value);
                out.push(')');
            }
            None => out.push_str(ident),
        }
    }
    out
}

/// Whether `expr` still contains an identifier.
pub fn has_ident(expr: &str) -> bool {
    expr.chars().any(is_ident_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between_and_lists() {
        assert_eq!(between("[n] -> { S[i0] : i0 >= 0 }", '{', '}'), Some(" S[i0] : i0 >= 0 "));
        assert_eq!(between("no braces", '{', '}'), None);
        assert_eq!(bracket_list("Stmt_for_body[i0, i1]"), vec!["i0", "i1"]);
        assert!(bracket_list("Stmt").is_empty());
    }

    #[test]
    fn test_substitute_whole_identifiers() {
        let out = substitute_idents("2 + i0 + 3*i1 - n1", |name| match name {
            "i0" => Some("0".to_string()),
            "i1" => Some("-1 + n".to_string()),
            _ => None,
        });
        assert_eq!(out, "2 + (0) + 3*(-1 + n) - n1");
        assert!(has_ident(&out));
        assert!(!has_ident("2 + (0)"));
    }
}
