//! Lightweight scanning of embedded host-language code.
//!
//! Expressions and function bodies stay opaque strings; this module only
//! finds identifier-shaped words outside string literals and comments, and
//! classifies each one by the syntax immediately around it so references can
//! be rewritten without touching property names or object keys.

use std::ops::Range;

/// How an identifier occurrence is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    /// A plain read or write of a binding.
    Reference,
    /// `obj.name`
    Property,
    /// `{ name: value }`
    Key,
    /// `{ name }` in an object literal.
    Shorthand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident<'a> {
    pub name: &'a str,
    pub range: Range<usize>,
    pub kind: IdentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Brace,
    Paren,
    Bracket,
    /// Inside the text part of a template literal.
    Template,
    /// Inside `${ ... }` of a template literal.
    Substitution,
}

struct Scan<'a> {
    idents: Vec<Ident<'a>>,
    masked: Vec<u8>,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

fn scan(code: &str) -> Scan<'_> {
    let bytes = code.as_bytes();
    let mut masked = bytes.to_vec();
    let mut idents = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    // Last significant bytes of code, newest last.
    let mut recent: Vec<u8> = Vec::new();
    let mut i = 0;

    let blank = |masked: &mut Vec<u8>, range: Range<usize>| {
        for b in &mut masked[range] {
            *b = b' ';
        }
    };

    while i < bytes.len() {
        if stack.last() == Some(&Frame::Template) {
            let start = i;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 2,
                    b'`' => break,
                    b'$' if bytes.get(i + 1) == Some(&b'{') => break,
                    _ => i += 1,
                }
            }
            let end = i.min(bytes.len());
            blank(&mut masked, start..end);
            i = end;
            if i >= bytes.len() {
                break;
            }
            if bytes[i] == b'`' {
                stack.pop();
                i += 1;
                recent.push(b'`');
            } else {
                stack.push(Frame::Substitution);
                i += 2;
                recent.push(b'{');
            }
            continue;
        }

        let b = bytes[i];
        match b {
            b'\'' | b'"' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let end = (i + 1).min(bytes.len());
                blank(&mut masked, start + 1..end.saturating_sub(1).max(start + 1));
                i = end;
                recent.push(b);
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                blank(&mut masked, start..i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
                blank(&mut masked, start..i);
            }
            b'`' => {
                stack.push(Frame::Template);
                i += 1;
                recent.push(b);
            }
            b'0'..=b'9' => {
                while i < bytes.len() {
                    let c = bytes[i];
                    let decimal = c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                    if c.is_ascii_alphanumeric() || c == b'_' || decimal {
                        i += 1;
                    } else {
                        break;
                    }
                }
                recent.push(b'0');
            }
            _ if is_ident_start(b) => {
                let start = i;
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                let kind = classify(bytes, &recent, stack.last(), i);
                idents.push(Ident {
                    name: &code[start..i],
                    range: start..i,
                    kind,
                });
                for byte in &mut masked[start..i] {
                    if *byte >= 0x80 {
                        *byte = b'_';
                    }
                }
                recent.push(b'a');
            }
            b'{' => {
                stack.push(Frame::Brace);
                i += 1;
                recent.push(b);
            }
            b'(' => {
                stack.push(Frame::Paren);
                i += 1;
                recent.push(b);
            }
            b'[' => {
                stack.push(Frame::Bracket);
                i += 1;
                recent.push(b);
            }
            b'}' | b')' | b']' => {
                stack.pop();
                i += 1;
                recent.push(b);
            }
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                i += 1;
                recent.push(b);
            }
        }
        if recent.len() > 8 {
            recent.drain(..recent.len() - 4);
        }
    }

    Scan { idents, masked }
}

fn classify(bytes: &[u8], recent: &[u8], frame: Option<&Frame>, end: usize) -> IdentKind {
    let n = recent.len();
    if n > 0 && recent[n - 1] == b'.' {
        let spread = n >= 3 && recent[n - 2] == b'.' && recent[n - 3] == b'.';
        if !spread {
            return IdentKind::Property;
        }
    }

    let in_object = frame == Some(&Frame::Brace) && matches!(recent.last(), Some(b'{') | Some(b','));
    if !in_object {
        return IdentKind::Reference;
    }

    let mut j = end;
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    match bytes.get(j) {
        Some(b':') if bytes.get(j + 1) != Some(&b':') => IdentKind::Key,
        Some(b'}') | Some(b',') => IdentKind::Shorthand,
        _ => IdentKind::Reference,
    }
}

/// Every identifier occurrence in `code`, in source order.
pub fn identifiers(code: &str) -> Vec<Ident<'_>> {
    scan(code).idents
}

/// `code` with string contents, template text and comments blanked to spaces.
///
/// Byte offsets are preserved, so positions found in the mask index `code`.
pub fn mask(code: &str) -> String {
    scan(code)
        .masked
        .into_iter()
        .map(|b| if b >= 0x80 { ' ' } else { b as char })
        .collect()
}

/// Replace binding references for which `replace` returns a substitute.
///
/// Properties and object keys are never touched; a shorthand `{ x }` becomes
/// `{ x: <substitute> }`.
pub fn rewrite(code: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(code.len());
    let mut cursor = 0;

    for ident in identifiers(code) {
        let substitute = match ident.kind {
            IdentKind::Reference | IdentKind::Shorthand => replace(ident.name),
            IdentKind::Property | IdentKind::Key => None,
        };
        let Some(substitute) = substitute else {
            continue;
        };
        out.push_str(&code[cursor..ident.range.start]);
        if ident.kind == IdentKind::Shorthand {
            out.push_str(ident.name);
            out.push_str(": ");
        }
        out.push_str(&substitute);
        cursor = ident.range.end;
    }
    out.push_str(&code[cursor..]);
    out
}

/// Byte offsets of `needle` in the masked code at bracket depth zero.
pub fn top_level_matches(code: &str, needle: &str) -> Vec<usize> {
    let masked = mask(code);
    let bytes = masked.as_bytes();
    let mut depth = 0usize;
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ if depth == 0 && masked[i..].starts_with(needle) => found.push(i),
            _ => {}
        }
        i += 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(code: &str) -> Vec<(&str, IdentKind)> {
        identifiers(code)
            .into_iter()
            .map(|i| (i.name, i.kind))
            .collect()
    }

    fn qualify(code: &str) -> String {
        rewrite(code, |name| {
            ["count", "n", "items"]
                .contains(&name)
                .then(|| format!("s.{name}"))
        })
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    #[test]
    fn test_plain_references() {
        use IdentKind::*;
        assert_eq!(
            names("count * price + 1"),
            vec![("count", Reference), ("price", Reference)]
        );
    }

    #[test]
    fn test_strings_and_comments_skipped() {
        let found: Vec<_> = names("'count' + \"n\" /* items */ + x // y")
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(found, vec!["x"]);
    }

    #[test]
    fn test_template_substitutions_scanned() {
        let found: Vec<_> = names("`count ${n + `${items}`} done`")
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(found, vec!["n", "items"]);
    }

    #[test]
    fn test_property_and_spread() {
        use IdentKind::*;
        assert_eq!(
            names("a.count + [...items]"),
            vec![("a", Reference), ("count", Property), ("items", Reference)]
        );
    }

    #[test]
    fn test_object_keys_and_shorthand() {
        use IdentKind::*;
        assert_eq!(
            names("({ count: n, items })"),
            vec![("count", Key), ("n", Reference), ("items", Shorthand)]
        );
    }

    #[test]
    fn test_numbers_are_not_identifiers() {
        assert_eq!(names("1e5 + 0xff + 3.14 + 1_000"), vec![]);
    }

    #[test]
    fn test_mask_preserves_offsets() {
        let code = "f('a)b', x) // c";
        let masked = mask(code);
        assert_eq!(masked.len(), code.len());
        assert_eq!(masked, "f('   ', x)     ");
    }

    // =========================================================================
    // Rewriting
    // =========================================================================

    #[test]
    fn test_rewrite_references() {
        assert_eq!(qualify("n = n + 1"), "s.n = s.n + 1");
        assert_eq!(qualify("count++"), "s.count++");
    }

    #[test]
    fn test_rewrite_keeps_properties_and_keys() {
        assert_eq!(qualify("obj.count + n"), "obj.count + s.n");
        assert_eq!(qualify("({ count: 1 })"), "({ count: 1 })");
    }

    #[test]
    fn test_rewrite_shorthand() {
        assert_eq!(qualify("send({ count, x })"), "send({ count: s.count, x })");
    }

    #[test]
    fn test_rewrite_inside_template() {
        assert_eq!(qualify("`${n} of ${items.length}`"), "`${s.n} of ${s.items.length}`");
    }

    #[test]
    fn test_rewrite_ignores_longer_names() {
        assert_eq!(qualify("counter + count_2"), "counter + count_2");
    }

    #[test]
    fn test_top_level_matches() {
        assert_eq!(top_level_matches("(a) => { b => c }", "=>"), vec![4]);
        assert_eq!(top_level_matches("'=>'", "=>"), Vec::<usize>::new());
    }
}
