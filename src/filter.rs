// RFC 4515 string filters <-> BER Filter elements.

use crate::ber::{Class, Packet, Value};
use crate::error::{LdapError, Result};

pub const FILTER_AND: u8 = 0;
pub const FILTER_OR: u8 = 1;
pub const FILTER_NOT: u8 = 2;
pub const FILTER_EQUALITY: u8 = 3;
pub const FILTER_SUBSTRINGS: u8 = 4;
pub const FILTER_GREATER_OR_EQUAL: u8 = 5;
pub const FILTER_LESS_OR_EQUAL: u8 = 6;
pub const FILTER_PRESENT: u8 = 7;
pub const FILTER_APPROX_MATCH: u8 = 8;
pub const FILTER_EXTENSIBLE_MATCH: u8 = 9;

const SUBSTRING_INITIAL: u8 = 0;
const SUBSTRING_ANY: u8 = 1;
const SUBSTRING_FINAL: u8 = 2;

const MATCHING_RULE: u8 = 1;
const MATCHING_TYPE: u8 = 2;
const MATCH_VALUE: u8 = 3;
const DN_ATTRIBUTES: u8 = 4;

const MAX_DEPTH: usize = 64;

/// Compile a string filter such as `(&(objectClass=person)(cn=Jo*))`.
pub fn compile(filter: &str) -> Result<Packet> {
    let bytes = filter.as_bytes();
    if bytes.is_empty() {
        return Err(compile_error("empty filter"));
    }
    let (packet, pos) = parse_filter(bytes, 0, 0)?;
    if pos != bytes.len() {
        return Err(compile_error(&format!(
            "unexpected characters after filter at position {}",
            pos
        )));
    }
    Ok(packet)
}

/// Render a Filter element back to RFC 4515 form.
pub fn decompile(packet: &Packet) -> Result<String> {
    let mut out = String::new();
    decompile_into(packet, &mut out, 0)?;
    Ok(out)
}

/// Escape a value for use inside a filter assertion.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for use as an RDN attribute value (RFC 4514).
pub fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' | ',' | '+' | '"' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

fn compile_error(message: &str) -> LdapError {
    LdapError::FilterCompile(message.to_string())
}

fn decompile_error(message: &str) -> LdapError {
    LdapError::FilterDecompile(message.to_string())
}

fn parse_filter(s: &[u8], pos: usize, depth: usize) -> Result<(Packet, usize)> {
    if depth > MAX_DEPTH {
        return Err(compile_error("filter nested too deeply"));
    }
    if s.get(pos) != Some(&b'(') {
        return Err(compile_error(&format!("expected '(' at position {}", pos)));
    }
    let pos = pos + 1;
    match s.get(pos) {
        Some(b'&') => parse_set(s, pos + 1, FILTER_AND, depth),
        Some(b'|') => parse_set(s, pos + 1, FILTER_OR, depth),
        Some(b'!') => {
            let (child, next) = parse_filter(s, pos + 1, depth + 1)?;
            if s.get(next) != Some(&b')') {
                return Err(compile_error(&format!("expected ')' at position {}", next)));
            }
            let not = Packet::constructed(Class::Context, FILTER_NOT).with_child(child);
            Ok((not, next + 1))
        }
        Some(_) => parse_item(s, pos),
        None => Err(compile_error("unexpected end of filter")),
    }
}

fn parse_set(s: &[u8], mut pos: usize, tag: u8, depth: usize) -> Result<(Packet, usize)> {
    let mut set = Packet::constructed(Class::Context, tag);
    while s.get(pos) == Some(&b'(') {
        let (child, next) = parse_filter(s, pos, depth + 1)?;
        set.append_child(child);
        pos = next;
    }
    if s.get(pos) != Some(&b')') {
        return Err(compile_error(&format!("expected ')' at position {}", pos)));
    }
    Ok((set, pos + 1))
}

enum ItemKind {
    Equality,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
    Extensible,
}

fn parse_item(s: &[u8], start: usize) -> Result<(Packet, usize)> {
    let end = s[start..]
        .iter()
        .position(|&b| b == b')')
        .map(|offset| start + offset)
        .ok_or_else(|| compile_error("unterminated filter item"))?;
    let item = &s[start..end];
    let eq = item
        .iter()
        .position(|&b| b == b'=')
        .ok_or_else(|| compile_error("filter item has no '='"))?;
    if eq == 0 {
        return Err(compile_error("filter item has no attribute"));
    }
    let (attr_end, kind) = match item[eq - 1] {
        b'~' => (eq - 1, ItemKind::Approx),
        b'>' => (eq - 1, ItemKind::GreaterOrEqual),
        b'<' => (eq - 1, ItemKind::LessOrEqual),
        b':' => (eq - 1, ItemKind::Extensible),
        _ => (eq, ItemKind::Equality),
    };
    let attr = &item[..attr_end];
    let raw_value = &item[eq + 1..];
    if attr.is_empty() {
        return Err(compile_error("filter item has no attribute"));
    }

    let packet = match kind {
        ItemKind::Approx => assertion(FILTER_APPROX_MATCH, attr, raw_value)?,
        ItemKind::GreaterOrEqual => assertion(FILTER_GREATER_OR_EQUAL, attr, raw_value)?,
        ItemKind::LessOrEqual => assertion(FILTER_LESS_OR_EQUAL, attr, raw_value)?,
        ItemKind::Extensible => extensible(attr, raw_value)?,
        ItemKind::Equality if raw_value == b"*" => {
            Packet::tagged_bytes(Class::Context, FILTER_PRESENT, attr.to_vec())
        }
        ItemKind::Equality if raw_value.contains(&b'*') => substrings(attr, raw_value)?,
        ItemKind::Equality => assertion(FILTER_EQUALITY, attr, raw_value)?,
    };
    Ok((packet, end + 1))
}

fn attribute_description(attr: &[u8]) -> Result<Packet> {
    let name = std::str::from_utf8(attr)
        .map_err(|_| compile_error("attribute description is not UTF-8"))?;
    Ok(Packet::octet_string(name))
}

fn assertion(tag: u8, attr: &[u8], raw_value: &[u8]) -> Result<Packet> {
    Ok(Packet::constructed(Class::Context, tag)
        .with_child(attribute_description(attr)?)
        .with_child(Packet::octet_bytes(unescape(raw_value)?)))
}

fn substrings(attr: &[u8], raw_value: &[u8]) -> Result<Packet> {
    let parts: Vec<&[u8]> = raw_value.split(|&b| b == b'*').collect();
    let last = parts.len() - 1;
    let mut sequence = Packet::sequence();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        let tag = if i == 0 {
            SUBSTRING_INITIAL
        } else if i == last {
            SUBSTRING_FINAL
        } else {
            SUBSTRING_ANY
        };
        sequence.append_child(Packet::tagged_bytes(Class::Context, tag, unescape(part)?));
    }
    if sequence.children().is_empty() {
        return Err(compile_error("substring filter has no substrings"));
    }
    Ok(Packet::constructed(Class::Context, FILTER_SUBSTRINGS)
        .with_child(attribute_description(attr)?)
        .with_child(sequence))
}

/// `attr[:dn][:rule]:=value` or `[:dn]:rule:=value`.
fn extensible(attr: &[u8], raw_value: &[u8]) -> Result<Packet> {
    let mut parts = attr.split(|&b| b == b':');
    let attribute_type = parts.next().unwrap_or_default();
    let mut dn_attributes = false;
    let mut matching_rule: Option<&[u8]> = None;
    for part in parts {
        if part.eq_ignore_ascii_case(b"dn") && !dn_attributes && matching_rule.is_none() {
            dn_attributes = true;
        } else if matching_rule.is_none() && !part.is_empty() {
            matching_rule = Some(part);
        } else {
            return Err(compile_error("malformed extensible match"));
        }
    }
    if attribute_type.is_empty() && matching_rule.is_none() {
        return Err(compile_error(
            "extensible match needs an attribute type or a matching rule",
        ));
    }

    let mut packet = Packet::constructed(Class::Context, FILTER_EXTENSIBLE_MATCH);
    if let Some(rule) = matching_rule {
        packet.append_child(Packet::tagged_bytes(Class::Context, MATCHING_RULE, rule.to_vec()));
    }
    if !attribute_type.is_empty() {
        packet.append_child(Packet::tagged_bytes(
            Class::Context,
            MATCHING_TYPE,
            attribute_type.to_vec(),
        ));
    }
    packet.append_child(Packet::tagged_bytes(
        Class::Context,
        MATCH_VALUE,
        unescape(raw_value)?,
    ));
    if dn_attributes {
        packet.append_child(Packet::tagged_boolean(Class::Context, DN_ATTRIBUTES, true));
    }
    Ok(packet)
}

fn unescape(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\\' => {
                let hex = raw
                    .get(i + 1..i + 3)
                    .ok_or_else(|| compile_error("truncated escape sequence"))?;
                let hex = std::str::from_utf8(hex)
                    .map_err(|_| compile_error("invalid escape sequence"))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|_| compile_error(&format!("invalid escape sequence \\{}", hex)))?;
                out.push(byte);
                i += 3;
            }
            b'(' | b'*' => {
                return Err(compile_error("unescaped special character in value"));
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn escape_bytes(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(s) => escape_filter_value(s),
        Err(_) => {
            let mut out = String::new();
            for &b in value {
                match b {
                    b'\\' | b'*' | b'(' | b')' | 0 => out.push_str(&format!("\\{:02x}", b)),
                    0x80..=0xFF => out.push_str(&format!("\\{:02x}", b)),
                    _ => out.push(b as char),
                }
            }
            out
        }
    }
}

fn decompile_into(packet: &Packet, out: &mut String, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(decompile_error("filter nested too deeply"));
    }
    if packet.class() != Class::Context {
        return Err(decompile_error("filter element must be context-specific"));
    }
    out.push('(');
    match packet.tag() {
        FILTER_AND | FILTER_OR => {
            out.push(if packet.tag() == FILTER_AND { '&' } else { '|' });
            for child in packet.children() {
                decompile_into(child, out, depth + 1)?;
            }
        }
        FILTER_NOT => {
            out.push('!');
            let child = packet
                .children()
                .first()
                .ok_or_else(|| decompile_error("NOT filter without operand"))?;
            decompile_into(child, out, depth + 1)?;
        }
        FILTER_EQUALITY | FILTER_GREATER_OR_EQUAL | FILTER_LESS_OR_EQUAL | FILTER_APPROX_MATCH => {
            let (attr, value) = assertion_parts(packet)?;
            out.push_str(&attr);
            out.push_str(match packet.tag() {
                FILTER_EQUALITY => "=",
                FILTER_GREATER_OR_EQUAL => ">=",
                FILTER_LESS_OR_EQUAL => "<=",
                _ => "~=",
            });
            out.push_str(&escape_bytes(value));
        }
        FILTER_SUBSTRINGS => {
            let (attr, _) = assertion_parts(packet)?;
            let parts = packet
                .children()
                .get(1)
                .ok_or_else(|| decompile_error("substring filter without substrings"))?;
            out.push_str(&attr);
            out.push('=');
            let mut ends_with_final = false;
            for part in parts.children() {
                match part.tag() {
                    SUBSTRING_INITIAL => {}
                    SUBSTRING_ANY | SUBSTRING_FINAL => out.push('*'),
                    other => {
                        return Err(decompile_error(&format!("unknown substring tag {}", other)))
                    }
                }
                out.push_str(&escape_bytes(part.as_bytes()));
                ends_with_final = part.tag() == SUBSTRING_FINAL;
            }
            if !ends_with_final {
                out.push('*');
            }
        }
        FILTER_PRESENT => {
            out.push_str(&packet.to_string_lossy());
            out.push_str("=*");
        }
        FILTER_EXTENSIBLE_MATCH => {
            let mut rule = None;
            let mut attribute_type = None;
            let mut value: &[u8] = &[];
            let mut dn_attributes = false;
            for child in packet.children() {
                match child.tag() {
                    MATCHING_RULE => rule = Some(child.to_string_lossy()),
                    MATCHING_TYPE => attribute_type = Some(child.to_string_lossy()),
                    MATCH_VALUE => value = child.as_bytes(),
                    DN_ATTRIBUTES => dn_attributes = child.as_bool()?,
                    other => {
                        return Err(decompile_error(&format!(
                            "unknown extensible match field {}",
                            other
                        )))
                    }
                }
            }
            if let Some(t) = attribute_type {
                out.push_str(&t);
            }
            if dn_attributes {
                out.push_str(":dn");
            }
            if let Some(r) = rule {
                out.push(':');
                out.push_str(&r);
            }
            out.push_str(":=");
            out.push_str(&escape_bytes(value));
        }
        other => return Err(decompile_error(&format!("unknown filter tag {}", other))),
    }
    out.push(')');
    Ok(())
}

fn assertion_parts(packet: &Packet) -> Result<(String, &[u8])> {
    let attr = packet
        .children()
        .first()
        .ok_or_else(|| decompile_error("filter item without attribute"))?;
    let value = match packet.children().get(1) {
        Some(v) if !matches!(v.value(), Value::None) => v.as_bytes(),
        _ => &[],
    };
    Ok((attr.to_string_lossy(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber;

    fn roundtrip(filter: &str) -> String {
        let packet = compile(filter).unwrap();
        let wire = ber::decode(&packet.to_bytes()).unwrap();
        decompile(&wire).unwrap()
    }

    #[test]
    fn test_compile_equality() {
        let packet = compile("(cn=John)").unwrap();
        assert!(packet.is(Class::Context, FILTER_EQUALITY));
        assert_eq!(packet.child(0).unwrap().as_str().unwrap(), "cn");
        assert_eq!(packet.child(1).unwrap().as_bytes(), b"John");
    }

    #[test]
    fn test_compile_present() {
        let packet = compile("(objectClass=*)").unwrap();
        assert!(packet.is(Class::Context, FILTER_PRESENT));
        assert!(!packet.is_constructed());
        assert_eq!(packet.to_bytes()[0], 0x87);
    }

    #[test]
    fn test_compile_substrings() {
        let packet = compile("(cn=Jo*h*n)").unwrap();
        let parts = packet.child(1).unwrap();
        let tags: Vec<u8> = parts.children().iter().map(|p| p.tag()).collect();
        assert_eq!(tags, vec![SUBSTRING_INITIAL, SUBSTRING_ANY, SUBSTRING_FINAL]);
    }

    #[test]
    fn test_decompile_matches_input() {
        for filter in [
            "(cn=John)",
            "(objectClass=*)",
            "(&(objectClass=person)(|(cn=a*)(sn=*b))(!(uid=root)))",
            "(cn=*foo*)",
            "(cn=a*b*c)",
            "(age>=21)",
            "(age<=65)",
            "(cn~=jon)",
            "(cn:caseExactMatch:=Fred)",
            "(cn:dn:2.5.13.5:=John)",
            "(:dn:2.4.6.8.10:=Dino)",
            "(cn=a\\2ab)",
            "(&)",
        ] {
            assert_eq!(roundtrip(filter), filter);
        }
    }

    #[test]
    fn test_escaped_value_survives() {
        let packet = compile("(cn=\\28x\\29)").unwrap();
        assert_eq!(packet.child(1).unwrap().as_bytes(), b"(x)");
        assert_eq!(decompile(&packet).unwrap(), "(cn=\\28x\\29)");
    }

    #[test]
    fn test_compile_errors() {
        for bad in [
            "",
            "cn=John",
            "(cn=John",
            "(cn=John))",
            "(=John)",
            "(cnJohn)",
            "(cn=\\zz)",
            "(&(cn=a)",
            "(cn=**)",
            "(:=x)",
        ] {
            assert!(
                matches!(compile(bad), Err(LdapError::FilterCompile(_))),
                "expected error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_decompile_rejects_unknown_tag() {
        let packet = Packet::constructed(Class::Context, 12);
        assert!(matches!(decompile(&packet), Err(LdapError::FilterDecompile(_))));
    }

    #[test]
    fn test_escape_helpers() {
        assert_eq!(escape_filter_value("a*(b)\\"), "a\\2a\\28b\\29\\5c");
        assert_eq!(escape_dn_value("Smith, John"), "Smith\\, John");
        assert_eq!(escape_dn_value("#1 "), "\\#1\\ ");
    }
}
