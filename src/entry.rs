use std::fmt;

/// One attribute of an entry. `values` is the UTF-8 (lossy) view of `byte_values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttribute {
    pub name: String,
    pub values: Vec<String>,
    pub byte_values: Vec<Vec<u8>>,
}

impl EntryAttribute {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        let byte_values = values.iter().map(|v| v.as_bytes().to_vec()).collect();
        Self {
            name: name.into(),
            values,
            byte_values,
        }
    }

    pub fn from_bytes(name: impl Into<String>, byte_values: Vec<Vec<u8>>) -> Self {
        let values = byte_values
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect();
        Self {
            name: name.into(),
            values,
            byte_values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: Vec<EntryAttribute>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Attribute names compare case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&EntryAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn attribute_values(&self, name: &str) -> &[String] {
        self.attribute(name).map(|a| a.values.as_slice()).unwrap_or(&[])
    }

    pub fn attribute_byte_values(&self, name: &str) -> &[Vec<u8>] {
        self.attribute(name)
            .map(|a| a.byte_values.as_slice())
            .unwrap_or(&[])
    }

    /// First value, or "" when the attribute is absent.
    pub fn attribute_value(&self, name: &str) -> &str {
        self.attribute_values(name)
            .first()
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Append a value; empty values are ignored.
    pub fn add_attribute_value(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.push_value(name, value.as_bytes().to_vec());
    }

    pub fn add_attribute_values(&mut self, name: &str, values: &[&str]) {
        for value in values {
            self.add_attribute_value(name, value);
        }
    }

    pub(crate) fn push_values(&mut self, name: &str, values: Vec<Vec<u8>>) {
        for value in values {
            self.push_value(name, value);
        }
    }

    fn push_value(&mut self, name: &str, value: Vec<u8>) {
        let text = String::from_utf8_lossy(&value).into_owned();
        match self.attribute_index(name) {
            Some(index) => {
                let attribute = &mut self.attributes[index];
                attribute.values.push(text);
                attribute.byte_values.push(value);
            }
            None => self.attributes.push(EntryAttribute {
                name: name.to_string(),
                values: vec![text],
                byte_values: vec![value],
            }),
        }
    }
}

/// LDIF rendering.
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dn: {}", self.dn)?;
        for attribute in &self.attributes {
            for value in &attribute.values {
                writeln!(f, "{}: {}", attribute.name, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut entry = Entry::new("cn=John,dc=example,dc=com");
        entry.add_attribute_value("cn", "John");
        entry.add_attribute_value("objectClass", "person");
        entry.add_attribute_value("objectclass", "top");
        assert_eq!(entry.attribute_value("CN"), "John");
        assert_eq!(entry.attribute_values("OBJECTCLASS"), &["person", "top"]);
        assert_eq!(entry.attribute_value("mail"), "");
        assert!(entry.attribute_byte_values("mail").is_empty());
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let mut entry = Entry::new("cn=x");
        entry.add_attribute_value("description", "");
        assert!(entry.attributes.is_empty());
        entry.add_attribute_values("mail", &["", "a@x", "b@x"]);
        assert_eq!(entry.attribute_index("MAIL"), Some(0));
        assert_eq!(entry.attribute_values("mail"), &["a@x", "b@x"]);
    }

    #[test]
    fn test_binary_values() {
        let mut entry = Entry::new("cn=x");
        entry.push_values("jpegPhoto", vec![vec![0xFF, 0xD8]]);
        assert_eq!(entry.attribute_byte_values("jpegphoto"), &[vec![0xFFu8, 0xD8]]);
    }

    #[test]
    fn test_ldif() {
        let mut entry = Entry::new("uid=jdoe,ou=people,dc=example,dc=com");
        entry.add_attribute_value("uid", "jdoe");
        entry.add_attribute_value("mail", "jdoe@example.com");
        assert_eq!(
            entry.to_string(),
            "dn: uid=jdoe,ou=people,dc=example,dc=com\nuid: jdoe\nmail: jdoe@example.com\n"
        );
    }
}
