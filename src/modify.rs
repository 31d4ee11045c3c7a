use crate::add::encode_attribute;
use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::entry::EntryAttribute;
use crate::error::Result;
use crate::protocol::{APP_MODIFY_REQUEST, APP_MODIFY_RESPONSE};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add = 0,
    Delete = 1,
    Replace = 2,
    /// RFC 4525
    Increment = 3,
}

impl ModifyOperation {
    fn ldif_keyword(self) -> &'static str {
        match self {
            ModifyOperation::Add => "add",
            ModifyOperation::Delete => "delete",
            ModifyOperation::Replace => "replace",
            ModifyOperation::Increment => "increment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub operation: ModifyOperation,
    pub modification: EntryAttribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub dn: String,
    pub changes: Vec<Change>,
    pub controls: Vec<Control>,
}

impl ModifyRequest {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            changes: Vec::new(),
            controls: Vec::new(),
        }
    }

    fn push(&mut self, operation: ModifyOperation, name: &str, values: Vec<String>) -> &mut Self {
        self.changes.push(Change {
            operation,
            modification: EntryAttribute::new(name, values),
        });
        self
    }

    pub fn add(&mut self, name: &str, values: Vec<String>) -> &mut Self {
        self.push(ModifyOperation::Add, name, values)
    }

    /// Empty `values` deletes the whole attribute.
    pub fn delete(&mut self, name: &str, values: Vec<String>) -> &mut Self {
        self.push(ModifyOperation::Delete, name, values)
    }

    /// Empty `values` removes the attribute if present.
    pub fn replace(&mut self, name: &str, values: Vec<String>) -> &mut Self {
        self.push(ModifyOperation::Replace, name, values)
    }

    pub fn increment(&mut self, name: &str, by: i64) -> &mut Self {
        self.push(ModifyOperation::Increment, name, vec![by.to_string()])
    }

    /// `ModifyRequest ::= [APPLICATION 6] SEQUENCE { object, changes SEQUENCE OF change }`
    pub(crate) fn encode(&self) -> Packet {
        let mut changes = Packet::sequence();
        for change in &self.changes {
            changes.append_child(
                Packet::sequence()
                    .with_child(Packet::enumerated(change.operation as i64))
                    .with_child(encode_attribute(&change.modification)),
            );
        }
        Packet::constructed(Class::Application, APP_MODIFY_REQUEST)
            .with_child(Packet::octet_string(self.dn.clone()))
            .with_child(changes)
    }
}

/// LDIF change record.
impl fmt::Display for ModifyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dn: {}", self.dn)?;
        writeln!(f, "changetype: modify")?;
        for change in &self.changes {
            let name = &change.modification.name;
            writeln!(f, "{}: {}", change.operation.ldif_keyword(), name)?;
            for value in &change.modification.values {
                writeln!(f, "{}: {}", name, value)?;
            }
            writeln!(f, "-")?;
        }
        Ok(())
    }
}

impl Connection {
    pub async fn modify(&self, request: &ModifyRequest) -> Result<()> {
        self.simple_request(request.encode(), &request.controls, APP_MODIFY_RESPONSE)
            .await?;
        Ok(())
    }
}
