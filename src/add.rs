use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::entry::EntryAttribute;
use crate::error::{LdapError, Result};
use crate::protocol::{APP_ADD_REQUEST, APP_ADD_RESPONSE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub dn: String,
    pub attributes: Vec<EntryAttribute>,
    pub controls: Vec<Control>,
}

impl AddRequest {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
            controls: Vec::new(),
        }
    }

    pub fn attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.push(EntryAttribute::new(
            name,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// `AddRequest ::= [APPLICATION 8] SEQUENCE { entry LDAPDN, attributes AttributeList }`
    pub(crate) fn encode(&self) -> Result<Packet> {
        let mut attributes = Packet::sequence();
        for attribute in &self.attributes {
            if attribute.byte_values.is_empty() {
                return Err(LdapError::InvalidArgument(format!(
                    "attribute {} has no values",
                    attribute.name
                )));
            }
            attributes.append_child(encode_attribute(attribute));
        }
        Ok(Packet::constructed(Class::Application, APP_ADD_REQUEST)
            .with_child(Packet::octet_string(self.dn.clone()))
            .with_child(attributes))
    }
}

/// `SEQUENCE { type AttributeDescription, vals SET OF AttributeValue }`
pub(crate) fn encode_attribute(attribute: &EntryAttribute) -> Packet {
    let mut values = Packet::set();
    for value in &attribute.byte_values {
        values.append_child(Packet::octet_bytes(value.clone()));
    }
    Packet::sequence()
        .with_child(Packet::octet_string(attribute.name.clone()))
        .with_child(values)
}

impl Connection {
    pub async fn add(&self, request: &AddRequest) -> Result<()> {
        let op = request.encode()?;
        self.simple_request(op, &request.controls, APP_ADD_RESPONSE)
            .await?;
        Ok(())
    }
}
