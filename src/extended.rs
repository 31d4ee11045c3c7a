use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::error::{LdapError, Result};
use crate::protocol::{APP_EXTENDED_REQUEST, APP_EXTENDED_RESPONSE, WHO_AM_I_OID};

const REQUEST_NAME_TAG: u8 = 0;
const REQUEST_VALUE_TAG: u8 = 1;
const RESPONSE_NAME_TAG: u8 = 10;
const RESPONSE_VALUE_TAG: u8 = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub name: String,
    pub value: Option<Vec<u8>>,
    pub controls: Vec<Control>,
}

impl ExtendedRequest {
    pub fn new(name: impl Into<String>, value: Option<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value,
            controls: Vec::new(),
        }
    }

    /// `ExtendedRequest ::= [APPLICATION 23] SEQUENCE { requestName [0], requestValue [1] OPTIONAL }`
    pub(crate) fn encode(&self) -> Result<Packet> {
        if self.name.is_empty() {
            return Err(LdapError::InvalidArgument(
                "extended request needs an OID".to_string(),
            ));
        }
        let mut op = Packet::constructed(Class::Application, APP_EXTENDED_REQUEST).with_child(
            Packet::tagged_string(Class::Context, REQUEST_NAME_TAG, self.name.clone()),
        );
        if let Some(value) = &self.value {
            op.append_child(Packet::tagged_bytes(
                Class::Context,
                REQUEST_VALUE_TAG,
                value.clone(),
            ));
        }
        Ok(op)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedResponse {
    pub name: Option<String>,
    pub value: Option<Vec<u8>>,
}

/// Pull responseName and responseValue out of an ExtendedResponse op. The
/// LDAPResult fields must already have been checked.
pub(crate) fn decode_extended_response(op: &Packet) -> ExtendedResponse {
    let mut response = ExtendedResponse::default();
    for field in op.children().iter().skip(3) {
        if field.is(Class::Context, RESPONSE_NAME_TAG) {
            response.name = Some(field.to_string_lossy());
        } else if field.is(Class::Context, RESPONSE_VALUE_TAG) {
            response.value = Some(field.as_bytes().to_vec());
        }
    }
    response
}

impl Connection {
    pub async fn extended(&self, name: &str, value: Option<Vec<u8>>) -> Result<ExtendedResponse> {
        self.extended_request(&ExtendedRequest::new(name, value)).await
    }

    pub async fn extended_request(&self, request: &ExtendedRequest) -> Result<ExtendedResponse> {
        let op = request.encode()?;
        let response = self
            .simple_request(op, &request.controls, APP_EXTENDED_RESPONSE)
            .await?;
        Ok(decode_extended_response(&response))
    }

    /// RFC 4532 authorization identity, e.g. `dn:uid=jdoe,dc=example,dc=com`.
    /// Empty for an anonymous session.
    pub async fn who_am_i(&self) -> Result<String> {
        let response = self.extended(WHO_AM_I_OID, None).await?;
        Ok(response
            .value
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_default())
    }
}
