use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::error::{LdapError, Result};
use crate::protocol::{APP_BIND_REQUEST, APP_BIND_RESPONSE, LDAP_VERSION};
use tracing::debug;

/// Context tag of the simple authentication choice.
const AUTH_SIMPLE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleBindRequest {
    pub dn: String,
    pub password: String,
    pub controls: Vec<Control>,
}

impl SimpleBindRequest {
    pub fn new(dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            password: password.into(),
            controls: Vec::new(),
        }
    }

    /// `BindRequest ::= [APPLICATION 0] SEQUENCE { version, name, authentication }`
    pub(crate) fn encode(&self) -> Result<Packet> {
        // A DN with an empty password is an unauthenticated bind (RFC 4513 5.1.2).
        if !self.dn.is_empty() && self.password.is_empty() {
            return Err(LdapError::InvalidArgument(
                "empty password with a non-empty DN".to_string(),
            ));
        }
        Ok(Packet::constructed(Class::Application, APP_BIND_REQUEST)
            .with_child(Packet::integer(LDAP_VERSION))
            .with_child(Packet::octet_string(self.dn.clone()))
            .with_child(Packet::tagged_string(
                Class::Context,
                AUTH_SIMPLE,
                self.password.clone(),
            )))
    }
}

impl Connection {
    pub async fn simple_bind(&self, dn: &str, password: &str) -> Result<()> {
        self.bind(&SimpleBindRequest::new(dn, password)).await
    }

    pub async fn bind(&self, request: &SimpleBindRequest) -> Result<()> {
        let op = request.encode()?;
        self.simple_request(op, &request.controls, APP_BIND_RESPONSE)
            .await?;
        debug!(dn = %request.dn, "bind succeeded");
        Ok(())
    }
}
