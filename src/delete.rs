use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::error::Result;
use crate::protocol::{APP_DEL_REQUEST, APP_DEL_RESPONSE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub dn: String,
    pub controls: Vec<Control>,
}

impl DeleteRequest {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            controls: Vec::new(),
        }
    }

    /// `DelRequest ::= [APPLICATION 10] LDAPDN`
    pub(crate) fn encode(&self) -> Packet {
        Packet::tagged_string(Class::Application, APP_DEL_REQUEST, self.dn.clone())
    }
}

impl Connection {
    pub async fn delete(&self, dn: &str) -> Result<()> {
        self.delete_with(&DeleteRequest::new(dn)).await
    }

    pub async fn delete_with(&self, request: &DeleteRequest) -> Result<()> {
        self.simple_request(request.encode(), &request.controls, APP_DEL_RESPONSE)
            .await?;
        Ok(())
    }
}
