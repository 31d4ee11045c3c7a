use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::error::Result;
use crate::protocol::{APP_MODIFY_DN_REQUEST, APP_MODIFY_DN_RESPONSE};

const NEW_SUPERIOR_TAG: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDnRequest {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    /// Move the entry under this parent.
    pub new_superior: Option<String>,
    pub controls: Vec<Control>,
}

impl ModifyDnRequest {
    pub fn new(dn: impl Into<String>, new_rdn: impl Into<String>, delete_old_rdn: bool) -> Self {
        Self {
            dn: dn.into(),
            new_rdn: new_rdn.into(),
            delete_old_rdn,
            new_superior: None,
            controls: Vec::new(),
        }
    }

    pub(crate) fn encode(&self) -> Packet {
        let mut op = Packet::constructed(Class::Application, APP_MODIFY_DN_REQUEST)
            .with_child(Packet::octet_string(self.dn.clone()))
            .with_child(Packet::octet_string(self.new_rdn.clone()))
            .with_child(Packet::boolean(self.delete_old_rdn));
        if let Some(superior) = &self.new_superior {
            op.append_child(Packet::tagged_string(
                Class::Context,
                NEW_SUPERIOR_TAG,
                superior.clone(),
            ));
        }
        op
    }
}

impl Connection {
    pub async fn modify_dn(&self, request: &ModifyDnRequest) -> Result<()> {
        self.simple_request(request.encode(), &request.controls, APP_MODIFY_DN_RESPONSE)
            .await?;
        Ok(())
    }
}
